// src/lib.rs
// Library surface shared by the fetcher, transformer and summarizer binaries.

pub mod article;
pub mod bootstrap;
pub mod config;
pub mod digest;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod queue;
pub mod sources;
pub mod store;
pub mod summary;
pub mod transform;

// ---- Re-exports for the binaries and integration tests ----
pub use crate::article::{ArticleCandidate, ArticleId, ArticleStatus, RawArticle};
pub use crate::config::PipelineConfig;
pub use crate::digest::{DigestEngine, DigestMode};
pub use crate::error::{ErrorClass, ModelError, StoreError};
pub use crate::queue::WorkQueue;
pub use crate::store::ArticleStore;
pub use crate::transform::{TransformConfig, TransformWorker};
