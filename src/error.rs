//! Error types shared by the pipeline components.
//!
//! Every error maps onto one [`ErrorClass`]. The class is a reporting tag:
//! it is logged as the `class` field next to the error. What a component does
//! on failure is decided by its own outcome types (`transform::Outcome`,
//! `DigestError` ending the run).

use thiserror::Error;

/// Where a failure sits in the handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Model call or network failure; a later attempt may succeed.
    Transient,
    /// Can never succeed for this item.
    Permanent,
    /// Recoverable by falling back to a default.
    Degraded,
    /// The current unit of work (one source or one digest run) cannot go on.
    Fatal,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
            ErrorClass::Degraded => "degraded",
            ErrorClass::Fatal => "fatal",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored json column is invalid: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid stored value: {0}")]
    Invalid(String),
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::NotFound(_) | StoreError::Invalid(_) => ErrorClass::Permanent,
            _ => ErrorClass::Fatal,
        }
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("no response content from model")]
    Empty,
    #[error("failed to parse model response: {source}, content: {content}")]
    Parse {
        #[source]
        source: serde_json::Error,
        content: String,
    },
    #[error("missing api key for {0}")]
    MissingApiKey(&'static str),
    #[error("no stories in synthesis response")]
    NoStories,
}

impl ModelError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ModelError::MissingApiKey(_) => ErrorClass::Fatal,
            _ => ErrorClass::Transient,
        }
    }

    /// Short tag stored alongside processing errors.
    pub fn kind(&self) -> &'static str {
        match self {
            ModelError::Http(_) => "llm_http",
            ModelError::Status { .. } => "llm_status",
            ModelError::Empty => "llm_empty",
            ModelError::Parse { .. } => "llm_parse",
            ModelError::MissingApiKey(_) => "llm_config",
            ModelError::NoStories => "llm_no_stories",
        }
    }
}

#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[derive(Debug, Error)]
pub enum DigestError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cluster pass failed: {0}")]
    Cluster(#[source] ModelError),
    #[error("synthesis failed for cluster {topic:?}: {source}")]
    Synthesis {
        topic: String,
        #[source]
        source: ModelError,
    },
    #[error("summary pass failed: {0}")]
    Summary(#[source] ModelError),
}

impl DigestError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_failures_are_retryable_except_config() {
        assert_eq!(ModelError::Empty.class(), ErrorClass::Transient);
        assert_eq!(
            ModelError::Status {
                status: 503,
                body: String::new()
            }
            .class(),
            ErrorClass::Transient
        );
        assert_eq!(ModelError::MissingApiKey("openai").class(), ErrorClass::Fatal);
    }

    #[test]
    fn classes_have_stable_log_tags() {
        assert_eq!(ModelError::Empty.class().as_str(), "transient");
        assert_eq!(
            DigestError::Summary(ModelError::NoStories).class().as_str(),
            "fatal"
        );
        assert_eq!(StoreError::Invalid("status".into()).class().as_str(), "permanent");
        assert_eq!(ErrorClass::Degraded.as_str(), "degraded");
    }

    #[test]
    fn missing_rows_are_permanent() {
        assert_eq!(
            StoreError::NotFound("article 7".into()).class(),
            ErrorClass::Permanent
        );
    }
}
