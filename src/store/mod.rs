//! Article Store: SQLite-backed durable storage for raw and normalized
//! articles, symbols, categories, processing errors and digests.
//!
//! Every mutation that must be all-or-nothing (insert + symbols, normalize +
//! complete, summary + stories) runs inside a single transaction.

mod schema;

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, info};

use crate::article::{
    ArticleCandidate, ArticleId, ArticleStatus, Category, NewNormalizedArticle, NormalizedArticle,
    RawArticle,
};
use crate::error::StoreError;
use crate::summary::{NewSummary, NewsStory, NewsSummary, StoryDraft};

const RAW_COLUMNS: &str = "id, headline, detail, url, source, publisher, published_at, \
                           fetched_at, external_id, status";

/// Result of an insert-if-absent keyed by URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(ArticleId),
    Duplicate,
}

/// Result of the transactional normalize + complete step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// New normalized row id; the raw article is now `completed`.
    Committed(i64),
    /// Article was missing or already terminal; nothing written.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct ArticleStore {
    pool: SqlitePool,
}

impl ArticleStore {
    /// Open (creating if needed) the database at `database_url` and apply migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let in_memory = is_memory_url(database_url);
        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives exactly as long as its one connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };

        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;
        info!(in_memory, "article store ready");
        Ok(store)
    }

    /// Wrap an existing pool. Call [`ArticleStore::migrate`] before use.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version    INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let current: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        for migration in schema::all_migrations() {
            if migration.version <= current {
                continue;
            }
            info!(
                version = migration.version,
                description = migration.description,
                "applying migration"
            );
            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(migration.version)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------
    // Raw articles
    // ------------------------------------------------------------

    /// Insert a candidate unless its URL is already stored. Symbols are written
    /// in the same transaction, and only when the article is new.
    pub async fn insert_if_absent(
        &self,
        candidate: &ArticleCandidate,
    ) -> Result<InsertOutcome, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let inserted: Option<i64> = sqlx::query_scalar(
            r"
            INSERT INTO raw_articles
                (headline, detail, url, source, publisher, published_at,
                 fetched_at, external_id, status, status_changed_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)
            ON CONFLICT(url) DO NOTHING
            RETURNING id
            ",
        )
        .bind(&candidate.headline)
        .bind(&candidate.detail)
        .bind(&candidate.url)
        .bind(&candidate.source)
        .bind(&candidate.publisher)
        .bind(candidate.published_at)
        .bind(now)
        .bind(&candidate.external_id)
        .bind(now.timestamp_millis())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = inserted else {
            tx.rollback().await?;
            return Ok(InsertOutcome::Duplicate);
        };

        for symbol in clean_symbols(&candidate.symbols) {
            sqlx::query("INSERT OR IGNORE INTO article_symbols (article_id, symbol) VALUES (?, ?)")
                .bind(id)
                .bind(symbol)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(InsertOutcome::Inserted(id))
    }

    pub async fn get_raw(&self, id: ArticleId) -> Result<Option<RawArticle>, StoreError> {
        let row = sqlx::query(&format!("SELECT {RAW_COLUMNS} FROM raw_articles WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_raw).transpose()
    }

    /// Move an article to `status`. Terminal statuses are never left, so this
    /// returns `false` when the row is missing or already completed/failed.
    pub async fn update_status(
        &self,
        id: ArticleId,
        status: ArticleStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            UPDATE raw_articles
            SET status = ?, status_changed_ms = ?
            WHERE id = ? AND status NOT IN ('completed', 'failed')
            ",
        )
        .bind(status.as_str())
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_pending(&self, limit: i64) -> Result<Vec<RawArticle>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {RAW_COLUMNS} FROM raw_articles
             WHERE status = 'pending'
             ORDER BY fetched_at ASC, id ASC
             LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_raw).collect()
    }

    pub async fn count_with_status(&self, status: ArticleStatus) -> Result<i64, StoreError> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM raw_articles WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Non-terminal articles whose status has not moved since `cutoff`.
    pub async fn stale_article_ids(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ArticleId>, StoreError> {
        let ids = sqlx::query_scalar(
            r"
            SELECT id FROM raw_articles
            WHERE status IN ('pending', 'processing') AND status_changed_ms <= ?
            ORDER BY id ASC
            LIMIT ?
            ",
        )
        .bind(cutoff.timestamp_millis())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Refresh the status timestamp of a non-terminal article.
    pub async fn touch(&self, id: ArticleId, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r"
            UPDATE raw_articles SET status_changed_ms = ?
            WHERE id = ? AND status IN ('pending', 'processing')
            ",
        )
        .bind(at.timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------
    // Symbols
    // ------------------------------------------------------------

    pub async fn symbols_for(
        &self,
        ids: &[ArticleId],
    ) -> Result<HashMap<ArticleId, Vec<String>>, StoreError> {
        let mut out: HashMap<ArticleId, Vec<String>> = HashMap::new();
        if ids.is_empty() {
            return Ok(out);
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT article_id, symbol FROM article_symbols WHERE article_id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        for row in rows {
            let article_id: i64 = row.try_get("article_id")?;
            let symbol: String = row.try_get("symbol")?;
            out.entry(article_id).or_default().push(symbol);
        }
        Ok(out)
    }

    // ------------------------------------------------------------
    // Processing errors
    // ------------------------------------------------------------

    /// Number of failed normalization attempts recorded for an article.
    pub async fn attempt_count(&self, id: ArticleId) -> Result<i64, StoreError> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM processing_errors WHERE article_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn append_error(
        &self,
        id: ArticleId,
        message: &str,
        kind: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO processing_errors (article_id, message, kind, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(message)
        .bind(kind)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------
    // Categories + normalized articles
    // ------------------------------------------------------------

    pub async fn category_by_name(&self, name: &str) -> Result<Option<Category>, StoreError> {
        let row = sqlx::query("SELECT id, name FROM categories WHERE name = ? COLLATE NOCASE")
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(Category {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
            })),
            None => Ok(None),
        }
    }

    pub async fn categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows = sqlx::query("SELECT id, name FROM categories ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> Result<Category, StoreError> {
                Ok(Category {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    /// Insert the normalized article and flip the raw one to `completed` in a
    /// single transaction. Either both land or neither does.
    pub async fn complete(&self, article: &NewNormalizedArticle) -> Result<Completion, StoreError> {
        let mut tx = self.pool.begin().await?;

        let flipped = sqlx::query(
            r"
            UPDATE raw_articles
            SET status = 'completed', status_changed_ms = ?
            WHERE id = ? AND status NOT IN ('completed', 'failed')
            ",
        )
        .bind(article.transformed_at.timestamp_millis())
        .bind(article.raw_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if flipped == 0 {
            tx.rollback().await?;
            debug!(article_id = article.raw_id, "completion skipped: missing or terminal");
            return Ok(Completion::Skipped);
        }

        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO normalized_articles
                (raw_id, headline, detail, category_id, sentiment_score,
                 prompt_version, model_used, transformed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            ",
        )
        .bind(article.raw_id)
        .bind(&article.headline)
        .bind(&article.detail)
        .bind(article.category_id)
        .bind(article.sentiment_score)
        .bind(&article.prompt_version)
        .bind(&article.model_used)
        .bind(article.transformed_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Completion::Committed(id))
    }

    pub async fn normalized_for(
        &self,
        raw_id: ArticleId,
    ) -> Result<Option<NormalizedArticle>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT n.id, n.raw_id, n.headline, n.detail, n.category_id, c.name AS category_name,
                   n.sentiment_score, n.prompt_version, n.model_used, n.transformed_at
            FROM normalized_articles n
            JOIN categories c ON c.id = n.category_id
            WHERE n.raw_id = ?
            ",
        )
        .bind(raw_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(NormalizedArticle {
            id: row.try_get("id")?,
            raw_id: row.try_get("raw_id")?,
            headline: row.try_get("headline")?,
            detail: row.try_get("detail")?,
            category_id: row.try_get("category_id")?,
            category_name: row.try_get("category_name")?,
            sentiment_score: row.try_get("sentiment_score")?,
            prompt_version: row.try_get("prompt_version")?,
            model_used: row.try_get("model_used")?,
            transformed_at: row.try_get("transformed_at")?,
        }))
    }

    pub async fn count_normalized(&self) -> Result<i64, StoreError> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM normalized_articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    // ------------------------------------------------------------
    // Digests
    // ------------------------------------------------------------

    /// Upper bound of the newest digest range, or 0 before the first digest.
    pub async fn last_summarized_id(&self) -> Result<ArticleId, StoreError> {
        let id = sqlx::query_scalar("SELECT COALESCE(MAX(to_article_id), 0) FROM news_summaries")
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    /// Raw articles with id greater than `after`, ascending. `limit` of `None`
    /// returns the whole backlog.
    pub async fn articles_after(
        &self,
        after: ArticleId,
        limit: Option<i64>,
    ) -> Result<Vec<RawArticle>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {RAW_COLUMNS} FROM raw_articles WHERE id > ? ORDER BY id ASC LIMIT ?"
        ))
        .bind(after)
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_raw).collect()
    }

    /// Persist one summary with its stories, ranked 1..=N in the given order.
    pub async fn save_digest(
        &self,
        summary: &NewSummary,
        stories: &[StoryDraft],
    ) -> Result<i64, StoreError> {
        let bullets = serde_json::to_string(&summary.bullets)?;
        let mut tx = self.pool.begin().await?;

        let summary_id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO news_summaries
                (paragraph, bullets, article_count, from_article_id, to_article_id,
                 model_used, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            ",
        )
        .bind(&summary.paragraph)
        .bind(bullets)
        .bind(summary.article_count)
        .bind(summary.from_article_id)
        .bind(summary.to_article_id)
        .bind(&summary.model_used)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        for (idx, story) in stories.iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO news_stories
                    (summary_id, rank, headline, summary, angles, tickers, publishers, time_range)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(summary_id)
            .bind(idx as i64 + 1)
            .bind(&story.headline)
            .bind(&story.summary)
            .bind(serde_json::to_string(&story.angles)?)
            .bind(serde_json::to_string(&story.tickers)?)
            .bind(serde_json::to_string(&story.publishers)?)
            .bind(&story.time_range)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(summary_id)
    }

    /// Newest first.
    pub async fn summaries(&self, limit: i64) -> Result<Vec<NewsSummary>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, paragraph, bullets, article_count, from_article_id, to_article_id,
                   model_used, created_at
            FROM news_summaries
            ORDER BY id DESC
            LIMIT ?
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<NewsSummary, StoreError> {
                let bullets: String = row.try_get("bullets")?;
                Ok(NewsSummary {
                    id: row.try_get("id")?,
                    paragraph: row.try_get("paragraph")?,
                    bullets: serde_json::from_str(&bullets)?,
                    article_count: row.try_get("article_count")?,
                    from_article_id: row.try_get("from_article_id")?,
                    to_article_id: row.try_get("to_article_id")?,
                    model_used: row.try_get("model_used")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    pub async fn stories_for(&self, summary_id: i64) -> Result<Vec<NewsStory>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, summary_id, rank, headline, summary, angles, tickers, publishers, time_range
            FROM news_stories
            WHERE summary_id = ?
            ORDER BY rank ASC
            ",
        )
        .bind(summary_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<NewsStory, StoreError> {
                let angles: String = row.try_get("angles")?;
                let tickers: String = row.try_get("tickers")?;
                let publishers: String = row.try_get("publishers")?;
                Ok(NewsStory {
                    id: row.try_get("id")?,
                    summary_id: row.try_get("summary_id")?,
                    rank: row.try_get("rank")?,
                    headline: row.try_get("headline")?,
                    summary: row.try_get("summary")?,
                    angles: serde_json::from_str(&angles)?,
                    tickers: serde_json::from_str(&tickers)?,
                    publishers: serde_json::from_str(&publishers)?,
                    time_range: row.try_get("time_range")?,
                })
            })
            .collect()
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

fn row_to_raw(row: &SqliteRow) -> Result<RawArticle, StoreError> {
    let status: String = row.try_get("status")?;
    let status = ArticleStatus::parse(&status)
        .ok_or_else(|| StoreError::Invalid(format!("article status {status:?}")))?;
    Ok(RawArticle {
        id: row.try_get("id")?,
        headline: row.try_get("headline")?,
        detail: row.try_get("detail")?,
        url: row.try_get("url")?,
        source: row.try_get("source")?,
        publisher: row.try_get("publisher")?,
        published_at: row.try_get("published_at")?,
        fetched_at: row.try_get("fetched_at")?,
        external_id: row.try_get("external_id")?,
        status,
    })
}

/// Trim, upper-case and dedupe ticker tags, keeping first-seen order.
fn clean_symbols(symbols: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(symbols.len());
    for s in symbols {
        let t = s.trim().to_ascii_uppercase();
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}
