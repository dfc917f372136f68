//! Schema migrations, applied in order when a store is opened.

pub(crate) struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "articles, symbols, categories, normalized articles, processing errors",
            sql: r#"
CREATE TABLE IF NOT EXISTS categories (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

INSERT OR IGNORE INTO categories (name) VALUES
    ('Earnings'),
    ('Market Movement'),
    ('Economy'),
    ('Crypto'),
    ('Mergers & Acquisitions'),
    ('Policy & Regulation'),
    ('Company News'),
    ('Analysis'),
    ('Others');

CREATE TABLE IF NOT EXISTS raw_articles (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    headline          TEXT NOT NULL,
    detail            TEXT NOT NULL,
    url               TEXT NOT NULL UNIQUE,
    source            TEXT NOT NULL,
    publisher         TEXT NOT NULL,
    published_at      TEXT,
    fetched_at        TEXT NOT NULL,
    external_id       TEXT NOT NULL,
    status            TEXT NOT NULL DEFAULT 'pending',
    status_changed_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_raw_articles_status ON raw_articles(status, status_changed_ms);

CREATE TABLE IF NOT EXISTS article_symbols (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id INTEGER NOT NULL REFERENCES raw_articles(id) ON DELETE CASCADE,
    symbol     TEXT NOT NULL,
    UNIQUE(article_id, symbol)
);

CREATE TABLE IF NOT EXISTS normalized_articles (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    raw_id          INTEGER NOT NULL UNIQUE REFERENCES raw_articles(id),
    headline        TEXT NOT NULL,
    detail          TEXT NOT NULL,
    category_id     INTEGER NOT NULL REFERENCES categories(id),
    sentiment_score INTEGER NOT NULL,
    prompt_version  TEXT NOT NULL,
    model_used      TEXT NOT NULL,
    transformed_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS processing_errors (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id INTEGER NOT NULL,
    message    TEXT NOT NULL,
    kind       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_processing_errors_article ON processing_errors(article_id);
"#,
        },
        Migration {
            version: 2,
            description: "digest summaries and ranked stories",
            sql: r#"
CREATE TABLE IF NOT EXISTS news_summaries (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    paragraph       TEXT NOT NULL,
    bullets         TEXT NOT NULL,
    article_count   INTEGER NOT NULL,
    from_article_id INTEGER NOT NULL,
    to_article_id   INTEGER NOT NULL,
    model_used      TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS news_stories (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    summary_id INTEGER NOT NULL REFERENCES news_summaries(id) ON DELETE CASCADE,
    rank       INTEGER NOT NULL,
    headline   TEXT NOT NULL,
    summary    TEXT NOT NULL,
    angles     TEXT NOT NULL,
    tickers    TEXT NOT NULL,
    publishers TEXT NOT NULL,
    time_range TEXT NOT NULL,
    UNIQUE(summary_id, rank)
);
"#,
        },
        Migration {
            version: 3,
            description: "durable work queue",
            sql: r#"
CREATE TABLE IF NOT EXISTS work_queue (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    queue       TEXT NOT NULL,
    payload     TEXT NOT NULL,
    enqueued_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_work_queue_queue ON work_queue(queue, seq);
"#,
        },
        Migration {
            version: 4,
            description: "work queue payload lookup",
            sql: r#"
CREATE INDEX IF NOT EXISTS idx_work_queue_payload ON work_queue(queue, payload);
"#,
        },
    ]
}
