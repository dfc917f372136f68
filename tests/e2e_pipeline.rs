// tests/e2e_pipeline.rs
// Ingest -> queue -> normalize -> digest against one in-memory database.
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{candidate, memory_store, start_ids_at, FakeSource, NoSleep, ScriptedNormalizer, ScriptedStories};
use zennews::ingest::run_once;
use zennews::queue::SqliteQueue;
use zennews::{
    ArticleStatus, DigestEngine, DigestMode, TransformConfig, TransformWorker, WorkQueue,
};

#[tokio::test]
async fn three_articles_become_one_story() {
    let store = memory_store().await;
    start_ids_at(&store, 101).await;
    let queue = Arc::new(
        SqliteQueue::new(store.pool().clone(), "e2e").with_poll_interval(Duration::from_millis(5)),
    );

    let sources = vec![FakeSource::new(
        "fake",
        vec![
            candidate("https://e.test/a", "Apple beats estimates"),
            candidate("https://e.test/b", "Fed holds rates"),
            candidate("https://e.test/c", "Apple shares rise after earnings"),
        ],
    )];
    let report = run_once(&sources, &store, queue.as_ref(), 10).await;
    assert_eq!(report.saved(), 3);
    assert_eq!(queue.len().await.unwrap(), 3);

    let worker = TransformWorker::new(
        store.clone(),
        queue.clone(),
        Arc::new(ScriptedNormalizer::always("Earnings")),
        TransformConfig {
            dequeue_timeout: Duration::from_millis(20),
            exit_when_idle: true,
            ..TransformConfig::default()
        },
    )
    .with_sleeper(Arc::new(NoSleep::default()));
    let (_tx, rx) = tokio::sync::watch::channel(false);
    let stats = worker.run(rx).await;
    assert_eq!(stats.completed, 3);
    assert_eq!(
        store.count_with_status(ArticleStatus::Completed).await.unwrap(),
        3
    );
    for id in 101..=103 {
        let n = store.normalized_for(id).await.unwrap().unwrap();
        assert_eq!(n.category_name, "Earnings");
        assert!(n.headline.starts_with("Neutral: "));
    }

    let model = Arc::new(ScriptedStories::new(vec![("Apple earnings", vec![0, 2])]));
    let engine = DigestEngine::new(store.clone(), model.clone(), DigestMode::Stories);
    let digest = engine.run_once().await.unwrap().unwrap();

    let summaries = store.summaries(5).await.unwrap();
    assert_eq!(summaries.len(), 1);
    let s = &summaries[0];
    assert_eq!((s.from_article_id, s.to_article_id, s.article_count), (101, 103, 3));
    assert_eq!(s.paragraph, "");
    assert_eq!(s.model_used, "scripted-digest");

    let stories = store.stories_for(digest.summary_id).await.unwrap();
    assert_eq!(stories.len(), 1);
    assert_eq!(stories[0].rank, 1);
    assert_eq!(
        stories[0].headline,
        "Apple beats estimates + Apple shares rise after earnings"
    );
    assert_eq!(*model.synth_seen.lock(), vec![vec![101, 103]]);
}
