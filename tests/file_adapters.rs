//! File Adapter Integration Tests
//!
//! The local state directory as two processes would see it, and a full
//! coordinator run over file-backed collaborators.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{submission, ScriptedExtractor, ANALYSIS_82};
use resume_gate::adapters::{
    CacheConnector, FileCache, FsArtifactStore, JournalTrigger, JsonlRecordStore, OutboxNotifier,
};
use resume_gate::config::ResolvedConfig;
use resume_gate::core::{Collaborators, Coordinator, EventLog, Outcome, Stages};
use resume_gate::domain::{Stage, SubmissionState};
use tempfile::TempDir;

fn file_coordinator(home: &std::path::Path, extractor: Arc<ScriptedExtractor>) -> Coordinator {
    let config = ResolvedConfig::with_home(home);

    let collaborators = Collaborators {
        artifacts: Arc::new(FsArtifactStore::new(config.artifacts_dir())),
        records: Arc::new(JsonlRecordStore::new(config.records_path())),
        cache: Arc::new(FileCache::new(config.cache_path())),
        extractor,
        trigger: Arc::new(JournalTrigger::new(config.workflows_path())),
        notifier: Arc::new(OutboxNotifier::new(config.outbox_path(), "noreply@example.com")),
    };

    Coordinator::new(
        Stages::new(collaborators, config.stage_settings()),
        EventLog::new(config.events_path()),
        config.stage_timeout(),
    )
}

#[tokio::test]
async fn test_file_cache_shared_between_handles() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("cache.jsonl");

    let writer = FileCache::new(&path);
    let reader = FileCache::new(&path);

    {
        let mut conn = writer.connect().await.unwrap();
        assert!(conn
            .set_if_absent("resume:h1", "{}", Duration::from_secs(60))
            .await
            .unwrap());
    }

    let mut conn = reader.connect().await.unwrap();
    assert!(conn.exists("resume:h1").await.unwrap());
    assert!(!conn
        .set_if_absent("resume:h1", "other", Duration::from_secs(60))
        .await
        .unwrap());
    assert_eq!(conn.get("resume:h1").await.unwrap().as_deref(), Some("{}"));
}

#[tokio::test]
async fn test_file_cache_entries_expire() {
    let temp = TempDir::new().unwrap();
    let cache = FileCache::new(temp.path().join("cache.jsonl"));

    {
        let mut conn = cache.connect().await.unwrap();
        conn.set_with_expiry("k", "v", Duration::from_millis(100))
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(250)).await;

    let mut conn = cache.connect().await.unwrap();
    assert!(!conn.exists("k").await.unwrap());
    assert!(conn.get("k").await.unwrap().is_none());
    assert!(conn
        .set_if_absent("k", "fresh", Duration::from_secs(60))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_coordinator_end_to_end_on_disk() {
    let temp = TempDir::new().unwrap();
    let extractor = Arc::new(ScriptedExtractor::always(ANALYSIS_82));
    let coordinator = file_coordinator(temp.path(), extractor.clone());

    let first = coordinator.submit(submission(b"%PDF resume on disk")).await.unwrap();
    match &first.outcome {
        Outcome::Processed { result } => assert_eq!(result.score(), 82),
        other => panic!("unexpected outcome: {:?}", other),
    }

    // Artifact landed under the bucket
    let location = first.location.clone().unwrap();
    assert!(temp
        .path()
        .join("artifacts")
        .join(&location.bucket)
        .join(&location.key)
        .exists());

    // A second process over the same state directory sees the cache
    let restarted = file_coordinator(temp.path(), extractor.clone());
    let second = restarted.submit(submission(b"%PDF resume on disk")).await.unwrap();
    assert!(matches!(
        second.outcome,
        Outcome::Duplicate {
            checkpoint: Stage::Ingestion,
            ..
        }
    ));
    assert_eq!(extractor.calls(), 1);

    let records = JsonlRecordStore::new(temp.path().join("records.jsonl"));
    assert_eq!(records.all().await.unwrap().len(), 1);

    let outbox = OutboxNotifier::new(temp.path().join("outbox.jsonl"), "noreply@example.com");
    let messages = outbox.messages().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].to, "jane@example.com");

    let workflows = JournalTrigger::new(temp.path().join("workflows.jsonl"));
    assert_eq!(workflows.executions().await.unwrap().len(), 1);

    // Both submissions are visible in the event log
    let history = restarted
        .events()
        .submissions_for(first.content_key.content_hash())
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].state, SubmissionState::Processed);
    assert_eq!(
        history[1].state,
        SubmissionState::Duplicate {
            checkpoint: Stage::Ingestion
        }
    );
}

#[tokio::test]
async fn test_run_stage_chain_over_json() {
    let temp = TempDir::new().unwrap();
    let extractor = Arc::new(ScriptedExtractor::always(ANALYSIS_82));
    let coordinator = file_coordinator(temp.path(), extractor);

    let accepted = coordinator
        .stages()
        .ingest(&submission(b"%PDF orchestrated"))
        .await
        .unwrap();
    let location = match accepted {
        resume_gate::core::IngestOutcome::Accepted { location, .. } => location,
        other => panic!("unexpected ingestion outcome: {:?}", other),
    };

    let analysed = coordinator
        .run_stage(Stage::Analysis, serde_json::to_value(&location).unwrap())
        .await
        .unwrap();
    assert_eq!(analysed["analysisResult"]["score"], 82);
    assert_eq!(analysed["skip"], false);

    let persisted = coordinator
        .run_stage(Stage::Persistence, analysed)
        .await
        .unwrap();
    assert!(persisted.get("error").is_none());

    let notified = coordinator
        .run_stage(Stage::Notification, persisted.clone())
        .await
        .unwrap();
    assert!(notified.get("error").is_none());

    // Replaying persistence for the same payload is a no-op skip
    let replayed = coordinator
        .run_stage(Stage::Persistence, persisted)
        .await
        .unwrap();
    assert_eq!(replayed["skip"], true);

    let records = JsonlRecordStore::new(temp.path().join("records.jsonl"));
    assert_eq!(records.all().await.unwrap().len(), 1);
}
