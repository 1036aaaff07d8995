//! Filesystem-backed collaborators for local runs.
//!
//! Layout under the state directory:
//!
//! ```text
//! ~/.resume-gate/
//! ├── artifacts/<bucket>/<identity>/<category>/resume-<name>.pdf
//! ├── records.jsonl     # durable analysis records (latest wins)
//! ├── workflows.jsonl   # started workflow executions
//! └── outbox.jsonl      # notifications when no webhook is configured
//! ```

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use super::{ArtifactStore, Notifier, RecordStore, WorkflowTrigger};
use crate::domain::{AnalysisRecord, ArtifactLocation};

/// Append one JSON line with an exclusive lock held for the write
fn append_locked<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    file.lock_exclusive()
        .with_context(|| format!("Failed to acquire file lock on {}", path.display()))?;

    let json = serde_json::to_string(value).context("Failed to serialize entry")?;
    writeln!(file, "{}", json).context("Failed to write entry")?;
    file.flush().context("Failed to flush entry")?;

    // Lock is released when file is dropped
    Ok(())
}

/// Read every JSON line of a file (missing file = no entries)
async fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).with_context(|| format!("Failed to parse line: {}", line))
        })
        .collect()
}

// ============================================================================
// Artifacts
// ============================================================================

/// Stores artifacts as files under `<root>/<bucket>/<key>`
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a location to a path, refusing anything that escapes the root
    pub fn path_for(&self, location: &ArtifactLocation) -> Result<PathBuf> {
        let relative = Path::new(&location.bucket).join(&location.key);

        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || location.bucket.is_empty() || location.key.is_empty() {
            anyhow::bail!("Refusing artifact location outside the store: {}", location);
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, location: &ArtifactLocation, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(location)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write artifact: {}", path.display()))?;

        debug!(path = %path.display(), size = bytes.len(), "Artifact stored");
        Ok(())
    }

    async fn get(&self, location: &ArtifactLocation) -> Result<Vec<u8>> {
        let path = self.path_for(location)?;
        fs::read(&path)
            .await
            .with_context(|| format!("Failed to read artifact: {}", path.display()))
    }
}

// ============================================================================
// Records
// ============================================================================

/// Append-only JSONL record store; the last record for an id wins
#[derive(Debug, Clone)]
pub struct JsonlRecordStore {
    path: PathBuf,
}

impl JsonlRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// All records, in write order
    pub async fn all(&self) -> Result<Vec<AnalysisRecord>> {
        read_lines(&self.path).await
    }
}

#[async_trait]
impl RecordStore for JsonlRecordStore {
    async fn put(&self, record: &AnalysisRecord) -> Result<()> {
        append_locked(&self.path, record)
    }

    async fn get(&self, record_id: &str) -> Result<Option<AnalysisRecord>> {
        let records = self.all().await?;
        Ok(records.into_iter().rev().find(|r| r.record_id == record_id))
    }
}

// ============================================================================
// Workflow journal
// ============================================================================

/// A started workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub execution_id: String,
    pub bucket: String,
    pub key: String,
    pub started_at: DateTime<Utc>,
}

/// Records workflow starts in a JSONL journal
#[derive(Debug, Clone)]
pub struct JournalTrigger {
    path: PathBuf,
}

impl JournalTrigger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn executions(&self) -> Result<Vec<WorkflowExecution>> {
        read_lines(&self.path).await
    }
}

#[async_trait]
impl WorkflowTrigger for JournalTrigger {
    async fn start(&self, location: &ArtifactLocation) -> Result<String> {
        let execution = WorkflowExecution {
            execution_id: Uuid::new_v4().to_string(),
            bucket: location.bucket.clone(),
            key: location.key.clone(),
            started_at: Utc::now(),
        };
        append_locked(&self.path, &execution)?;
        Ok(execution.execution_id)
    }
}

// ============================================================================
// Outbox
// ============================================================================

/// A notification written to the outbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub timestamp: DateTime<Utc>,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Writes notifications to a JSONL outbox instead of delivering them
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    path: PathBuf,
    from: String,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>, from: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            from: from.into(),
        }
    }

    pub async fn messages(&self) -> Result<Vec<OutboxMessage>> {
        read_lines(&self.path).await
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    fn name(&self) -> &str {
        "outbox"
    }

    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<()> {
        let message = OutboxMessage {
            timestamp: Utc::now(),
            from: self.from.clone(),
            to: address.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        };
        append_locked(&self.path, &message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_artifact_store_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::new(temp.path());
        let location = ArtifactLocation::new("resumes", "dG9r/software_engineer/resume-jane_doe.pdf");

        store.put(&location, b"%PDF-1.7").await.unwrap();

        assert!(temp
            .path()
            .join("resumes/dG9r/software_engineer/resume-jane_doe.pdf")
            .exists());
        assert_eq!(store.get(&location).await.unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn test_artifact_store_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::new(temp.path());

        for key in ["../escape.pdf", "/etc/passwd", "a/../../b"] {
            let location = ArtifactLocation::new("resumes", key);
            assert!(store.put(&location, b"x").await.is_err(), "{}", key);
        }
    }

    #[tokio::test]
    async fn test_record_store_latest_wins() {
        let temp = TempDir::new().unwrap();
        let store = JsonlRecordStore::new(temp.path().join("records.jsonl"));

        assert!(store.get("h1").await.unwrap().is_none());

        let mut record = AnalysisRecord {
            record_id: "h1".to_string(),
            score: 70,
            recommendations: vec!["Add metrics".to_string()],
            analysis_timestamp: Utc::now(),
        };
        store.put(&record).await.unwrap();
        record.score = 75;
        store.put(&record).await.unwrap();

        assert_eq!(store.all().await.unwrap().len(), 2);
        assert_eq!(store.get("h1").await.unwrap().unwrap().score, 75);
    }

    #[tokio::test]
    async fn test_journal_and_outbox() {
        let temp = TempDir::new().unwrap();

        let trigger = JournalTrigger::new(temp.path().join("workflows.jsonl"));
        let id = trigger
            .start(&ArtifactLocation::new("resumes", "a/b/c.pdf"))
            .await
            .unwrap();
        let executions = trigger.executions().await.unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].execution_id, id);

        let outbox = OutboxNotifier::new(temp.path().join("outbox.jsonl"), "noreply@example.com");
        outbox.send("jane@example.com", "Results", "Score: 82").await.unwrap();
        let messages = outbox.messages().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].to, "jane@example.com");
        assert_eq!(messages[0].from, "noreply@example.com");
    }
}
