//! Append-only stage event log with file-based persistence.
//!
//! Events are stored as newline-delimited JSON (JSONL) so the history of a
//! submission can be inspected with ordinary tools.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{StageEvent, SubmissionStatus};

/// File-based stage event log using JSONL format
#[derive(Debug, Clone)]
pub struct EventLog {
    /// Path to the events.jsonl file
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the path to the events file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event to the log
    pub async fn append(&self, event: &StageEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.path.display()))?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<StageEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: StageEvent = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Find events matching a predicate
    pub async fn find_events<F>(&self, predicate: F) -> Result<Vec<StageEvent>>
    where
        F: Fn(&StageEvent) -> bool,
    {
        let events = self.replay().await?;
        Ok(events.into_iter().filter(predicate).collect())
    }

    /// Status of one submission
    pub async fn submission(&self, submission_id: Uuid) -> Result<Option<SubmissionStatus>> {
        let events = self
            .find_events(|e| e.submission_id == submission_id)
            .await?;
        Ok(SubmissionStatus::from_events(&events))
    }

    /// Every submission of a content hash (full hash or a prefix), oldest first
    pub async fn submissions_for(&self, hash_prefix: &str) -> Result<Vec<SubmissionStatus>> {
        let events = self.replay().await?;

        let matching: Vec<Uuid> = events
            .iter()
            .filter(|e| {
                e.content_hash
                    .as_deref()
                    .is_some_and(|h| h.starts_with(hash_prefix))
            })
            .map(|e| e.submission_id)
            .collect();

        Ok(SubmissionStatus::history(&events)
            .into_iter()
            .filter(|s| matching.contains(&s.submission_id))
            .collect())
    }
}
