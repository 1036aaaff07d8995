//! In-process collaborators.
//!
//! Useful when the pipeline is embedded in another service that owns the
//! real stores, and for exercising the stages without any I/O.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ArtifactStore, Notifier, RecordStore, WorkflowTrigger};
use crate::domain::{AnalysisRecord, ArtifactLocation};

/// Artifact store backed by a map of `bucket/key` to bytes
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    puts: Arc<Mutex<usize>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put` calls seen so far
    pub async fn put_count(&self) -> usize {
        *self.puts.lock().await
    }

    pub async fn contains(&self, location: &ArtifactLocation) -> bool {
        self.objects.lock().await.contains_key(&location.to_string())
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, location: &ArtifactLocation, bytes: &[u8]) -> Result<()> {
        self.objects
            .lock()
            .await
            .insert(location.to_string(), bytes.to_vec());
        *self.puts.lock().await += 1;
        Ok(())
    }

    async fn get(&self, location: &ArtifactLocation) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .await
            .get(&location.to_string())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Artifact not found: {}", location))
    }
}

/// Record store that keeps every write
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    writes: Arc<Mutex<Vec<AnalysisRecord>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record written, in order (rewrites included)
    pub async fn writes(&self) -> Vec<AnalysisRecord> {
        self.writes.lock().await.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn put(&self, record: &AnalysisRecord) -> Result<()> {
        self.writes.lock().await.push(record.clone());
        Ok(())
    }

    async fn get(&self, record_id: &str) -> Result<Option<AnalysisRecord>> {
        Ok(self
            .writes
            .lock()
            .await
            .iter()
            .rev()
            .find(|r| r.record_id == record_id)
            .cloned())
    }
}

/// A notification captured by [`MemoryNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Notifier that records messages instead of delivering them
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    sent: Arc<Mutex<Vec<SentMessage>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    fn name(&self) -> &str {
        "memory"
    }

    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<()> {
        self.sent.lock().await.push(SentMessage {
            to: address.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Trigger that records started workflows
#[derive(Debug, Clone, Default)]
pub struct MemoryTrigger {
    started: Arc<Mutex<Vec<ArtifactLocation>>>,
}

impl MemoryTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn started(&self) -> Vec<ArtifactLocation> {
        self.started.lock().await.clone()
    }
}

#[async_trait]
impl WorkflowTrigger for MemoryTrigger {
    async fn start(&self, location: &ArtifactLocation) -> Result<String> {
        self.started.lock().await.push(location.clone());
        Ok(Uuid::new_v4().to_string())
    }
}
