//! Interfaces to the external collaborators of the pipeline.
//!
//! Every stage receives its collaborators as injected handles; nothing
//! here is a process-wide singleton. Local implementations (filesystem,
//! in-memory) let the pipeline run end to end without cloud services.

pub mod cache;
pub mod local;
pub mod memory;
pub mod openai;
pub mod webhook;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{AnalysisRecord, ArtifactLocation};

// Re-export the concrete adapters
pub use cache::{FileCache, MemoryCache};
pub use local::{FsArtifactStore, JournalTrigger, JsonlRecordStore, OutboxNotifier};
pub use memory::{MemoryArtifactStore, MemoryNotifier, MemoryRecordStore, MemoryTrigger, SentMessage};
pub use openai::OpenAiExtractor;
pub use webhook::WebhookNotifier;

/// Blob storage for uploaded artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, location: &ArtifactLocation, bytes: &[u8]) -> Result<()>;

    async fn get(&self, location: &ArtifactLocation) -> Result<Vec<u8>>;
}

/// Durable store for analysis records, keyed by content hash
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn put(&self, record: &AnalysisRecord) -> Result<()>;

    async fn get(&self, record_id: &str) -> Result<Option<AnalysisRecord>>;
}

/// Opens scoped connections to the TTL cache backend
#[async_trait]
pub trait CacheConnector: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Open a connection. It is released when dropped.
    async fn connect(&self) -> Result<Box<dyn CacheConnection>>;
}

/// A live connection to the cache backend
#[async_trait]
pub trait CacheConnection: Send {
    async fn exists(&mut self, key: &str) -> Result<bool>;

    async fn get(&mut self, key: &str) -> Result<Option<String>>;

    async fn set_with_expiry(&mut self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Atomically set `key` only if no live entry exists.
    /// Returns `true` if this call created the entry.
    async fn set_if_absent(&mut self, key: &str, value: &str, ttl: Duration) -> Result<bool>;
}

/// A request to the external structured-extraction service
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Model the request is addressed to
    pub model: String,

    /// File name presented to the service
    pub file_name: String,

    /// Raw artifact bytes
    pub bytes: Vec<u8>,

    /// Instruction text sent alongside the file
    pub instruction: String,
}

/// The expensive analysis step. Its output is untrusted text.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, request: ExtractionRequest) -> Result<String>;
}

/// Starts the downstream workflow for a stored artifact
#[async_trait]
pub trait WorkflowTrigger: Send + Sync {
    /// Returns an execution identifier
    async fn start(&self, location: &ArtifactLocation) -> Result<String>;
}

/// Outbound notification channel
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<()>;
}
