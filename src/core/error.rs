//! Pipeline error taxonomy.

use thiserror::Error;

use crate::domain::{ErrorKind, KeyError, SchemaViolation, Stage, StageError};

/// Errors a stage can surface to its invoker
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid content: {0}")]
    InvalidContent(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Invalid stage payload: {0}")]
    InvalidPayload(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Schema violation: {0}")]
    SchemaViolation(#[from] SchemaViolation),

    #[error("Payload carries no analysis result")]
    MissingAnalysis,

    #[error("Storage read failed: {0}")]
    StorageRead(String),

    #[error("Storage write failed: {0}")]
    StorageWrite(String),

    #[error("Workflow trigger failed: {0}")]
    WorkflowTrigger(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("Stage '{stage}' exceeded its {limit_seconds}s budget")]
    StageTimeout { stage: Stage, limit_seconds: u64 },
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidContent(_) => ErrorKind::InvalidContent,
            Self::InvalidIdentity(_) => ErrorKind::InvalidIdentity,
            Self::InvalidPayload(_) => ErrorKind::InvalidPayload,
            Self::CacheUnavailable(_) => ErrorKind::CacheUnavailable,
            Self::SchemaViolation(_) => ErrorKind::SchemaViolation,
            Self::MissingAnalysis => ErrorKind::MissingAnalysis,
            Self::StorageRead(_) => ErrorKind::StorageRead,
            Self::StorageWrite(_) => ErrorKind::StorageWrite,
            Self::WorkflowTrigger(_) => ErrorKind::WorkflowTrigger,
            Self::Extraction(_) => ErrorKind::Extraction,
            Self::Notification(_) => ErrorKind::Notification,
            Self::StageTimeout { .. } => ErrorKind::StageTimeout,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    pub fn cache(error: anyhow::Error) -> Self {
        Self::CacheUnavailable(format!("{:#}", error))
    }

    pub fn storage_read(error: anyhow::Error) -> Self {
        Self::StorageRead(format!("{:#}", error))
    }

    pub fn storage_write(error: anyhow::Error) -> Self {
        Self::StorageWrite(format!("{:#}", error))
    }

    /// Wire form carried in `StagePayload.error`
    pub fn to_stage_error(&self) -> StageError {
        let message = match self {
            // The Display prefix duplicates the kind
            Self::SchemaViolation(violation) => violation.to_string(),
            Self::InvalidContent(msg)
            | Self::InvalidIdentity(msg)
            | Self::InvalidPayload(msg)
            | Self::CacheUnavailable(msg)
            | Self::StorageRead(msg)
            | Self::StorageWrite(msg)
            | Self::WorkflowTrigger(msg)
            | Self::Extraction(msg)
            | Self::Notification(msg) => msg.clone(),
            other => other.to_string(),
        };
        StageError::new(self.kind(), message)
    }
}

impl From<KeyError> for PipelineError {
    fn from(error: KeyError) -> Self {
        match error {
            KeyError::InvalidContent(msg) => Self::InvalidContent(msg),
            KeyError::InvalidIdentity(msg) => Self::InvalidIdentity(msg),
        }
    }
}
