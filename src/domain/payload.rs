//! The contract passed between independently invoked stages.
//!
//! Wire shape (camelCase JSON):
//!
//! ```text
//! {
//!   "contentHash": "...", "identityToken": "...", "categorySlug": "...",
//!   "analysisResult": { "score": 82, "recommendations": [...], "analysisTimestamp": "..." },
//!   "skip": false,
//!   "error": { "kind": "schema_violation", "message": "..." }
//! }
//! ```

use serde::{Deserialize, Serialize};

use super::analysis::AnalysisResult;
use super::content_key::ContentKey;

/// Where an uploaded artifact lives. Also the input the workflow
/// orchestrator hands to the analysis stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub bucket: String,
    pub key: String,
}

impl ArtifactLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Error categories carried across stage boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidContent,
    InvalidIdentity,
    InvalidPayload,
    CacheUnavailable,
    SchemaViolation,
    MissingAnalysis,
    StorageRead,
    StorageWrite,
    WorkflowTrigger,
    Extraction,
    Notification,
    StageTimeout,
}

impl ErrorKind {
    /// Whether the invoking orchestrator may retry the stage as-is
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::CacheUnavailable
                | Self::StorageRead
                | Self::StorageWrite
                | Self::WorkflowTrigger
                | Self::Extraction
                | Self::Notification
                | Self::StageTimeout
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::InvalidContent => "invalid_content",
            Self::InvalidIdentity => "invalid_identity",
            Self::InvalidPayload => "invalid_payload",
            Self::CacheUnavailable => "cache_unavailable",
            Self::SchemaViolation => "schema_violation",
            Self::MissingAnalysis => "missing_analysis",
            Self::StorageRead => "storage_read",
            Self::StorageWrite => "storage_write",
            Self::WorkflowTrigger => "workflow_trigger",
            Self::Extraction => "extraction",
            Self::Notification => "notification",
            Self::StageTimeout => "stage_timeout",
        };
        write!(f, "{}", name)
    }
}

/// Structured error as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// How a stage must treat an incoming payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition<'a> {
    /// An earlier stage failed; surface it, do nothing else
    Failed(&'a StageError),

    /// Already processed; return without side effects
    AlreadyHandled,

    /// Carry on with this stage's work
    Proceed,
}

/// Payload handed from one stage to the next
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagePayload {
    #[serde(flatten)]
    pub content_key: ContentKey,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_result: Option<AnalysisResult>,

    #[serde(default)]
    pub skip: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StageError>,
}

impl StagePayload {
    /// Fresh payload for a newly derived key
    pub fn new(content_key: ContentKey) -> Self {
        Self {
            content_key,
            analysis_result: None,
            skip: false,
            error: None,
        }
    }

    pub fn with_result(mut self, result: AnalysisResult) -> Self {
        self.analysis_result = Some(result);
        self
    }

    /// Flag the payload as already handled
    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }

    pub fn failed(mut self, error: StageError) -> Self {
        self.error = Some(error);
        self
    }

    /// Decide what the receiving stage may do. An error wins over `skip`.
    pub fn disposition(&self) -> Disposition<'_> {
        match (&self.error, self.skip) {
            (Some(error), _) => Disposition::Failed(error),
            (None, true) => Disposition::AlreadyHandled,
            (None, false) => Disposition::Proceed,
        }
    }

    pub fn content_hash(&self) -> &str {
        self.content_key.content_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn key() -> ContentKey {
        ContentKey::derive(b"%PDF-1.7 resume", "jane@example.com", "Software Engineer").unwrap()
    }

    fn result() -> AnalysisResult {
        AnalysisResult::new(82, vec!["Add metrics".to_string()], Utc::now()).unwrap()
    }

    #[test]
    fn test_error_takes_precedence_over_skip() {
        let payload = StagePayload::new(key())
            .skipped()
            .failed(StageError::new(ErrorKind::SchemaViolation, "bad score"));

        assert!(matches!(payload.disposition(), Disposition::Failed(_)));
    }

    #[test]
    fn test_dispositions() {
        assert_eq!(StagePayload::new(key()).disposition(), Disposition::Proceed);
        assert_eq!(
            StagePayload::new(key()).skipped().disposition(),
            Disposition::AlreadyHandled
        );
    }

    #[test]
    fn test_wire_shape() {
        let payload = StagePayload::new(key()).with_result(result());
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["categorySlug"], "software_engineer");
        assert_eq!(json["contentHash"].as_str().unwrap().len(), 64);
        assert!(json["identityToken"].is_string());
        assert_eq!(json["analysisResult"]["score"], 82);
        assert_eq!(json["skip"], false);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_error_wire_shape() {
        let payload = StagePayload::new(key())
            .failed(StageError::new(ErrorKind::CacheUnavailable, "connection refused"));
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["error"]["kind"], "cache_unavailable");
        assert_eq!(json["error"]["message"], "connection refused");
        assert!(json.get("analysisResult").is_none());
    }

    #[test]
    fn test_parse_minimal_orchestrator_payload() {
        let key = key();
        let json = serde_json::json!({
            "contentHash": key.content_hash(),
            "identityToken": key.identity_token(),
            "categorySlug": key.category_slug(),
        });

        let payload: StagePayload = serde_json::from_value(json).unwrap();
        assert_eq!(payload.content_key, key);
        assert!(!payload.skip);
        assert!(payload.analysis_result.is_none());
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::CacheUnavailable.is_retryable());
        assert!(ErrorKind::StorageWrite.is_retryable());
        assert!(!ErrorKind::SchemaViolation.is_retryable());
        assert!(!ErrorKind::InvalidIdentity.is_retryable());
    }
}
