//! Domain types for the resume pipeline.
//!
//! This module contains the value types that travel between stages:
//! - ContentKey: content-addressed identity of a submission
//! - AnalysisResult: validated extraction output
//! - StagePayload: the inter-stage contract
//! - StageEvent / SubmissionStatus: audit log and replayed state

pub mod analysis;
pub mod content_key;
pub mod events;
pub mod payload;
pub mod submission;

// Re-export commonly used types
pub use analysis::{validate, AnalysisRecord, AnalysisResult, SchemaViolation};
pub use content_key::{
    decode_identity, encode_identity, is_path_safe, normalize_slug, ArtifactPath, ContentKey,
    KeyError,
};
pub use events::{EventType, Stage, StageEvent, StageStatus};
pub use payload::{ArtifactLocation, Disposition, ErrorKind, StageError, StagePayload};
pub use submission::{SubmissionState, SubmissionStatus};
