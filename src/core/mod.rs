//! Core pipeline logic.
//!
//! This module contains:
//! - DedupGate: TTL cache checkpoints
//! - Stages: the four stage entry points
//! - Coordinator: in-process execution with timeouts and event logging
//! - EventLog: append-only stage event log

pub mod coordinator;
pub mod dedup;
pub mod error;
pub mod event_store;
pub mod stages;

// Re-export commonly used types
pub use coordinator::{Coordinator, Outcome, SubmissionReport, DEFAULT_STAGE_TIMEOUT};
pub use dedup::{ingestion_key, persistence_key, CacheDecision, DedupGate, RecordOutcome};
pub use error::PipelineError;
pub use event_store::EventLog;
pub use stages::{Collaborators, IngestOutcome, StageSettings, Stages, Submission};
