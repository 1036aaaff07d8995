//! resume-gate - Deduplicating resume analysis pipeline
//!
//! Resumes move through four independently invocable stages: ingestion,
//! analysis, persistence and notification. Identical submissions are
//! recognised by a content key and short-circuited at two cache
//! checkpoints, so the expensive analysis, the record write and the
//! notification happen at most once per TTL window.
//!
//! # Modules
//!
//! - `adapters`: External collaborators (stores, cache, extraction, notification)
//! - `core`: Dedup gate, stage entry points, coordinator, event log
//! - `domain`: Data structures (ContentKey, AnalysisResult, StagePayload, StageEvent)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run a resume through the whole pipeline
//! resume-gate submit --file cv.pdf --email jane@example.com --position "Software Engineer"
//!
//! # Drive a single stage from an orchestrator
//! echo '{"bucket":"resumes","key":"..."}' | resume-gate stage analyze
//!
//! # Inspect what happened to a resume
//! resume-gate status <content-hash>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use crate::core::{Coordinator, PipelineError, Stages, Submission, SubmissionReport};
pub use domain::{AnalysisResult, ContentKey, StagePayload};
