//! Stage events for the submission audit log.
//!
//! Every stage transition is recorded as an immutable event in an
//! append-only log. The status of a submission is derived by replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One independently invoked unit of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingestion,
    Analysis,
    Persistence,
    Notification,
}

impl Stage {
    /// Stages in per-submission order
    pub const ALL: [Stage; 4] = [
        Stage::Ingestion,
        Stage::Analysis,
        Stage::Persistence,
        Stage::Notification,
    ];
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Ingestion => write!(f, "ingestion"),
            Stage::Analysis => write!(f, "analysis"),
            Stage::Persistence => write!(f, "persistence"),
            Stage::Notification => write!(f, "notification"),
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "ingestion" | "ingest" => Ok(Stage::Ingestion),
            "analysis" | "analyze" => Ok(Stage::Analysis),
            "persistence" | "persist" => Ok(Stage::Persistence),
            "notification" | "notify" => Ok(Stage::Notification),
            _ => anyhow::bail!("Unknown stage: {}", s),
        }
    }
}

/// A single event in the audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The submission this event belongs to
    pub submission_id: Uuid,

    /// Content hash, once it is known
    pub content_hash: Option<String>,

    /// Stage the event refers to
    pub stage: Stage,

    /// Type of event
    pub event_type: EventType,

    /// Human-readable summary (no addresses, no document content)
    pub summary: String,

    /// Time taken in milliseconds (for finished stages)
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,
}

impl StageEvent {
    /// Create a new event with the current timestamp
    pub fn new(
        submission_id: Uuid,
        content_hash: Option<String>,
        stage: Stage,
        event_type: EventType,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            submission_id,
            content_hash,
            stage,
            event_type,
            summary: summary.into(),
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Types of events recorded while a submission moves through the stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A stage began work
    StageStarted,

    /// A stage finished and handed on its payload
    StageCompleted,

    /// A stage short-circuited because the content was already handled
    StageSkipped,

    /// A stage failed; the submission stops here
    StageFailed,

    /// The ingestion stage handed the artifact to the workflow
    WorkflowStarted,
}

/// Status of a single stage within a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Skipped,
    Failed,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = StageEvent::new(
            Uuid::new_v4(),
            Some("abc123".to_string()),
            Stage::Persistence,
            EventType::StageSkipped,
            "Persistence checkpoint hit",
        );

        let json = serde_json::to_string(&event).unwrap();
        let parsed: StageEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.stage, Stage::Persistence);
        assert_eq!(parsed.event_type, EventType::StageSkipped);
        assert!(json.contains("\"stage_skipped\""));
    }

    #[test]
    fn test_event_with_duration_and_error() {
        let event = StageEvent::new(
            Uuid::new_v4(),
            None,
            Stage::Analysis,
            EventType::StageFailed,
            "Extraction failed",
        )
        .with_duration(1500)
        .with_error("Connection timeout");

        assert_eq!(event.duration_ms, Some(1500));
        assert_eq!(event.error.as_deref(), Some("Connection timeout"));
    }

    #[test]
    fn test_stage_parsing() {
        assert_eq!("persist".parse::<Stage>().unwrap(), Stage::Persistence);
        assert_eq!("Analysis".parse::<Stage>().unwrap(), Stage::Analysis);
        assert!("upload".parse::<Stage>().is_err());
    }
}
