//! Submission state reconstructed from stage events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{EventType, Stage, StageEvent, StageStatus};

/// State of one submission as seen through its events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionStatus {
    pub submission_id: Uuid,

    /// Content hash (absent if ingestion failed before deriving it)
    pub content_hash: Option<String>,

    pub state: SubmissionState,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,

    /// Status of each stage that has been reached
    pub stage_statuses: HashMap<Stage, StageStatus>,
}

impl SubmissionStatus {
    /// Reconstruct one submission from its events
    pub fn from_events(events: &[StageEvent]) -> Option<Self> {
        let first = events.first()?;

        let mut status = Self {
            submission_id: first.submission_id,
            content_hash: None,
            state: SubmissionState::Running,
            started_at: first.timestamp,
            finished_at: None,
            stage_statuses: HashMap::new(),
        };

        for event in events {
            status.apply_event(event);
        }

        Some(status)
    }

    /// Group a mixed event stream by submission, oldest submission first
    pub fn history(events: &[StageEvent]) -> Vec<Self> {
        let mut order: Vec<Uuid> = Vec::new();
        let mut grouped: HashMap<Uuid, Vec<StageEvent>> = HashMap::new();

        for event in events {
            if !grouped.contains_key(&event.submission_id) {
                order.push(event.submission_id);
            }
            grouped
                .entry(event.submission_id)
                .or_default()
                .push(event.clone());
        }

        order
            .into_iter()
            .filter_map(|id| grouped.get(&id).and_then(|evs| Self::from_events(evs)))
            .collect()
    }

    /// Apply a single event to update the state
    pub fn apply_event(&mut self, event: &StageEvent) {
        if self.content_hash.is_none() {
            self.content_hash = event.content_hash.clone();
        }

        match event.event_type {
            EventType::StageStarted => {
                self.stage_statuses.insert(event.stage, StageStatus::Running);
            }
            EventType::WorkflowStarted => {}
            EventType::StageCompleted => {
                self.stage_statuses
                    .insert(event.stage, StageStatus::Completed);
                if event.stage == Stage::Notification {
                    self.state = SubmissionState::Processed;
                    self.finished_at = Some(event.timestamp);
                }
            }
            EventType::StageSkipped => {
                self.stage_statuses.insert(event.stage, StageStatus::Skipped);
                self.state = SubmissionState::Duplicate {
                    checkpoint: event.stage,
                };
                self.finished_at = Some(event.timestamp);
            }
            EventType::StageFailed => {
                self.stage_statuses.insert(event.stage, StageStatus::Failed);
                self.state = SubmissionState::Failed {
                    stage: event.stage,
                    error: event.error.clone().unwrap_or_default(),
                };
                self.finished_at = Some(event.timestamp);
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self.state, SubmissionState::Running)
    }

    pub fn stage_status(&self, stage: Stage) -> StageStatus {
        self.stage_statuses.get(&stage).copied().unwrap_or_default()
    }
}

/// Overall state of a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SubmissionState {
    Running,

    /// Full pipeline ran and the submitter was notified
    Processed,

    /// Short-circuited at a dedup checkpoint
    Duplicate { checkpoint: Stage },

    Failed { stage: Stage, error: String },
}
