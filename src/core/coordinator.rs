//! In-process pipeline coordinator.
//!
//! Runs the stages of one submission in order, each under the stage time
//! budget, and records every transition in the event log. Also exposes the
//! single-stage entry point used when an external orchestrator drives the
//! stages with JSON payloads.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{
    FileCache, FsArtifactStore, JournalTrigger, JsonlRecordStore, Notifier, OpenAiExtractor,
    OutboxNotifier, WebhookNotifier,
};
use crate::config::ResolvedConfig;
use crate::domain::{
    AnalysisResult, ArtifactLocation, ContentKey, Disposition, EventType, Stage, StageError,
    StageEvent, StagePayload,
};

use super::error::PipelineError;
use super::event_store::EventLog;
use super::stages::{Collaborators, IngestOutcome, Stages, Submission};

/// Default per-stage time budget
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(300);

/// How a submission ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Outcome {
    /// Analysed, persisted and notified
    Processed { result: AnalysisResult },

    /// Short-circuited at a dedup checkpoint
    Duplicate {
        result: AnalysisResult,
        checkpoint: Stage,
    },

    Failed { stage: Stage, error: StageError },
}

/// Result of running one submission through the pipeline
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReport {
    pub submission_id: Uuid,
    pub content_key: ContentKey,
    pub location: Option<ArtifactLocation>,
    pub outcome: Outcome,
}

/// Drives submissions through the four stages
pub struct Coordinator {
    stages: Stages,
    events: EventLog,
    stage_timeout: Duration,
}

impl Coordinator {
    pub fn new(stages: Stages, events: EventLog, stage_timeout: Duration) -> Self {
        Self {
            stages,
            events,
            stage_timeout,
        }
    }

    /// Wire the local and remote collaborators described by the configuration
    pub fn from_config(config: &ResolvedConfig) -> Self {
        let notifier: Arc<dyn Notifier> = match &config.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(
                url.clone(),
                config.webhook_token.clone(),
                config.notify_from.clone(),
            )),
            None => Arc::new(OutboxNotifier::new(
                config.outbox_path(),
                config.notify_from.clone(),
            )),
        };

        let collaborators = Collaborators {
            artifacts: Arc::new(FsArtifactStore::new(config.artifacts_dir())),
            records: Arc::new(JsonlRecordStore::new(config.records_path())),
            cache: Arc::new(FileCache::new(config.cache_path())),
            extractor: Arc::new(OpenAiExtractor::new(
                config.extraction_endpoint.clone(),
                config.api_key.clone(),
                config.stage_timeout(),
            )),
            trigger: Arc::new(JournalTrigger::new(config.workflows_path())),
            notifier,
        };

        Self::new(
            Stages::new(collaborators, config.stage_settings()),
            EventLog::new(config.events_path()),
            config.stage_timeout(),
        )
    }

    pub fn stages(&self) -> &Stages {
        &self.stages
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Run a submission through every stage.
    ///
    /// Returns `Err` only when ingestion fails; later failures are reported
    /// as `Outcome::Failed`.
    #[instrument(skip_all, fields(position = %submission.position))]
    pub async fn submit(&self, submission: Submission) -> Result<SubmissionReport, PipelineError> {
        let submission_id = Uuid::new_v4();
        info!(%submission_id, size = submission.bytes.len(), "Submission received");

        // Ingestion
        self.log(StageEvent::new(
            submission_id,
            None,
            Stage::Ingestion,
            EventType::StageStarted,
            "Ingestion started",
        ))
        .await;

        let started = Instant::now();
        let ingested = self
            .timed(Stage::Ingestion, self.stages.ingest(&submission))
            .await;

        let (payload, location) = match ingested {
            Ok(IngestOutcome::Accepted {
                payload,
                location,
                execution_id,
            }) => {
                let hash = Some(payload.content_hash().to_string());
                self.log(
                    StageEvent::new(
                        submission_id,
                        hash.clone(),
                        Stage::Ingestion,
                        EventType::StageCompleted,
                        format!("Stored at {}", location),
                    )
                    .with_duration(elapsed_ms(started)),
                )
                .await;
                self.log(StageEvent::new(
                    submission_id,
                    hash,
                    Stage::Ingestion,
                    EventType::WorkflowStarted,
                    format!("Workflow execution {}", execution_id),
                ))
                .await;
                (payload, location)
            }
            Ok(IngestOutcome::Duplicate { payload }) => {
                self.log_payload(submission_id, Stage::Ingestion, &payload, started)
                    .await;
                return Ok(report(submission_id, payload, None, Stage::Ingestion));
            }
            Err(err) => {
                error!(%submission_id, error = %err, "Ingestion failed");
                self.log(
                    StageEvent::new(
                        submission_id,
                        None,
                        Stage::Ingestion,
                        EventType::StageFailed,
                        "Ingestion failed",
                    )
                    .with_duration(elapsed_ms(started))
                    .with_error(err.to_stage_error().to_string()),
                )
                .await;
                return Err(err);
            }
        };

        // Analysis
        let hash = Some(payload.content_hash().to_string());
        self.log(StageEvent::new(
            submission_id,
            hash,
            Stage::Analysis,
            EventType::StageStarted,
            "Analysis started",
        ))
        .await;

        let started = Instant::now();
        let payload = match self
            .timed(Stage::Analysis, self.stages.analyze(&location))
            .await
        {
            Ok(analysed) => analysed,
            Err(err) => payload.failed(err.to_stage_error()),
        };
        self.log_payload(submission_id, Stage::Analysis, &payload, started)
            .await;
        if payload.disposition() != Disposition::Proceed {
            return Ok(report(submission_id, payload, Some(location), Stage::Analysis));
        }

        // Persistence, then notification
        let mut payload = payload;
        for stage in [Stage::Persistence, Stage::Notification] {
            payload = self.advance(submission_id, stage, payload).await;
            if payload.disposition() != Disposition::Proceed {
                return Ok(report(submission_id, payload, Some(location), stage));
            }
        }

        info!(%submission_id, "Submission processed");
        Ok(report(
            submission_id,
            payload,
            Some(location),
            Stage::Notification,
        ))
    }

    /// Run a single stage on its JSON input and return its JSON output.
    ///
    /// Analysis takes `{bucket, key}`; persistence and notification take a
    /// stage payload.
    #[instrument(skip(self, input))]
    pub async fn run_stage(&self, stage: Stage, input: Value) -> Result<Value, PipelineError> {
        let output = match stage {
            Stage::Ingestion => {
                return Err(PipelineError::InvalidPayload(
                    "ingestion takes an uploaded artifact, not a JSON payload".to_string(),
                ))
            }
            Stage::Analysis => {
                let location: ArtifactLocation = serde_json::from_value(input)
                    .map_err(|e| PipelineError::InvalidPayload(e.to_string()))?;
                self.timed(stage, self.stages.analyze(&location)).await?
            }
            Stage::Persistence | Stage::Notification => {
                let payload: StagePayload = serde_json::from_value(input)
                    .map_err(|e| PipelineError::InvalidPayload(e.to_string()))?;
                self.run_payload_stage(stage, payload).await
            }
        };

        serde_json::to_value(&output).map_err(|e| PipelineError::InvalidPayload(e.to_string()))
    }

    /// Run a payload stage with event logging
    async fn advance(&self, submission_id: Uuid, stage: Stage, payload: StagePayload) -> StagePayload {
        self.log(StageEvent::new(
            submission_id,
            Some(payload.content_hash().to_string()),
            stage,
            EventType::StageStarted,
            format!("{} started", stage),
        ))
        .await;

        let started = Instant::now();
        let payload = self.run_payload_stage(stage, payload).await;
        self.log_payload(submission_id, stage, &payload, started)
            .await;
        payload
    }

    /// Run persistence or notification under the time budget. A timeout
    /// fails the incoming payload.
    async fn run_payload_stage(&self, stage: Stage, payload: StagePayload) -> StagePayload {
        let fallback = payload.clone();

        let result = self
            .timed(stage, async {
                Ok(match stage {
                    Stage::Persistence => self.stages.persist(payload).await,
                    Stage::Notification => self.stages.notify(payload).await,
                    Stage::Ingestion | Stage::Analysis => payload,
                })
            })
            .await;

        match result {
            Ok(payload) => payload,
            Err(err) => fallback.failed(err.to_stage_error()),
        }
    }

    /// Await a stage future under the time budget
    async fn timed<T, F>(&self, stage: Stage, future: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        match tokio::time::timeout(self.stage_timeout, future).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%stage, limit_secs = self.stage_timeout.as_secs(), "Stage timed out");
                Err(PipelineError::StageTimeout {
                    stage,
                    limit_seconds: self.stage_timeout.as_secs(),
                })
            }
        }
    }

    /// Record the terminal event of a stage from its output payload
    async fn log_payload(
        &self,
        submission_id: Uuid,
        stage: Stage,
        payload: &StagePayload,
        started: Instant,
    ) {
        let hash = Some(payload.content_hash().to_string());
        let event = match payload.disposition() {
            Disposition::Failed(error) => {
                StageEvent::new(submission_id, hash, stage, EventType::StageFailed, format!("{} failed", stage))
                    .with_error(error.to_string())
            }
            Disposition::AlreadyHandled => StageEvent::new(
                submission_id,
                hash,
                stage,
                EventType::StageSkipped,
                format!("{} skipped: already handled", stage),
            ),
            Disposition::Proceed => StageEvent::new(
                submission_id,
                hash,
                stage,
                EventType::StageCompleted,
                format!("{} completed", stage),
            ),
        };

        self.log(event.with_duration(elapsed_ms(started))).await;
    }

    /// Append to the audit log. The log is not a pipeline side effect, so a
    /// write failure is reported but does not fail the submission.
    async fn log(&self, event: StageEvent) {
        if let Err(e) = self.events.append(&event).await {
            warn!(error = %e, path = %self.events.path().display(), "Failed to append stage event");
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Build the report for the last stage that ran
fn report(
    submission_id: Uuid,
    payload: StagePayload,
    location: Option<ArtifactLocation>,
    stage: Stage,
) -> SubmissionReport {
    let outcome = match (payload.disposition(), &payload.analysis_result) {
        (Disposition::Failed(error), _) => Outcome::Failed {
            stage,
            error: error.clone(),
        },
        (Disposition::AlreadyHandled, Some(result)) => Outcome::Duplicate {
            result: result.clone(),
            checkpoint: stage,
        },
        (Disposition::Proceed, Some(result)) => Outcome::Processed {
            result: result.clone(),
        },
        (_, None) => Outcome::Failed {
            stage,
            error: PipelineError::MissingAnalysis.to_stage_error(),
        },
    };

    SubmissionReport {
        submission_id,
        content_key: payload.content_key,
        location,
        outcome,
    }
}
