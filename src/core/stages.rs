//! Stage entry points.
//!
//! Each stage is an independent async call that takes its input by value
//! and hands back the payload for the next stage. Ingestion and analysis
//! return `Err` only when no content key can be derived yet; from then on
//! failures travel inside `StagePayload.error` so the orchestrator sees the
//! submission they belong to.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{
    ArtifactStore, CacheConnector, ExtractionRequest, Extractor, Notifier, RecordStore,
    WorkflowTrigger,
};
use crate::domain::{
    decode_identity, validate, AnalysisRecord, AnalysisResult, ArtifactLocation, ArtifactPath,
    ContentKey, Disposition, StagePayload,
};

use super::dedup::{ingestion_key, persistence_key, CacheDecision, DedupGate, RecordOutcome};
use super::error::PipelineError;

/// Default artifact size limit (10 MiB)
pub const DEFAULT_MAX_ARTIFACT_BYTES: usize = 10 * 1024 * 1024;

/// Default notification subject
pub const DEFAULT_SUBJECT: &str = "Your Resume Analysis Results";

/// Default extraction model
pub const DEFAULT_MODEL: &str = "gpt-4.1";

/// Handles to every external collaborator
#[derive(Clone)]
pub struct Collaborators {
    pub artifacts: Arc<dyn ArtifactStore>,
    pub records: Arc<dyn RecordStore>,
    pub cache: Arc<dyn CacheConnector>,
    pub extractor: Arc<dyn Extractor>,
    pub trigger: Arc<dyn WorkflowTrigger>,
    pub notifier: Arc<dyn Notifier>,
}

/// Tunables shared by the stages
#[derive(Debug, Clone)]
pub struct StageSettings {
    pub bucket: String,
    pub cache_ttl: Duration,
    pub max_artifact_bytes: usize,
    pub model: String,
    pub subject: String,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            bucket: "resumes".to_string(),
            cache_ttl: super::dedup::DEFAULT_TTL,
            max_artifact_bytes: DEFAULT_MAX_ARTIFACT_BYTES,
            model: DEFAULT_MODEL.to_string(),
            subject: DEFAULT_SUBJECT.to_string(),
        }
    }
}

/// An uploaded resume as received by the ingestion stage
#[derive(Debug, Clone)]
pub struct Submission {
    pub bytes: Vec<u8>,
    pub email: String,
    pub position: String,
    pub first_name: String,
    pub last_name: String,
}

impl Submission {
    pub fn submitter_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}

/// What the ingestion stage did with a submission
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// Stored and handed to the workflow
    Accepted {
        payload: StagePayload,
        location: ArtifactLocation,
        execution_id: String,
    },

    /// Seen within the TTL window; carries the cached result
    Duplicate { payload: StagePayload },
}

impl IngestOutcome {
    pub fn payload(&self) -> &StagePayload {
        match self {
            Self::Accepted { payload, .. } | Self::Duplicate { payload } => payload,
        }
    }
}

/// The four pipeline stages over one set of collaborators
#[derive(Clone)]
pub struct Stages {
    collaborators: Collaborators,
    settings: StageSettings,
    gate: DedupGate,
}

impl Stages {
    pub fn new(collaborators: Collaborators, settings: StageSettings) -> Self {
        let gate = DedupGate::new(Arc::clone(&collaborators.cache), settings.cache_ttl);
        Self {
            collaborators,
            settings,
            gate,
        }
    }

    pub fn settings(&self) -> &StageSettings {
        &self.settings
    }

    pub fn gate(&self) -> &DedupGate {
        &self.gate
    }

    /// Ingestion: derive the key, consult the ingestion checkpoint, store the
    /// artifact and start the workflow.
    #[instrument(skip_all, fields(position = %submission.position))]
    pub async fn ingest(&self, submission: &Submission) -> Result<IngestOutcome, PipelineError> {
        if submission.bytes.len() > self.settings.max_artifact_bytes {
            return Err(PipelineError::InvalidContent(format!(
                "artifact is {} bytes, limit is {}",
                submission.bytes.len(),
                self.settings.max_artifact_bytes
            )));
        }

        let key = ContentKey::derive(&submission.bytes, &submission.email, &submission.position)?;
        debug!(address = %submission.email, hash = key.short_hash(), "Derived content key");

        if let CacheDecision::Hit(cached) = self.gate.check(&ingestion_key(&key)).await? {
            info!(hash = key.short_hash(), "Duplicate submission, returning cached result");
            return Ok(IngestOutcome::Duplicate {
                payload: StagePayload::new(key).with_result(cached).skipped(),
            });
        }

        let path = ArtifactPath::for_submission(&key, &submission.submitter_name());
        let location = ArtifactLocation::new(&self.settings.bucket, path.to_string());

        self.collaborators
            .artifacts
            .put(&location, &submission.bytes)
            .await
            .map_err(PipelineError::storage_write)?;

        let execution_id = self
            .collaborators
            .trigger
            .start(&location)
            .await
            .map_err(|e| PipelineError::WorkflowTrigger(format!("{:#}", e)))?;

        info!(%location, %execution_id, "Artifact stored and workflow started");

        Ok(IngestOutcome::Accepted {
            payload: StagePayload::new(key),
            location,
            execution_id,
        })
    }

    /// Analysis: fetch the artifact, run the extraction and validate its output.
    #[instrument(skip_all, fields(location = %location))]
    pub async fn analyze(&self, location: &ArtifactLocation) -> Result<StagePayload, PipelineError> {
        let path = ArtifactPath::parse(&location.key)
            .map_err(|e| PipelineError::InvalidPayload(e.to_string()))?;

        let bytes = self
            .collaborators
            .artifacts
            .get(location)
            .await
            .map_err(PipelineError::storage_read)?;

        let address = decode_identity(&path.identity_token)?;
        let position = path.position();
        let key = ContentKey::derive(&bytes, &address, &position)?;
        let payload = StagePayload::new(key);

        let request = ExtractionRequest {
            model: self.settings.model.clone(),
            file_name: path.file_name.clone(),
            bytes,
            instruction: analysis_prompt(&position),
        };

        debug!(
            extractor = self.collaborators.extractor.name(),
            size = request.bytes.len(),
            "Requesting analysis"
        );

        let raw = match self.collaborators.extractor.extract(request).await {
            Ok(raw) => raw,
            Err(e) => {
                let err = PipelineError::Extraction(format!("{:#}", e));
                error!(error = %err, "Extraction failed");
                return Ok(payload.failed(err.to_stage_error()));
            }
        };

        match validate(&raw) {
            Ok(result) => {
                info!(
                    hash = payload.content_key.short_hash(),
                    score = result.score(),
                    recommendations = result.recommendations().len(),
                    "Analysis validated"
                );
                Ok(payload.with_result(result))
            }
            Err(violation) => {
                let err = PipelineError::from(violation);
                warn!(error = %err, "Rejected extraction output");
                Ok(payload.failed(err.to_stage_error()))
            }
        }
    }

    /// Persistence: consult the persistence checkpoint, write the record and
    /// populate the cache.
    #[instrument(skip_all, fields(hash = payload.content_key.short_hash()))]
    pub async fn persist(&self, payload: StagePayload) -> StagePayload {
        match payload.disposition() {
            Disposition::Failed(error) => {
                debug!(%error, "Upstream failure, nothing to persist");
                return payload;
            }
            Disposition::AlreadyHandled => return payload,
            Disposition::Proceed => {}
        }

        let Some(result) = payload.analysis_result.clone() else {
            return payload.failed(PipelineError::MissingAnalysis.to_stage_error());
        };

        match self.gate.check(&persistence_key(payload.content_hash())).await {
            Ok(CacheDecision::Hit(cached)) => {
                info!("Already persisted, skipping write and notification");
                if let Err(err) = self.gate.record_ingestion(&payload.content_key, &cached).await {
                    warn!(error = %err, "Failed to backfill ingestion checkpoint");
                }
                return payload.with_result(cached).skipped();
            }
            Ok(CacheDecision::Miss) => {}
            Err(err) => {
                error!(error = %err, "Persistence checkpoint failed");
                return payload.failed(err.to_stage_error());
            }
        }

        let record = AnalysisRecord::new(payload.content_hash(), &result);
        if let Err(e) = self.collaborators.records.put(&record).await {
            let err = PipelineError::storage_write(e);
            error!(error = %err, "Record write failed");
            return payload.failed(err.to_stage_error());
        }

        match self.gate.record_completion(&payload.content_key, &result).await {
            Ok(RecordOutcome::Recorded) => {
                info!(ttl_secs = self.gate.ttl().as_secs(), "Record written and cached");
                payload
            }
            Ok(RecordOutcome::AlreadyPresent) => payload.skipped(),
            Err(err) => {
                error!(error = %err, "Failed to cache result");
                payload.failed(err.to_stage_error())
            }
        }
    }

    /// Notification: tell the submitter about the result.
    #[instrument(skip_all, fields(hash = payload.content_key.short_hash()))]
    pub async fn notify(&self, payload: StagePayload) -> StagePayload {
        match payload.disposition() {
            Disposition::Failed(_) => return payload,
            Disposition::AlreadyHandled => {
                debug!("Already handled, no notification");
                return payload;
            }
            Disposition::Proceed => {}
        }

        let Some(result) = payload.analysis_result.clone() else {
            return payload.failed(PipelineError::MissingAnalysis.to_stage_error());
        };

        let address = match payload.content_key.address() {
            Ok(address) => address,
            Err(e) => return payload.failed(PipelineError::from(e).to_stage_error()),
        };

        let body = compose_message(&address, &result);
        let notifier = &self.collaborators.notifier;

        if let Err(e) = notifier.send(&address, &self.settings.subject, &body).await {
            let err = PipelineError::Notification(format!("{:#}", e));
            error!(channel = notifier.name(), error = %err, "Notification failed");
            return payload.failed(err.to_stage_error());
        }

        info!(channel = notifier.name(), "Submitter notified");
        payload
    }
}

/// Instruction sent to the extraction service
pub fn analysis_prompt(position: &str) -> String {
    format!(
        r#"You are an AI Resume Analyzer.

Your task is to analyze the uploaded resume and evaluate it for the position: "{position}".

Please provide the following structured JSON output:

{{
  "score": <integer from 0 to 100>,
  "recommendations": [
    "short actionable recommendation 1",
    "short actionable recommendation 2",
    "short actionable recommendation n"
  ],
  "analysisDate": "<ISO 8601 date>"
}}

Scoring Criteria:
- Relevance of experience to the job title
- Technical skills matching the position
- Clarity and conciseness of resume
- Formatting and structure
- Soft skills or leadership (if evident)

Be concise. Focus on value for hiring managers.
"#
    )
}

/// Body of the result notification
pub fn compose_message(address: &str, result: &AnalysisResult) -> String {
    let bullets = result
        .recommendations()
        .iter()
        .map(|r| format!("- {}", r))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Hello {},\n\nYour resume has been analyzed. Here are your results:\n\nScore: {}\n\nRecommendations:\n{}\n\nBest of luck!\n",
        address,
        result.score(),
        bullets
    )
}
