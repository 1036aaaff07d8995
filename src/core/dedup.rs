//! Cache-backed dedup gate.
//!
//! Consulted at two checkpoints:
//! - ingestion: `resume:{hash}:position:{slug}`, before the artifact is stored
//! - persistence: `resume:{hash}`, before the record write and notification
//!
//! Each call opens its own connection and drops it before returning, so no
//! connection is held across an extraction call or a store write.
//!
//! The check and the later record are separate calls. Two identical
//! submissions racing between them can both miss and both run the analysis.
//! Recording uses `set_if_absent`, so only one of them wins the persistence
//! key; the loser is told and suppresses its notification.
//!
//! The persistence stage writes the record before it records completion. A
//! stage timeout or crash between the two leaves a record with no cache
//! entry, and a retry of that submission writes the record a second time.
//!
//! A submission that finds the persistence key already taken (a HIT, or a
//! lost `set_if_absent`) still backfills the ingestion key for its own
//! category, so later resubmissions for that position stop at ingestion.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::adapters::{CacheConnection, CacheConnector};
use crate::domain::{AnalysisResult, ContentKey};

use super::error::PipelineError;

/// Namespace prefix for every cache key
pub const CACHE_NAMESPACE: &str = "resume";

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Key checked at the ingestion checkpoint
pub fn ingestion_key(key: &ContentKey) -> String {
    format!(
        "{}:{}:position:{}",
        CACHE_NAMESPACE,
        key.content_hash(),
        key.category_slug()
    )
}

/// Key checked at the persistence checkpoint
pub fn persistence_key(content_hash: &str) -> String {
    format!("{}:{}", CACHE_NAMESPACE, content_hash)
}

/// Outcome of a checkpoint lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDecision {
    /// Already processed; carries the stored result
    Hit(AnalysisResult),

    /// Not seen within the TTL window
    Miss,
}

/// Outcome of recording a completed result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// This call created the entry
    Recorded,

    /// A live entry already existed (a concurrent submission got there first)
    AlreadyPresent,
}

/// The dedup gate
#[derive(Clone)]
pub struct DedupGate {
    connector: Arc<dyn CacheConnector>,
    ttl: Duration,
}

impl DedupGate {
    pub fn new(connector: Arc<dyn CacheConnector>, ttl: Duration) -> Self {
        Self { connector, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn connect(&self) -> Result<Box<dyn CacheConnection>, PipelineError> {
        self.connector.connect().await.map_err(PipelineError::cache)
    }

    /// Look up a checkpoint key
    pub async fn check(&self, key: &str) -> Result<CacheDecision, PipelineError> {
        let mut conn = self.connect().await?;

        if !conn.exists(key).await.map_err(PipelineError::cache)? {
            debug!(key, "Cache miss");
            return Ok(CacheDecision::Miss);
        }

        // May have expired between the two calls
        let Some(raw) = conn.get(key).await.map_err(PipelineError::cache)? else {
            debug!(key, "Cache entry expired during lookup");
            return Ok(CacheDecision::Miss);
        };

        // Only validated results are ever written, so a bad entry is a
        // backend problem rather than something to silently re-run over
        let result: AnalysisResult = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::CacheUnavailable(format!("Corrupt cache entry '{}': {}", key, e))
        })?;

        debug!(key, "Cache hit");
        Ok(CacheDecision::Hit(result))
    }

    /// Record a result under a single key
    pub async fn record(
        &self,
        key: &str,
        result: &AnalysisResult,
    ) -> Result<RecordOutcome, PipelineError> {
        let value = encode(result)?;
        let mut conn = self.connect().await?;

        let created = conn
            .set_if_absent(key, &value, self.ttl)
            .await
            .map_err(PipelineError::cache)?;

        Ok(if created {
            RecordOutcome::Recorded
        } else {
            RecordOutcome::AlreadyPresent
        })
    }

    /// Populate the ingestion key for a key's category, keeping any live entry
    pub async fn record_ingestion(
        &self,
        content_key: &ContentKey,
        result: &AnalysisResult,
    ) -> Result<RecordOutcome, PipelineError> {
        self.record(&ingestion_key(content_key), result).await
    }

    /// Record a completed submission under both checkpoint keys.
    ///
    /// The persistence key is claimed atomically; the ingestion key is only
    /// written by the submission that won that claim.
    pub async fn record_completion(
        &self,
        content_key: &ContentKey,
        result: &AnalysisResult,
    ) -> Result<RecordOutcome, PipelineError> {
        let value = encode(result)?;
        let mut conn = self.connect().await?;

        let created = conn
            .set_if_absent(&persistence_key(content_key.content_hash()), &value, self.ttl)
            .await
            .map_err(PipelineError::cache)?;

        if !created {
            warn!(
                hash = content_key.short_hash(),
                "Persistence key already present; a concurrent submission completed first"
            );

            // Backfill this category with the winning result
            let winner = conn
                .get(&persistence_key(content_key.content_hash()))
                .await
                .map_err(PipelineError::cache)?;
            if let Some(winner) = winner {
                conn.set_if_absent(&ingestion_key(content_key), &winner, self.ttl)
                    .await
                    .map_err(PipelineError::cache)?;
            }

            return Ok(RecordOutcome::AlreadyPresent);
        }

        conn.set_with_expiry(&ingestion_key(content_key), &value, self.ttl)
            .await
            .map_err(PipelineError::cache)?;

        Ok(RecordOutcome::Recorded)
    }
}

fn encode(result: &AnalysisResult) -> Result<String, PipelineError> {
    serde_json::to_string(result)
        .map_err(|e| PipelineError::CacheUnavailable(format!("Failed to encode result: {}", e)))
}
