//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use resume_gate::adapters::{
    CacheConnection, CacheConnector, ExtractionRequest, Extractor, MemoryArtifactStore,
    MemoryCache, MemoryNotifier, MemoryRecordStore, MemoryTrigger,
};
use resume_gate::core::{Collaborators, StageSettings, Stages, Submission};

pub const ANALYSIS_82: &str = r#"{"score": 82, "recommendations": ["Add metrics"]}"#;

/// Extractor that replays canned responses and counts calls
#[derive(Default)]
pub struct ScriptedExtractor {
    responses: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    /// Always answer with the same text
    pub fn always(text: &str) -> Self {
        Self {
            fallback: Some(text.to_string()),
            ..Self::default()
        }
    }

    /// Answer with each response in turn
    pub fn sequence(responses: Vec<Result<&str, &str>>) -> Self {
        Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn extract(&self, _request: ExtractionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => match &self.fallback {
                Some(text) => Ok(text.clone()),
                None => anyhow::bail!("no scripted response left"),
            },
        }
    }
}

/// Cache backend that cannot be reached
pub struct UnreachableCache;

#[async_trait]
impl CacheConnector for UnreachableCache {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn connect(&self) -> Result<Box<dyn CacheConnection>> {
        anyhow::bail!("connection refused")
    }
}

/// Stages wired to in-memory collaborators that tests can inspect
pub struct Harness {
    pub stages: Stages,
    pub artifacts: MemoryArtifactStore,
    pub records: MemoryRecordStore,
    pub cache: MemoryCache,
    pub notifier: MemoryNotifier,
    pub trigger: MemoryTrigger,
    pub extractor: Arc<ScriptedExtractor>,
}

impl Harness {
    pub fn new(extractor: ScriptedExtractor) -> Self {
        Self::with_ttl(extractor, Duration::from_secs(3600))
    }

    pub fn with_ttl(extractor: ScriptedExtractor, ttl: Duration) -> Self {
        let artifacts = MemoryArtifactStore::new();
        let records = MemoryRecordStore::new();
        let cache = MemoryCache::new();
        let notifier = MemoryNotifier::new();
        let trigger = MemoryTrigger::new();
        let extractor = Arc::new(extractor);

        let collaborators = Collaborators {
            artifacts: Arc::new(artifacts.clone()),
            records: Arc::new(records.clone()),
            cache: Arc::new(cache.clone()),
            extractor: extractor.clone(),
            trigger: Arc::new(trigger.clone()),
            notifier: Arc::new(notifier.clone()),
        };

        let settings = StageSettings {
            cache_ttl: ttl,
            ..StageSettings::default()
        };

        Self {
            stages: Stages::new(collaborators, settings),
            artifacts,
            records,
            cache,
            notifier,
            trigger,
            extractor,
        }
    }
}

pub fn submission(bytes: &[u8]) -> Submission {
    Submission {
        bytes: bytes.to_vec(),
        email: "jane@example.com".to_string(),
        position: "software engineer".to_string(),
        first_name: "Jane".to_string(),
        last_name: "Doe".to_string(),
    }
}
