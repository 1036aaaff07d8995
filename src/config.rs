//! Configuration for resume-gate.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (RESUME_GATE_HOME, RESUME_GATE_BUCKET, ...)
//! 2. Config file (.resume-gate/config.yaml)
//! 3. Defaults (~/.resume-gate)
//!
//! Config file discovery:
//! - Searches current directory and parents for .resume-gate/config.yaml
//! - `paths.home` is relative to the .resume-gate/ directory

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::openai::DEFAULT_ENDPOINT;
use crate::core::dedup::DEFAULT_TTL;
use crate::core::stages::{StageSettings, DEFAULT_MAX_ARTIFACT_BYTES, DEFAULT_MODEL, DEFAULT_SUBJECT};
use crate::core::DEFAULT_STAGE_TIMEOUT;

/// Directory holding the config file and, by default, local state
pub const CONFIG_DIR: &str = ".resume-gate";

/// Default sender address for notifications
pub const DEFAULT_FROM: &str = "noreply@resume-gate.local";

/// Default artifact bucket
pub const DEFAULT_BUCKET: &str = "resumes";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
    #[serde(default)]
    pub cache: Option<CacheConfig>,
    #[serde(default)]
    pub limits: Option<LimitsConfig>,
    #[serde(default)]
    pub extraction: Option<ExtractionConfig>,
    #[serde(default)]
    pub notification: Option<NotificationConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .resume-gate/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub bucket: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    pub stage_timeout_seconds: Option<u64>,
    pub max_artifact_bytes: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    pub model: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    pub from: Option<String>,
    pub subject: Option<String>,
    pub webhook_url: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// State directory (artifacts, records, cache, logs)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub bucket: String,
    pub cache_ttl_seconds: u64,
    pub stage_timeout_seconds: u64,
    pub max_artifact_bytes: usize,
    pub model: String,
    pub extraction_endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub notify_from: String,
    pub subject: String,
    pub webhook_url: Option<String>,
    #[serde(skip_serializing)]
    pub webhook_token: Option<String>,
}

impl ResolvedConfig {
    /// Defaults rooted at the given state directory
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            config_file: None,
            bucket: DEFAULT_BUCKET.to_string(),
            cache_ttl_seconds: DEFAULT_TTL.as_secs(),
            stage_timeout_seconds: DEFAULT_STAGE_TIMEOUT.as_secs(),
            max_artifact_bytes: DEFAULT_MAX_ARTIFACT_BYTES,
            model: DEFAULT_MODEL.to_string(),
            extraction_endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            notify_from: DEFAULT_FROM.to_string(),
            subject: DEFAULT_SUBJECT.to_string(),
            webhook_url: None,
            webhook_token: None,
        }
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.home.join("artifacts")
    }

    pub fn records_path(&self) -> PathBuf {
        self.home.join("records.jsonl")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.home.join("cache.jsonl")
    }

    pub fn events_path(&self) -> PathBuf {
        self.home.join("events.jsonl")
    }

    pub fn workflows_path(&self) -> PathBuf {
        self.home.join("workflows.jsonl")
    }

    pub fn outbox_path(&self) -> PathBuf {
        self.home.join("outbox.jsonl")
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_seconds)
    }

    pub fn stage_settings(&self) -> StageSettings {
        StageSettings {
            bucket: self.bucket.clone(),
            cache_ttl: Duration::from_secs(self.cache_ttl_seconds),
            max_artifact_bytes: self.max_artifact_bytes,
            model: self.model.clone(),
            subject: self.subject.clone(),
        }
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from the process environment and working directory
pub fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_from(&cwd, |name| std::env::var(name).ok())
}

/// Load configuration starting the file search at `start`, reading
/// environment variables through `env`
pub fn load_config_from<E>(start: &Path, env: E) -> Result<ResolvedConfig>
where
    E: Fn(&str) -> Option<String>,
{
    let config_file = find_config_file(start);
    let file = match &config_file {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    // Resolve home path
    let home = if let Some(env_home) = env("RESUME_GATE_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(home_path), Some(config_path)) = (&file.paths.home, &config_file) {
        let config_dir = config_path.parent().unwrap_or(Path::new("."));
        resolve_path(config_dir, home_path)
    } else {
        dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(CONFIG_DIR)
    };

    let mut config = ResolvedConfig::with_home(home);
    config.config_file = config_file;

    if let Some(bucket) = file.storage.and_then(|s| s.bucket) {
        config.bucket = bucket;
    }
    if let Some(ttl) = file.cache.and_then(|c| c.ttl_seconds) {
        config.cache_ttl_seconds = ttl;
    }
    if let Some(limits) = file.limits {
        if let Some(timeout) = limits.stage_timeout_seconds {
            config.stage_timeout_seconds = timeout;
        }
        if let Some(max) = limits.max_artifact_bytes {
            config.max_artifact_bytes = max;
        }
    }
    if let Some(extraction) = file.extraction {
        if let Some(model) = extraction.model {
            config.model = model;
        }
        if let Some(endpoint) = extraction.endpoint {
            config.extraction_endpoint = endpoint;
        }
    }
    if let Some(notification) = file.notification {
        if let Some(from) = notification.from {
            config.notify_from = from;
        }
        if let Some(subject) = notification.subject {
            config.subject = subject;
        }
        config.webhook_url = notification.webhook_url;
    }

    // Environment overrides
    if let Some(bucket) = env("RESUME_GATE_BUCKET") {
        config.bucket = bucket;
    }
    if let Some(model) = env("RESUME_GATE_MODEL") {
        config.model = model;
    }
    if let Some(url) = env("RESUME_GATE_NOTIFY_URL") {
        config.webhook_url = Some(url);
    }
    config.webhook_token = env("RESUME_GATE_NOTIFY_TOKEN");
    config.api_key = env("OPENAI_API_KEY");

    if config.cache_ttl_seconds == 0 {
        anyhow::bail!("cache.ttl_seconds must be greater than zero");
    }
    if config.stage_timeout_seconds == 0 {
        anyhow::bail!("limits.stage_timeout_seconds must be greater than zero");
    }

    Ok(config)
}
