//! TTL cache backends.
//!
//! - `MemoryCache`: in-process map, shared by every connection cloned from it
//! - `FileCache`: JSONL file; each connection holds an exclusive lock on the
//!   file, so `set_if_absent` is atomic across processes. Expired and
//!   superseded lines are dropped when a connection opens the file

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{CacheConnection, CacheConnector};

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process TTL cache
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, MemoryEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub async fn live_entries(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }
}

#[async_trait]
impl CacheConnector for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self) -> Result<Box<dyn CacheConnection>> {
        Ok(Box::new(MemoryConnection {
            entries: Arc::clone(&self.entries),
        }))
    }
}

struct MemoryConnection {
    entries: Arc<Mutex<HashMap<String, MemoryEntry>>>,
}

impl MemoryConnection {
    fn live_value(entries: &mut HashMap<String, MemoryEntry>, key: &str) -> Option<String> {
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl CacheConnection for MemoryConnection {
    async fn exists(&mut self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        Ok(Self::live_value(&mut entries, key).is_some())
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        Ok(Self::live_value(&mut entries, key))
    }

    async fn set_with_expiry(&mut self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(&mut self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        // Check and insert under one lock
        let mut entries = self.entries.lock().await;
        if Self::live_value(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }
}

// ============================================================================
// File-backed backend
// ============================================================================

/// One line of the cache file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheLine {
    key: String,
    value: String,
    expires_at: DateTime<Utc>,
}

/// JSONL-backed TTL cache shared by every process pointing at the same file
#[derive(Debug, Clone)]
pub struct FileCache {
    path: PathBuf,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CacheConnector for FileCache {
    fn name(&self) -> &str {
        "file"
    }

    async fn connect(&self) -> Result<Box<dyn CacheConnection>> {
        let path = self.path.clone();

        // Lock acquisition blocks, keep it off the runtime threads
        let (file, entries) = tokio::task::spawn_blocking(move || -> Result<_> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create cache directory: {}", parent.display())
                })?;
            }

            let mut file = OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open cache file: {}", path.display()))?;

            file.lock_exclusive()
                .with_context(|| format!("Failed to lock cache file: {}", path.display()))?;

            let entries = load_and_compact(&mut file)
                .with_context(|| format!("Failed to load cache file: {}", path.display()))?;

            Ok((file, entries))
        })
        .await
        .context("Cache connect task panicked")??;

        Ok(Box::new(FileConnection {
            file: Some(file),
            entries,
        }))
    }
}

/// Read every line and keep the latest live entry per key.
///
/// When the file holds expired or superseded lines it is rewritten with the
/// live entries only. Must be called with the exclusive lock held.
fn load_and_compact(file: &mut File) -> Result<HashMap<String, CacheLine>> {
    file.seek(SeekFrom::Start(0))
        .context("Failed to rewind cache file")?;

    let mut entries: HashMap<String, CacheLine> = HashMap::new();
    let mut lines = 0usize;

    for line in BufReader::new(&*file).lines() {
        let line = line.context("Failed to read cache file")?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: CacheLine = serde_json::from_str(&line)
            .with_context(|| format!("Failed to parse cache line: {}", line))?;
        lines += 1;
        entries.insert(entry.key.clone(), entry);
    }

    let now = Utc::now();
    entries.retain(|_, entry| entry.expires_at > now);

    if lines > entries.len() {
        let mut body = String::new();
        for entry in entries.values() {
            body.push_str(&serde_json::to_string(entry).context("Failed to serialize cache entry")?);
            body.push('\n');
        }

        // Append mode writes at the end, which is offset 0 after truncation
        file.set_len(0).context("Failed to truncate cache file")?;
        file.write_all(body.as_bytes())
            .context("Failed to rewrite cache file")?;
        file.flush().context("Failed to flush cache file")?;

        debug!(dropped = lines - entries.len(), kept = entries.len(), "Compacted cache file");
    }

    Ok(entries)
}

/// Holds the exclusive lock until dropped.
///
/// No other connection can write while the lock is held, so the entries
/// loaded at connect time stay authoritative for the connection's lifetime.
struct FileConnection {
    file: Option<File>,
    entries: HashMap<String, CacheLine>,
}

impl FileConnection {
    fn lookup(&self, key: &str) -> Option<String> {
        self.entries
            .get(key)
            .filter(|entry| entry.expires_at > Utc::now())
            .map(|entry| entry.value.clone())
    }

    async fn append(&mut self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl).context("Cache TTL out of range")?;
        let entry = CacheLine {
            key: key.to_string(),
            value: value.to_string(),
            expires_at: Utc::now() + ttl,
        };
        let json = serde_json::to_string(&entry).context("Failed to serialize cache entry")?;

        let mut file = self
            .file
            .take()
            .context("Cache connection lost its file handle")?;

        let (file, written) = tokio::task::spawn_blocking(move || {
            let written = writeln!(file, "{}", json)
                .and_then(|_| file.flush())
                .context("Failed to write cache entry");
            (file, written)
        })
        .await
        .context("Cache write task panicked")?;

        self.file = Some(file);
        written?;

        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }
}

#[async_trait]
impl CacheConnection for FileConnection {
    async fn exists(&mut self, key: &str) -> Result<bool> {
        Ok(self.lookup(key).is_some())
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self.lookup(key))
    }

    async fn set_with_expiry(&mut self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.append(key, value, ttl).await
    }

    async fn set_if_absent(&mut self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        // The connection holds the file lock, so lookup + append is atomic
        if self.lookup(key).is_some() {
            return Ok(false);
        }
        self.append(key, value, ttl).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_cache_roundtrip() {
        let cache = MemoryCache::new();
        let mut conn = cache.connect().await.unwrap();

        assert!(!conn.exists("k").await.unwrap());
        conn.set_with_expiry("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(conn.exists("k").await.unwrap());
        assert_eq!(conn.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_memory_cache_set_if_absent() {
        let cache = MemoryCache::new();
        let mut conn = cache.connect().await.unwrap();

        assert!(conn.set_if_absent("k", "first", Duration::from_secs(60)).await.unwrap());
        assert!(!conn.set_if_absent("k", "second", Duration::from_secs(60)).await.unwrap());
        assert_eq!(conn.get("k").await.unwrap(), Some("first".to_string()));
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();
        let mut conn = cache.connect().await.unwrap();

        conn.set_with_expiry("k", "v", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!conn.exists("k").await.unwrap());
        assert_eq!(cache.live_entries().await, 0);
        // An expired entry no longer blocks a conditional set
        assert!(conn.set_if_absent("k", "v2", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_connections_share_state() {
        let cache = MemoryCache::new();
        {
            let mut writer = cache.connect().await.unwrap();
            writer
                .set_with_expiry("k", "v", Duration::from_secs(60))
                .await
                .unwrap();
        }
        let mut reader = cache.connect().await.unwrap();
        assert!(reader.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_cache_persists_between_connections() {
        let temp = TempDir::new().unwrap();
        let cache = FileCache::new(temp.path().join("cache.jsonl"));

        {
            let mut conn = cache.connect().await.unwrap();
            assert!(conn.set_if_absent("resume:h1", "{}", Duration::from_secs(60)).await.unwrap());
        }

        // A second handle on the same file (another process, in practice)
        let other = FileCache::new(cache.path().to_path_buf());
        let mut conn = other.connect().await.unwrap();
        assert_eq!(conn.get("resume:h1").await.unwrap(), Some("{}".to_string()));
        assert!(!conn.set_if_absent("resume:h1", "{}", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_cache_latest_entry_wins_and_expires() {
        let temp = TempDir::new().unwrap();
        let cache = FileCache::new(temp.path().join("cache.jsonl"));
        let mut conn = cache.connect().await.unwrap();

        conn.set_with_expiry("k", "old", Duration::from_secs(60)).await.unwrap();
        conn.set_with_expiry("k", "new", Duration::from_millis(20)).await.unwrap();
        assert_eq!(conn.get("k").await.unwrap(), Some("new".to_string()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(conn.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_cache_compacts_stale_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.jsonl");
        let cache = FileCache::new(&path);

        {
            let mut conn = cache.connect().await.unwrap();
            conn.set_with_expiry("short", "v", Duration::from_millis(20)).await.unwrap();
            conn.set_with_expiry("kept", "old", Duration::from_secs(60)).await.unwrap();
            conn.set_with_expiry("kept", "new", Duration::from_secs(60)).await.unwrap();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 3);

        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let mut conn = cache.connect().await.unwrap();
            assert_eq!(conn.get("kept").await.unwrap(), Some("new".to_string()));
            assert!(!conn.exists("short").await.unwrap());
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("\"new\""));
        assert!(!contents.contains("short"));

        // Writes after compaction still land and survive the next connection
        {
            let mut conn = cache.connect().await.unwrap();
            assert!(conn.set_if_absent("other", "x", Duration::from_secs(60)).await.unwrap());
        }
        let mut conn = cache.connect().await.unwrap();
        assert!(conn.exists("other").await.unwrap());
        assert!(conn.exists("kept").await.unwrap());
    }
}
