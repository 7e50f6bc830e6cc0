//! Freshness-bounded timemap cache.
//!
//! [`TimeMapCache`] wraps each timemap in a `fetched_at` envelope and applies
//! the size limit; physical storage is delegated to a [`CacheBackend`].
//! Entries are never deleted, only shadowed by the next successful write.

use crate::error::{Result, TimegateError};
use crate::metrics::TimegateMetrics;
use crate::types::TimeMap;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Key/value store underneath the timemap cache.
///
/// Implementations must tolerate concurrent `get`/`set` on the same key;
/// last writer wins.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    fn backend_name(&self) -> &'static str;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
}

/// In-memory backend for development/testing and single-process deployments
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// One file per key under `root/sha256/ab/cd/<digest>`.
pub struct FileSystemBackend {
    root: PathBuf,
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

impl FileSystemBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.root
            .join("sha256")
            .join(&digest[0..2])
            .join(&digest[2..4])
            .join(digest)
    }
}

#[async_trait]
impl CacheBackend for FileSystemBackend {
    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.path_for(key);
        let dir = path
            .parent()
            .ok_or_else(|| TimegateError::Configuration("cache path has no parent".to_string()))?;
        tokio::fs::create_dir_all(dir).await?;

        // Write aside then rename so readers never see a partial entry
        let tmp = path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp, &value).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Backend that never stores anything.
#[derive(Default)]
pub struct NullBackend;

#[async_trait]
impl CacheBackend for NullBackend {
    fn backend_name(&self) -> &'static str {
        "null"
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Vec<u8>) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    fetched_at: DateTime<Utc>,
    data: TimeMap,
}

pub struct TimeMapCache {
    backend: Arc<dyn CacheBackend>,
    tolerance: Duration,
    // 0 means unlimited
    max_size: usize,
}

impl TimeMapCache {
    pub fn new(backend: Arc<dyn CacheBackend>, refresh_time: std::time::Duration, max_size: usize) -> Self {
        let tolerance = Duration::from_std(refresh_time).unwrap_or_else(|_| Duration::days(365 * 1000));
        Self {
            backend,
            tolerance,
            max_size,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Cached timemap of `uri_r` if it was fetched no earlier than
    /// `reference_time - tolerance`.
    pub async fn get(&self, uri_r: &str, reference_time: DateTime<Utc>) -> Option<TimeMap> {
        let bytes = match self.backend.get(uri_r).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                TimegateMetrics::record_cache_miss();
                return None;
            }
            Err(e) => {
                warn!("Cache read for {} failed: {}", uri_r, e);
                TimegateMetrics::record_cache_miss();
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Ignoring undecodable cache entry for {}: {}", uri_r, e);
                TimegateMetrics::record_cache_miss();
                return None;
            }
        };

        let fresh = entry
            .fetched_at
            .checked_add_signed(self.tolerance)
            .map_or(true, |expires| reference_time <= expires);
        if fresh {
            debug!("Cache hit for {}", uri_r);
            TimegateMetrics::record_cache_hit();
            Some(entry.data)
        } else {
            debug!("Cache entry for {} is stale (fetched {})", uri_r, entry.fetched_at);
            TimegateMetrics::record_cache_miss();
            None
        }
    }

    /// Cached timemap of `uri_r` if it is still fresh now.
    pub async fn get_all(&self, uri_r: &str) -> Option<TimeMap> {
        self.get(uri_r, Utc::now()).await
    }

    /// Store `timemap` stamped with the current time. Oversized entries are
    /// silently skipped.
    pub async fn set(&self, uri_r: &str, timemap: &TimeMap) {
        let entry = CacheEntry {
            fetched_at: Utc::now(),
            data: timemap.clone(),
        };
        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not serialize timemap of {} for caching: {}", uri_r, e);
                return;
            }
        };
        if self.max_size > 0 && bytes.len() > self.max_size {
            debug!(
                "Timemap of {} is {} bytes, over the {} byte cache limit",
                uri_r,
                bytes.len(),
                self.max_size
            );
            TimegateMetrics::record_cache_oversize();
            return;
        }
        match self.backend.set(uri_r, bytes).await {
            Ok(()) => TimegateMetrics::record_cache_store(),
            Err(e) => warn!("Cache write for {} failed: {}", uri_r, e),
        }
    }
}
