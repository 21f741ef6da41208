//! Explicit memoization of pipeline results.
//!
//! A [`CacheKey`] hashes the file manifest (path, size, modification time),
//! the cleaning thresholds and the filter. Entries expire after a TTL or on
//! [`PipelineCache::invalidate`]. Cached values are shared read-only.

use serde::Serialize;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, UNIX_EPOCH};
use tracing::debug;

use crate::config::CleaningConfig;
use crate::error::DataNotFound;
use crate::loader::discover_files;
use crate::schema::CACHE_TTL_SECS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

/// One discovered file as it affects the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub len: u64,
    /// Nanoseconds since the epoch, so same-size rewrites within a second
    /// still change the key.
    pub modified_nanos: u128,
}

/// Lists the matching files under `dir` with their size and mtime.
pub fn file_manifest(dir: &Path, prefix: Option<&str>) -> Result<Vec<ManifestEntry>, DataNotFound> {
    let files = discover_files(dir, prefix)?;
    Ok(files
        .into_iter()
        .map(|file| {
            let meta = fs::metadata(&file.path).ok();
            let modified_nanos = meta
                .as_ref()
                .and_then(|m| m.modified().ok())
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_nanos());
            ManifestEntry {
                len: meta.map_or(0, |m| m.len()),
                modified_nanos,
                path: file.path,
            }
        })
        .collect())
}

impl CacheKey {
    /// Hashes the JSON encoding of the inputs. `params` is usually a
    /// [`TripFilter`] or a struct carrying one.
    pub fn new(
        manifest: &[ManifestEntry],
        cleaning: &CleaningConfig,
        params: &impl Serialize,
    ) -> serde_json::Result<Self> {
        let encoded = serde_json::to_vec(&(manifest, cleaning, params))?;
        let mut hasher = DefaultHasher::new();
        encoded.hash(&mut hasher);
        Ok(Self(hasher.finish()))
    }
}

struct Entry<V> {
    stored_at: Instant,
    value: Arc<V>,
}

/// Key to result map with a freshness window.
pub struct PipelineCache<V> {
    entries: HashMap<CacheKey, Entry<V>>,
    ttl: Duration,
}

impl<V> Default for PipelineCache<V> {
    fn default() -> Self {
        Self::new(Duration::from_secs(CACHE_TTL_SECS))
    }
}

impl<V> PipelineCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// The cached value for `key` if it is still fresh.
    pub fn get(&self, key: CacheKey) -> Option<Arc<V>> {
        self.entries
            .get(&key)
            .filter(|e| e.stored_at.elapsed() < self.ttl)
            .map(|e| Arc::clone(&e.value))
    }

    /// Returns the fresh cached value or computes, stores and returns a new one.
    /// A failed computation leaves the cache untouched.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: CacheKey,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        if let Some(value) = self.get(key) {
            debug!(?key, "Cache hit");
            return Ok(value);
        }

        debug!(?key, "Cache miss");
        let value = Arc::new(compute()?);
        self.evict_expired();
        self.entries.insert(
            key,
            Entry {
                stored_at: Instant::now(),
                value: Arc::clone(&value),
            },
        );
        Ok(value)
    }

    pub fn invalidate(&mut self, key: CacheKey) -> bool {
        self.entries.remove(&key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drops expired entries.
    pub fn evict_expired(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.stored_at.elapsed() < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
