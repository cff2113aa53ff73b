//! Named, versioned cache partitions.
//!
//! A [`CachePartition`] holds request-URL → response pairs behind an async
//! lock, so a single URL's entry is never read mid-write. The
//! [`PartitionStore`] owns all partitions for a client context and supports
//! the allow-list purge that versioned activation depends on.

use crate::error::Result;
use crate::types::StoredResponse;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Partition statistics snapshot.
#[derive(Debug, Clone, Default)]
pub struct PartitionStats {
    /// Partition name.
    pub name: String,
    /// Current number of entries.
    pub entries: usize,
    /// Total lookup hits.
    pub hits: u64,
    /// Total lookup misses.
    pub misses: u64,
    /// Entries evicted by the per-partition cap.
    pub evictions: u64,
}

impl PartitionStats {
    /// Calculate hit ratio.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// A named, versioned container of request-URL → response pairs.
///
/// Put and match are atomic at the entry level; entries beyond the cap are
/// evicted least-recently-used first.
pub struct CachePartition {
    name: String,
    entries: RwLock<LruCache<String, StoredResponse>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CachePartition {
    /// Create a partition with the given entry cap.
    pub fn new(name: &str, max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            name: name.to_string(),
            entries: RwLock::new(LruCache::new(cap)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Partition name, including the version tag.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up the cached response for a URL.
    pub async fn match_url(&self, url: &str) -> Option<StoredResponse> {
        let mut entries = self.entries.write().await;
        match entries.get(url) {
            Some(response) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(response.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a response for a URL, evicting the least-recently-used entry
    /// if the partition is at capacity.
    pub async fn put(&self, url: &str, response: StoredResponse) {
        let mut entries = self.entries.write().await;
        if let Some((evicted_url, _)) = entries.push(url.to_string(), response) {
            if evicted_url != url {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Remove an entry.
    pub async fn remove(&self, url: &str) -> bool {
        self.entries.write().await.pop(url).is_some()
    }

    /// Number of entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if the partition is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Get partition statistics.
    pub async fn stats(&self) -> PartitionStats {
        PartitionStats {
            name: self.name.clone(),
            entries: self.entries.read().await.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Store of all partitions owned by one client context.
pub struct PartitionStore {
    partitions: RwLock<HashMap<String, Arc<CachePartition>>>,
    max_entries: usize,
}

impl PartitionStore {
    /// Create an empty store with a per-partition entry cap.
    pub fn new(max_entries: usize) -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    /// Open a partition, creating it if absent.
    pub async fn open(&self, name: &str) -> Arc<CachePartition> {
        let mut partitions = self.partitions.write().await;
        partitions
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CachePartition::new(name, self.max_entries)))
            .clone()
    }

    /// Get a partition without creating it.
    pub async fn get(&self, name: &str) -> Option<Arc<CachePartition>> {
        self.partitions.read().await.get(name).cloned()
    }

    /// Delete a partition. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.partitions.write().await.remove(name).is_some())
    }

    /// Names of all partitions.
    pub async fn names(&self) -> Vec<String> {
        self.partitions.read().await.keys().cloned().collect()
    }

    /// Delete every partition not in the allow-list. Returns the names of
    /// the deleted partitions.
    pub async fn purge_except(&self, allow: &[String]) -> Result<Vec<String>> {
        let mut partitions = self.partitions.write().await;
        let stale: Vec<String> = partitions
            .keys()
            .filter(|name| !allow.contains(name))
            .cloned()
            .collect();

        for name in &stale {
            partitions.remove(name);
        }

        Ok(stale)
    }

    /// Statistics for all partitions.
    pub async fn stats(&self) -> Vec<PartitionStats> {
        let partitions: Vec<Arc<CachePartition>> =
            self.partitions.read().await.values().cloned().collect();

        let mut stats = Vec::with_capacity(partitions.len());
        for partition in partitions {
            stats.push(partition.stats().await);
        }
        stats
    }
}

/// Build the full partition name for a logical partition and version.
pub fn partition_name(prefix: &str, logical: &str, version: &str) -> String {
    format!("{}-{}-{}", prefix, logical, version)
}
