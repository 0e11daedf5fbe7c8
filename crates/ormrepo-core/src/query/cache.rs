//! Descriptor cache.
//!
//! Descriptors are pure functions of their signature and the catalog, so a
//! race between two resolutions of the same signature is harmless: the first
//! entry to land is kept and every caller gets that one back.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::descriptor::QueryDescriptor;
use crate::error::Result;

/// Cached descriptor with its hit count.
#[derive(Debug)]
pub struct CachedDescriptor {
    pub descriptor: Arc<QueryDescriptor>,
    hit_count: AtomicU64,
}

impl CachedDescriptor {
    fn new(descriptor: QueryDescriptor) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            hit_count: AtomicU64::new(0),
        }
    }

    /// Increment the hit count and return the new value.
    pub fn record_hit(&self) -> u64 {
        self.hit_count.fetch_add(1, AtomicOrdering::Relaxed) + 1
    }

    pub fn hits(&self) -> u64 {
        self.hit_count.load(AtomicOrdering::Relaxed)
    }
}

/// Cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(AtomicOrdering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(AtomicOrdering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(AtomicOrdering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

/// Process-wide descriptor cache keyed by method signature.
///
/// Built once at startup and shared behind an `Arc` by every session. When
/// full, the entry with the fewest hits is evicted.
#[derive(Debug)]
pub struct DescriptorCache {
    entries: DashMap<String, Arc<CachedDescriptor>>,
    max_entries: usize,
    stats: CacheStats,
}

impl DescriptorCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            stats: CacheStats::default(),
        }
    }

    /// Get a cached descriptor.
    pub fn get(&self, signature: &str) -> Option<Arc<QueryDescriptor>> {
        match self.entries.get(signature) {
            Some(cached) => {
                cached.record_hit();
                self.stats.hits.fetch_add(1, AtomicOrdering::Relaxed);
                Some(Arc::clone(&cached.descriptor))
            }
            None => None,
        }
    }

    /// Get the descriptor for `signature`, resolving and caching it on a
    /// miss. Resolution errors are returned and nothing is cached.
    pub fn get_or_resolve<F>(&self, signature: &str, resolve: F) -> Result<Arc<QueryDescriptor>>
    where
        F: FnOnce() -> Result<QueryDescriptor>,
    {
        if let Some(descriptor) = self.get(signature) {
            return Ok(descriptor);
        }
        self.stats.misses.fetch_add(1, AtomicOrdering::Relaxed);
        debug!(signature, "descriptor cache miss");

        let resolved = resolve()?;
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(signature) {
            self.evict_least_used();
        }
        let cached = self
            .entries
            .entry(signature.to_string())
            .or_insert_with(|| Arc::new(CachedDescriptor::new(resolved)))
            .value()
            .clone();
        Ok(Arc::clone(&cached.descriptor))
    }

    fn evict_least_used(&self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().hits())
            .map(|entry| entry.key().clone());
        if let Some(key) = victim {
            if self.entries.remove(&key).is_some() {
                self.stats.evictions.fetch_add(1, AtomicOrdering::Relaxed);
                debug!(signature = %key, "evicted descriptor");
            }
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
