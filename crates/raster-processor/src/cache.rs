//! LRU cache for decoded source rasters.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::{CacheStats, SourcePixels};

/// Cache key: index of the source within its mosaic.
pub type SourceKey = usize;

/// LRU cache for decoded source pixels with memory-bounded eviction.
///
/// A decode larger than the whole budget lives in a single side slot, so a
/// run over one oversized source still decodes it only once.
pub struct BlockCache {
    cache: LruCache<SourceKey, Arc<SourcePixels>>,
    oversized: Option<(SourceKey, Arc<SourcePixels>)>,
    memory_limit: usize,
    current_memory: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl BlockCache {
    /// Create a new cache with the given memory limit in bytes.
    pub fn new(memory_limit: usize) -> Self {
        // Estimate entry count assuming a 256x256 RGB byte tile
        let entry_estimate = 256 * 256 * 4;
        let max_entries = (memory_limit / entry_estimate).max(16);

        Self {
            cache: LruCache::new(NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN)),
            oversized: None,
            memory_limit,
            current_memory: 0,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a block, updating LRU order and hit/miss counters.
    pub fn get(&mut self, key: &SourceKey) -> Option<Arc<SourcePixels>> {
        let found = self.cache.get(key).cloned().or_else(|| match &self.oversized {
            Some((k, block)) if k == key => Some(Arc::clone(block)),
            _ => None,
        });
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            found
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn contains(&self, key: &SourceKey) -> bool {
        self.cache.contains(key) || matches!(&self.oversized, Some((k, _)) if k == key)
    }

    /// Insert a block, evicting least recently used entries to make room.
    ///
    /// A block larger than the whole budget replaces the oversized slot
    /// instead of flushing the LRU.
    pub fn insert(&mut self, key: SourceKey, block: Arc<SourcePixels>) {
        let size = block.memory_bytes();
        if size > self.memory_limit {
            if let Some(old) = self.cache.pop(&key) {
                self.current_memory = self.current_memory.saturating_sub(old.memory_bytes());
            }
            if self.oversized.replace((key, block)).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }
        if matches!(&self.oversized, Some((k, _)) if *k == key) {
            self.oversized = None;
        }

        if let Some(old) = self.cache.pop(&key) {
            self.current_memory = self.current_memory.saturating_sub(old.memory_bytes());
        }

        while self.current_memory + size > self.memory_limit && !self.cache.is_empty() {
            if let Some((_, evicted)) = self.cache.pop_lru() {
                self.current_memory = self.current_memory.saturating_sub(evicted.memory_bytes());
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        // The entry-count bound may evict silently; keep the byte count honest.
        if let Some((_, evicted)) = self.cache.push(key, block) {
            self.current_memory = self.current_memory.saturating_sub(evicted.memory_bytes());
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.current_memory += size;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
            memory_bytes: self.memory_usage() as u64,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.oversized = None;
        self.current_memory = 0;
    }

    /// Bytes held, including the oversized slot.
    pub fn memory_usage(&self) -> usize {
        self.current_memory + self.oversized.as_ref().map_or(0, |(_, b)| b.memory_bytes())
    }

    pub fn len(&self) -> usize {
        self.cache.len() + usize::from(self.oversized.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
