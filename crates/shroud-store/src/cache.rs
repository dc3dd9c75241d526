//! LRU cache of decoded chunks.
//!
//! Entries are keyed by `ChunkName`. A name identifies its ciphertext, and
//! a ciphertext decodes to exactly one plaintext, so entries never go stale.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use shroud_core::ChunkName;

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum total size of cached plaintext in bytes
    pub max_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024 * 1024, // 64 MiB
        }
    }
}

struct CacheEntry {
    data: Bytes,
    last_access: u64,
}

/// LRU memory cache for decoded chunks.
///
/// Safe to share between threads; every method takes `&self`.
pub struct Cache {
    config: CacheConfig,
    entries: RwLock<HashMap<ChunkName, CacheEntry>>,
    current_size: AtomicU64,
    /// Monotonic counter standing in for access time
    access_counter: AtomicU64,
    stats: RwLock<CacheStats>,
}

/// Cache statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Cache hits
    pub hits: u64,
    /// Cache misses
    pub misses: u64,
    /// Evictions
    pub evictions: u64,
    /// Total bytes ever inserted
    pub bytes_cached: u64,
}

impl Cache {
    /// Creates a new cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            current_size: AtomicU64::new(0),
            access_counter: AtomicU64::new(0),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Creates a cache with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Looks up a decoded chunk.
    pub fn get(&self, name: &ChunkName) -> Option<Bytes> {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(name) {
            entry.last_access = self.access_counter.fetch_add(1, Ordering::Relaxed);
            self.stats.write().hits += 1;
            Some(entry.data.clone())
        } else {
            self.stats.write().misses += 1;
            None
        }
    }

    /// Inserts a decoded chunk, evicting least recently used entries to fit.
    ///
    /// Data larger than the whole budget is not cached.
    pub fn put(&self, name: ChunkName, data: Bytes) {
        let size = data.len() as u64;
        if size > self.config.max_bytes {
            return;
        }

        let mut entries = self.entries.write();
        if let Some(old) = entries.remove(&name) {
            self.current_size
                .fetch_sub(old.data.len() as u64, Ordering::Relaxed);
        }
        while self.current_size.load(Ordering::Relaxed) + size > self.config.max_bytes {
            if !self.evict_one(&mut entries) {
                break;
            }
        }

        entries.insert(
            name,
            CacheEntry {
                data,
                last_access: self.access_counter.fetch_add(1, Ordering::Relaxed),
            },
        );
        self.current_size.fetch_add(size, Ordering::Relaxed);
        self.stats.write().bytes_cached += size;
    }

    /// Removes an entry from the cache.
    pub fn remove(&self, name: &ChunkName) -> Option<Bytes> {
        let entry = self.entries.write().remove(name)?;
        self.current_size
            .fetch_sub(entry.data.len() as u64, Ordering::Relaxed);
        Some(entry.data)
    }

    /// Returns the current cache size in bytes.
    pub fn size(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Clears the cache.
    pub fn clear(&self) {
        self.entries.write().clear();
        self.current_size.store(0, Ordering::Relaxed);
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    fn evict_one(&self, entries: &mut HashMap<ChunkName, CacheEntry>) -> bool {
        let lru_key = entries
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| *k);

        match lru_key.and_then(|key| entries.remove(&key)) {
            Some(entry) => {
                self.current_size
                    .fetch_sub(entry.data.len() as u64, Ordering::Relaxed);
                self.stats.write().evictions += 1;
                true
            }
            None => false,
        }
    }
}
