//! In-memory chunk store.

use std::collections::HashMap;

use parking_lot::RwLock;
use shroud_core::ChunkName;
use tracing::trace;

use crate::{ChunkStore, ChunkStoreStats, StoreError};

/// Chunk store holding everything in a hash map.
#[derive(Default)]
pub struct MemoryChunkStore {
    chunks: RwLock<HashMap<ChunkName, Vec<u8>>>,
    stats: RwLock<ChunkStoreStats>,
}

impl MemoryChunkStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }

    /// Names of all stored chunks, in no particular order.
    pub fn names(&self) -> Vec<ChunkName> {
        self.chunks.read().keys().copied().collect()
    }

    /// Sum of stored chunk lengths.
    pub fn total_bytes(&self) -> u64 {
        self.chunks.read().values().map(|v| v.len() as u64).sum()
    }

    /// Returns store statistics.
    pub fn stats(&self) -> ChunkStoreStats {
        self.stats.read().clone()
    }
}

impl ChunkStore for MemoryChunkStore {
    fn has(&self, name: &ChunkName) -> Result<bool, StoreError> {
        Ok(self.chunks.read().contains_key(name))
    }

    fn store(&self, name: &ChunkName, content: &[u8]) -> Result<(), StoreError> {
        self.chunks.write().insert(*name, content.to_vec());
        let mut stats = self.stats.write();
        stats.chunks_stored += 1;
        stats.bytes_stored += content.len() as u64;
        trace!(name = %name, size = content.len(), "Stored chunk in memory");
        Ok(())
    }

    fn get(&self, name: &ChunkName) -> Result<Vec<u8>, StoreError> {
        let found = self.chunks.read().get(name).cloned();
        let mut stats = self.stats.write();
        match found {
            Some(content) => {
                stats.hits += 1;
                Ok(content)
            }
            None => {
                stats.misses += 1;
                Err(StoreError::NotFound(*name))
            }
        }
    }

    fn delete(&self, name: &ChunkName) -> Result<(), StoreError> {
        self.chunks.write().remove(name);
        self.stats.write().deletes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_core::HashKind;

    fn name(data: &[u8]) -> ChunkName {
        ChunkName::of(HashKind::Sha512, data)
    }

    #[test]
    fn test_store_get_delete() {
        let store = MemoryChunkStore::new();
        let key = name(b"ciphertext");

        assert!(!store.has(&key).unwrap());
        store.store(&key, b"ciphertext").unwrap();
        assert!(store.has(&key).unwrap());
        assert_eq!(store.get(&key).unwrap(), b"ciphertext");

        store.delete(&key).unwrap();
        assert!(!store.has(&key).unwrap());
        assert!(matches!(store.get(&key), Err(StoreError::NotFound(n)) if n == key));
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let store = MemoryChunkStore::new();
        store.delete(&name(b"never stored")).unwrap();
        assert_eq!(store.stats().deletes, 1);
    }

    #[test]
    fn test_stats_and_totals() {
        let store = MemoryChunkStore::new();
        store.store(&name(b"a"), &[0u8; 10]).unwrap();
        store.store(&name(b"b"), &[0u8; 20]).unwrap();
        store.get(&name(b"a")).unwrap();
        let _ = store.get(&name(b"c"));

        let stats = store.stats();
        assert_eq!(stats.chunks_stored, 2);
        assert_eq!(stats.bytes_stored, 30);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_bytes(), 30);
    }

    #[test]
    fn test_usable_through_trait_object() {
        let store: std::sync::Arc<dyn ChunkStore> = std::sync::Arc::new(MemoryChunkStore::new());
        let key = name(b"x");
        store.store(&key, b"x").unwrap();
        assert!(store.has(&key).unwrap());
    }
}
