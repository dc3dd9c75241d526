//! RocksDB-backed chunk store.
//!
//! Stores encrypted chunks keyed by their `ChunkName`.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use rocksdb::{ColumnFamily, IteratorMode, Options, WriteOptions, DB};
use shroud_core::{ChunkName, DIGEST_SIZE};
use tracing::{debug, warn};

use crate::{ChunkStore, ChunkStoreStats, StoreConfig, StoreError};

/// Column family name for chunks.
const CHUNKS_CF: &str = "chunks";

/// Local chunk storage backed by RocksDB.
pub struct RocksChunkStore {
    db: Arc<DB>,
    sync_writes: bool,
    stats: RwLock<ChunkStoreStats>,
}

impl RocksChunkStore {
    /// Opens or creates a chunk store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with(path, false)
    }

    /// Opens the store under `config.chunks_path()`.
    pub fn open_config(config: &StoreConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&config.base_path)?;
        Self::open_with(&config.chunks_path(), config.sync_writes)
    }

    fn open_with(path: &Path, sync_writes: bool) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_allow_concurrent_memtable_write(true);
        opts.set_enable_write_thread_adaptive_yield(true);

        let db = DB::open_cf(&opts, path, [CHUNKS_CF])
            .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!(path = %path.display(), sync_writes, "Opened chunk store");
        Ok(Self {
            db: Arc::new(db),
            sync_writes,
            stats: RwLock::new(ChunkStoreStats::default()),
        })
    }

    fn cf(&self) -> Result<&ColumnFamily, StoreError> {
        self.db
            .cf_handle(CHUNKS_CF)
            .ok_or_else(|| StoreError::Database("Missing chunks column family".to_string()))
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_writes);
        opts
    }

    /// Returns store statistics.
    pub fn stats(&self) -> ChunkStoreStats {
        self.stats.read().clone()
    }

    /// Lists every chunk name in the store.
    ///
    /// Walks the whole column family.
    pub fn list_chunks(&self) -> Result<Vec<ChunkName>, StoreError> {
        let cf = self.cf()?;
        let mut names = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if key.len() == DIGEST_SIZE {
                let mut arr = [0u8; DIGEST_SIZE];
                arr.copy_from_slice(&key);
                names.push(ChunkName::new(arr));
            } else {
                warn!(len = key.len(), "Skipping malformed chunk key");
            }
        }
        Ok(names)
    }

    /// Returns the total size of all stored chunks.
    pub fn total_size(&self) -> Result<u64, StoreError> {
        let cf = self.cf()?;
        let mut total = 0u64;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            total += value.len() as u64;
        }
        Ok(total)
    }
}

impl ChunkStore for RocksChunkStore {
    fn has(&self, name: &ChunkName) -> Result<bool, StoreError> {
        let cf = self.cf()?;
        self.db
            .get_pinned_cf(&cf, name.as_bytes())
            .map(|v| v.is_some())
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn store(&self, name: &ChunkName, content: &[u8]) -> Result<(), StoreError> {
        let cf = self.cf()?;
        self.db
            .put_cf_opt(&cf, name.as_bytes(), content, &self.write_options())
            .map_err(|e| StoreError::Database(e.to_string()))?;

        {
            let mut stats = self.stats.write();
            stats.chunks_stored += 1;
            stats.bytes_stored += content.len() as u64;
        }

        debug!(name = %name, size = content.len(), "Stored chunk");
        Ok(())
    }

    fn get(&self, name: &ChunkName) -> Result<Vec<u8>, StoreError> {
        let cf = self.cf()?;
        match self
            .db
            .get_cf(&cf, name.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
        {
            Some(bytes) => {
                self.stats.write().hits += 1;
                Ok(bytes)
            }
            None => {
                self.stats.write().misses += 1;
                Err(StoreError::NotFound(*name))
            }
        }
    }

    fn delete(&self, name: &ChunkName) -> Result<(), StoreError> {
        let cf = self.cf()?;
        self.db
            .delete_cf_opt(&cf, name.as_bytes(), &self.write_options())
            .map_err(|e| StoreError::Database(e.to_string()))?;

        self.stats.write().deletes += 1;
        debug!(name = %name, "Deleted chunk");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_core::HashKind;
    use tempfile::TempDir;

    fn name(data: &[u8]) -> ChunkName {
        ChunkName::of(HashKind::Sha512, data)
    }

    #[test]
    fn test_store_get() {
        let dir = TempDir::new().unwrap();
        let store = RocksChunkStore::open(dir.path()).unwrap();

        let content = vec![0xAA; 100];
        let key = name(&content);
        store.store(&key, &content).unwrap();

        assert!(store.has(&key).unwrap());
        assert_eq!(store.get(&key).unwrap(), content);
    }

    #[test]
    fn test_missing_chunk() {
        let dir = TempDir::new().unwrap();
        let store = RocksChunkStore::open(dir.path()).unwrap();

        let key = name(b"absent");
        assert!(!store.has(&key).unwrap());
        assert!(matches!(store.get(&key), Err(StoreError::NotFound(_))));

        let stats = store.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let store = RocksChunkStore::open(dir.path()).unwrap();

        let key = name(b"doomed");
        store.store(&key, b"doomed").unwrap();
        store.delete(&key).unwrap();
        assert!(!store.has(&key).unwrap());

        // Deleting again is not an error
        store.delete(&key).unwrap();
        assert_eq!(store.stats().deletes, 2);
    }

    #[test]
    fn test_list_and_total_size() {
        let dir = TempDir::new().unwrap();
        let store = RocksChunkStore::open(dir.path()).unwrap();

        let a = vec![0x01; 50];
        let b = vec![0x02; 70];
        store.store(&name(&a), &a).unwrap();
        store.store(&name(&b), &b).unwrap();

        let listed = store.list_chunks().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&name(&a)));
        assert!(listed.contains(&name(&b)));
        assert_eq!(store.total_size().unwrap(), 120);
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();
        let key = name(b"durable");

        {
            let store = RocksChunkStore::open(&path).unwrap();
            store.store(&key, b"durable").unwrap();
        }

        let store = RocksChunkStore::open(&path).unwrap();
        assert_eq!(store.get(&key).unwrap(), b"durable");
    }

    #[test]
    fn test_open_config_creates_directories() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            sync_writes: true,
            ..StoreConfig::new(dir.path().join("nested"))
        };
        let store = RocksChunkStore::open_config(&config).unwrap();
        store.store(&name(b"x"), b"x").unwrap();
        assert!(config.chunks_path().exists());
    }
}
