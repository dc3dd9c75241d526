//! Shared fixtures for integration tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use shroud_core::ChunkName;
use shroud_encrypt::{CompressionMode, EncryptorConfig};
use shroud_store::{ChunkStore, MemoryChunkStore, StoreError};
use tracing::debug;

/// Deterministic pseudo-random bytes.
pub fn random_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    StdRng::seed_from_u64(seed).fill_bytes(&mut data);
    data
}

/// Engine configuration scaled down so that small inputs exercise
/// chunking, the queue and the sequencer.
///
/// Chunks average 1 KiB, items above 64 bytes are chunked and more than
/// 16 KiB of buffered writes forces a commit.
pub fn small_config() -> EncryptorConfig {
    EncryptorConfig {
        chunk_size: 1024,
        max_inline_size: 64,
        queue_capacity: 16 * 1024,
        read_cache_bytes: 64 * 1024,
        read_ahead_bytes: 2048,
        compression: CompressionMode::Never,
        compression_sample_size: 512,
        ..EncryptorConfig::default()
    }
}

/// Operation a [`FlakyStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// `has`
    Has,
    /// `store`
    Store,
    /// `get`
    Get,
    /// `delete`
    Delete,
}

/// In-memory store that fails chosen operations on demand.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryChunkStore,
    faults: Mutex<HashSet<Fault>>,
    /// Successful `store` calls still allowed before `Fault::Store` applies
    store_budget: Mutex<Option<usize>>,
    calls: AtomicUsize,
}

impl FlakyStore {
    /// Store with no faults armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call of `op` fail.
    pub fn fail(&self, op: Fault) {
        self.faults.lock().insert(op);
    }

    /// Lets `count` more chunks be stored, then fails every `store`.
    pub fn fail_stores_after(&self, count: usize) {
        *self.store_budget.lock() = Some(count);
        self.fail(Fault::Store);
    }

    /// Disarms every fault.
    pub fn heal(&self) {
        self.faults.lock().clear();
        *self.store_budget.lock() = None;
    }

    /// Direct access to the backing store.
    pub fn inner(&self) -> &MemoryChunkStore {
        &self.inner
    }

    /// Number of calls made through the trait, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Replaces the bytes stored under `name`, bypassing any fault.
    pub fn tamper(&self, name: &ChunkName, f: impl FnOnce(&mut Vec<u8>)) -> Result<(), StoreError> {
        let mut bytes = self.inner.get(name)?;
        f(&mut bytes);
        self.inner.store(name, &bytes)
    }

    fn check(&self, op: Fault) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if !self.faults.lock().contains(&op) {
            return Ok(());
        }
        if op == Fault::Store {
            let mut budget = self.store_budget.lock();
            if let Some(remaining) = budget.as_mut() {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Ok(());
                }
            }
        }
        debug!(?op, "Injected store fault");
        Err(StoreError::Unavailable(format!("injected {op:?} fault")))
    }
}

impl ChunkStore for FlakyStore {
    fn has(&self, name: &ChunkName) -> Result<bool, StoreError> {
        self.check(Fault::Has)?;
        self.inner.has(name)
    }

    fn store(&self, name: &ChunkName, content: &[u8]) -> Result<(), StoreError> {
        self.check(Fault::Store)?;
        self.inner.store(name, content)
    }

    fn get(&self, name: &ChunkName) -> Result<Vec<u8>, StoreError> {
        self.check(Fault::Get)?;
        self.inner.get(name)
    }

    fn delete(&self, name: &ChunkName) -> Result<(), StoreError> {
        self.check(Fault::Delete)?;
        self.inner.delete(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes_deterministic() {
        assert_eq!(random_bytes(1, 64), random_bytes(1, 64));
        assert_ne!(random_bytes(1, 64), random_bytes(2, 64));
    }

    #[test]
    fn test_store_budget() {
        let store = FlakyStore::new();
        store.fail_stores_after(1);
        let a = ChunkName::new([1; 64]);
        let b = ChunkName::new([2; 64]);
        store.store(&a, b"one").unwrap();
        assert!(matches!(store.store(&b, b"two"), Err(StoreError::Unavailable(_))));

        store.heal();
        store.store(&b, b"two").unwrap();
        assert_eq!(store.inner().len(), 2);
        assert_eq!(store.calls(), 3);
    }

    #[test]
    fn test_small_config_is_valid() {
        small_config().validate().unwrap();
    }
}
