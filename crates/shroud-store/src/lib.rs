//! Shroud Store - chunk storage behind the self-encryption engine.
//!
//! Provides:
//! - The `ChunkStore` trait the engine persists chunks through
//! - An in-memory store for tests and short-lived items
//! - A RocksDB-backed store for on-disk use
//! - An LRU cache of decoded chunks

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod cache;
pub mod config;
pub mod memory;
pub mod rocks;

pub use cache::{Cache, CacheConfig, CacheStats};
pub use config::StoreConfig;
pub use memory::MemoryChunkStore;
pub use rocks::RocksChunkStore;

use std::sync::Arc;

use shroud_core::ChunkName;
use thiserror::Error;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// RocksDB error
    #[error("Database error: {0}")]
    Database(String),

    /// Chunk not found
    #[error("Chunk not found: {0}")]
    NotFound(ChunkName),

    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Backend refused the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Content-addressed chunk storage.
///
/// Keys are the post-transform hashes of the stored bytes. Storing a key
/// that already exists replaces its value; deleting a missing key succeeds.
/// Implementations may block; the engine calls them from the caller's
/// thread.
pub trait ChunkStore: Send + Sync {
    /// Returns true if a chunk is stored under `name`.
    fn has(&self, name: &ChunkName) -> Result<bool, StoreError>;

    /// Stores `content` under `name`.
    fn store(&self, name: &ChunkName, content: &[u8]) -> Result<(), StoreError>;

    /// Fetches the chunk stored under `name`.
    ///
    /// Returns [`StoreError::NotFound`] when absent.
    fn get(&self, name: &ChunkName) -> Result<Vec<u8>, StoreError>;

    /// Removes the chunk stored under `name`.
    fn delete(&self, name: &ChunkName) -> Result<(), StoreError>;
}

impl<T: ChunkStore + ?Sized> ChunkStore for Arc<T> {
    fn has(&self, name: &ChunkName) -> Result<bool, StoreError> {
        (**self).has(name)
    }

    fn store(&self, name: &ChunkName, content: &[u8]) -> Result<(), StoreError> {
        (**self).store(name, content)
    }

    fn get(&self, name: &ChunkName) -> Result<Vec<u8>, StoreError> {
        (**self).get(name)
    }

    fn delete(&self, name: &ChunkName) -> Result<(), StoreError> {
        (**self).delete(name)
    }
}

/// Counters kept by the bundled stores.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkStoreStats {
    /// Chunks written
    pub chunks_stored: u64,
    /// Bytes written
    pub bytes_stored: u64,
    /// Reads that found the chunk
    pub hits: u64,
    /// Reads that did not
    pub misses: u64,
    /// Delete calls
    pub deletes: u64,
}
