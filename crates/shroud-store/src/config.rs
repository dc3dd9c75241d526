//! Storage configuration.

use std::path::PathBuf;

/// Where and how chunks are kept on disk.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base path for all storage
    pub base_path: PathBuf,
    /// Sync every write to disk
    pub sync_writes: bool,
    /// Budget for the decoded-chunk cache in bytes
    pub cache_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from(".shroud"),
            sync_writes: false,
            cache_bytes: 64 * 1024 * 1024, // 64 MiB
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with the given base path.
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            ..Default::default()
        }
    }

    /// Returns the path for chunk storage.
    pub fn chunks_path(&self) -> PathBuf {
        self.base_path.join("chunks")
    }

    /// Returns the path where data maps written by the CLI are kept.
    pub fn maps_path(&self) -> PathBuf {
        self.base_path.join("maps")
    }
}
