//! Shroud Encrypt - self-encryption of byte streams.
//!
//! An item is split into between [`MIN_CHUNKS`] and [`MAX_CHUNKS`] chunks.
//! Each chunk is compressed (optionally), XOR-obfuscated and encrypted with
//! material derived from the plaintext hashes of the two chunks after it,
//! then stored under the hash of the result. The [`DataMap`] records those
//! hashes and is all that is needed to read the item back.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use shroud_encrypt::{EncryptorConfig, SelfEncryptor};
//! use shroud_store::MemoryChunkStore;
//!
//! let store = Arc::new(MemoryChunkStore::new());
//! let encryptor = SelfEncryptor::new(store.clone(), EncryptorConfig::default())?;
//! encryptor.write(0, b"hello, world")?;
//! let map = encryptor.into_data_map()?;
//!
//! let reader = SelfEncryptor::open(store, map, EncryptorConfig::default())?;
//! assert_eq!(reader.read(0, 5)?, b"hello");
//! # Ok::<(), shroud_encrypt::EncryptError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod blocks;
pub mod buffer;
pub mod codec;
pub mod compression;
pub mod config;
pub mod data_map;
pub mod encryptor;
pub mod sequencer;
pub mod sizer;
pub mod stream;
pub mod transform;

pub use buffer::ByteBuffer;
pub use codec::DataMapCodec;
pub use compression::CompressionMode;
pub use config::EncryptorConfig;
pub use data_map::{ChunkDescriptor, CompressionKind, DataMap, EncodingFlags};
pub use encryptor::SelfEncryptor;
pub use sequencer::Sequencer;
pub use sizer::ChunkSizer;
pub use stream::EncryptorStream;
pub use transform::{neighbours, ChunkTransform};

use std::io;
use std::sync::Arc;

use shroud_store::{ChunkStore, StoreError};
use thiserror::Error;

/// Fewest chunks a non-inline item is split into.
pub const MIN_CHUNKS: usize = 3;

/// Most chunks an item is split into.
pub const MAX_CHUNKS: usize = 40;

/// Default target chunk length (256 KiB).
pub const DEFAULT_CHUNK_SIZE: u32 = 256 * 1024;

/// Default largest item kept inline in its data map.
pub const DEFAULT_MAX_INLINE_SIZE: usize = 1024;

/// Errors from the self-encryption engine.
#[derive(Debug, Error)]
pub enum EncryptError {
    /// Chunk store failure
    #[error("Store error: {0}")]
    Io(#[from] StoreError),

    /// Item cannot be laid out into chunks
    #[error("Size error: {0}")]
    Size(String),

    /// A stored chunk failed verification or decryption
    #[error("Chunk {index} is corrupt: {reason}")]
    Corruption {
        /// Position of the chunk in the data map
        index: usize,
        /// What failed
        reason: String,
    },

    /// Unknown format version or encoding flags
    #[error("Version mismatch: {0}")]
    VersionMismatch(String),

    /// Caller passed something unusable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Encrypted data map could not be opened or parsed
    #[error("Bad data map: {0}")]
    BadDataMap(String),
}

impl From<EncryptError> for io::Error {
    fn from(err: EncryptError) -> Self {
        let kind = match &err {
            EncryptError::Io(StoreError::Io(e)) => e.kind(),
            EncryptError::Io(StoreError::NotFound(_)) => io::ErrorKind::NotFound,
            EncryptError::InvalidArgument(_) => io::ErrorKind::InvalidInput,
            EncryptError::Corruption { .. }
            | EncryptError::BadDataMap(_)
            | EncryptError::VersionMismatch(_) => io::ErrorKind::InvalidData,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

/// Self-encrypts `data` into `store` and returns its data map.
pub fn encrypt_bytes(
    store: Arc<dyn ChunkStore>,
    config: EncryptorConfig,
    data: &[u8],
) -> Result<DataMap, EncryptError> {
    let encryptor = SelfEncryptor::new(store, config)?;
    encryptor.write(0, data)?;
    encryptor.into_data_map()
}

/// Reads back the whole item described by `data_map`.
pub fn decrypt_bytes(store: Arc<dyn ChunkStore>, data_map: &DataMap) -> Result<Vec<u8>, EncryptError> {
    let config = EncryptorConfig {
        read_ahead_bytes: 0,
        ..EncryptorConfig::default()
    };
    let encryptor = SelfEncryptor::open(store, data_map.clone(), config)?;
    let len = usize::try_from(encryptor.size())
        .map_err(|_| EncryptError::Size(format!("{}-byte item does not fit in memory", encryptor.size())))?;
    encryptor.read(0, len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_store::MemoryChunkStore;

    #[test]
    fn test_one_shot_helpers() {
        let store = Arc::new(MemoryChunkStore::new());
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 253) as u8).collect();

        let map = encrypt_bytes(store.clone(), EncryptorConfig::default(), &data).unwrap();
        assert_eq!(map.total_size, data.len() as u64);
        assert_eq!(map.chunks.len(), 3);
        assert_eq!(decrypt_bytes(store, &map).unwrap(), data);
    }

    #[test]
    fn test_io_error_kinds() {
        let err: io::Error = EncryptError::InvalidArgument("x".into()).into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let err: io::Error = EncryptError::Corruption {
            index: 2,
            reason: "bad tag".into(),
        }
        .into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("Chunk 2"));
    }
}
