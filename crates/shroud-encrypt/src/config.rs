//! Engine configuration.

use shroud_core::HashKind;

use crate::compression::{self, CompressionMode};
use crate::{EncryptError, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_INLINE_SIZE, MIN_CHUNKS};

/// Tunables for one [`SelfEncryptor`](crate::SelfEncryptor).
#[derive(Debug, Clone)]
pub struct EncryptorConfig {
    /// Target average chunk length
    pub chunk_size: u32,
    /// Items of at most this many bytes stay inline in the data map
    pub max_inline_size: usize,
    /// Buffered bytes (queue plus out-of-order spans) that trigger a commit
    pub queue_capacity: usize,
    /// Budget for decoded chunks kept for reads
    pub read_cache_bytes: u64,
    /// Bytes fetched ahead of small reads; 0 disables read-ahead
    pub read_ahead_bytes: usize,
    /// Digest for chunk names, pre-hashes and pads
    pub hash_kind: HashKind,
    /// Compression policy
    pub compression: CompressionMode,
    /// zstd level
    pub compression_level: i32,
    /// Bytes sampled when judging compressibility
    pub compression_sample_size: usize,
}

impl Default for EncryptorConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_inline_size: DEFAULT_MAX_INLINE_SIZE,
            queue_capacity: 10 * 1024 * 1024,     // 10 MiB
            read_cache_bytes: 16 * 1024 * 1024,   // 16 MiB
            read_ahead_bytes: 1024 * 1024,        // 1 MiB
            hash_kind: HashKind::default(),
            compression: CompressionMode::default(),
            compression_level: 3,
            compression_sample_size: 4096,
        }
    }
}

impl EncryptorConfig {
    /// Checks the combination of values.
    pub fn validate(&self) -> Result<(), EncryptError> {
        if self.chunk_size == 0 {
            return Err(EncryptError::InvalidArgument(
                "chunk_size must be non-zero".to_string(),
            ));
        }
        // Anything smaller leaves items too short to split into MIN_CHUNKS pieces
        if self.max_inline_size < MIN_CHUNKS - 1 {
            return Err(EncryptError::InvalidArgument(format!(
                "max_inline_size must be at least {}",
                MIN_CHUNKS - 1
            )));
        }
        if self.queue_capacity < self.chunk_size as usize {
            return Err(EncryptError::InvalidArgument(format!(
                "queue_capacity {} is smaller than chunk_size {}",
                self.queue_capacity, self.chunk_size
            )));
        }
        if !compression::level_range().contains(&self.compression_level) {
            return Err(EncryptError::InvalidArgument(format!(
                "compression_level {} outside {:?}",
                self.compression_level,
                compression::level_range()
            )));
        }
        Ok(())
    }

    /// Length of the two head buffers together.
    pub(crate) fn head_len(&self) -> u64 {
        2 * self.chunk_size as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EncryptorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.chunk_size, 256 * 1024);
        assert_eq!(config.max_inline_size, 1024);
        assert_eq!(config.head_len(), 512 * 1024);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            EncryptorConfig {
                chunk_size: 0,
                ..Default::default()
            },
            EncryptorConfig {
                max_inline_size: 1,
                ..Default::default()
            },
            EncryptorConfig {
                queue_capacity: 1000,
                ..Default::default()
            },
            EncryptorConfig {
                compression_level: 1000,
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(matches!(
                config.validate(),
                Err(EncryptError::InvalidArgument(_))
            ));
        }
    }
}
