//! Per-chunk encode and decode.
//!
//! Encoding chunk `i` of `N`:
//! 1. optionally compress the plaintext
//! 2. XOR with a pad expanded from the pre-hash of chunk `(i + 2) mod N`
//! 3. encrypt with key material derived from the pre-hash of chunk `(i + 1) mod N`
//! 4. name the result by its hash
//!
//! Decoding needs only the chunk's own ciphertext and the pre-hashes
//! recorded in the data map.

use shroud_core::crypto::{xor_with_pad, KeySchedule};
use shroud_core::{ChunkName, PreHash};

use crate::compression;
use crate::data_map::{ChunkDescriptor, CompressionKind, EncodingFlags};
use crate::EncryptError;

/// Indices of the chunks whose pre-hashes key chunk `index`.
///
/// Returns `((index + 1) mod count, (index + 2) mod count)`: the key source
/// and the pad source. Stored chunks depend on this exact arithmetic.
pub fn neighbours(index: usize, count: usize) -> (usize, usize) {
    ((index + 1) % count, (index + 2) % count)
}

/// Encoder and decoder for the chunks of one data map.
#[derive(Debug, Clone, Copy)]
pub struct ChunkTransform {
    flags: EncodingFlags,
    compression_level: i32,
}

impl ChunkTransform {
    /// Transform using `flags`; `compression_level` only matters for encoding.
    pub fn new(flags: EncodingFlags, compression_level: i32) -> Self {
        Self {
            flags,
            compression_level,
        }
    }

    /// Flags this transform encodes with.
    pub fn flags(&self) -> EncodingFlags {
        self.flags
    }

    /// Pre-hash of raw chunk bytes.
    pub fn pre_hash(&self, raw: &[u8]) -> PreHash {
        PreHash::of(self.flags.hash, raw)
    }

    /// Encodes chunk `index`.
    ///
    /// `own` must be the pre-hash of `raw`; `key_source` and `pad_source`
    /// are the pre-hashes of the two following chunks.
    pub fn encode(
        &self,
        index: usize,
        raw: &[u8],
        own: &PreHash,
        key_source: &PreHash,
        pad_source: &PreHash,
    ) -> Result<(ChunkDescriptor, Vec<u8>), EncryptError> {
        let corrupt = |reason: String| EncryptError::Corruption { index, reason };

        let mut body = match self.flags.compression {
            CompressionKind::None => raw.to_vec(),
            CompressionKind::Zstd => compression::compress(raw, self.compression_level)
                .map_err(|e| corrupt(format!("compression failed: {e}")))?,
        };

        xor_with_pad(self.flags.hash, pad_source.as_bytes(), &mut body);

        let ciphertext = KeySchedule::chunk(key_source.as_bytes(), own.as_bytes())
            .seal(&body)
            .map_err(|e| corrupt(e.to_string()))?;

        let descriptor = ChunkDescriptor {
            hash: ChunkName::of(self.flags.hash, &ciphertext),
            size: size_u32(index, ciphertext.len())?,
            pre_hash: *own,
            pre_size: size_u32(index, raw.len())?,
        };
        Ok((descriptor, ciphertext))
    }

    /// Decodes chunk `index` and checks it against its descriptor.
    pub fn decode(
        &self,
        index: usize,
        ciphertext: &[u8],
        descriptor: &ChunkDescriptor,
        key_source: &PreHash,
        pad_source: &PreHash,
    ) -> Result<Vec<u8>, EncryptError> {
        let corrupt = |reason: String| EncryptError::Corruption { index, reason };

        if ciphertext.len() != descriptor.size as usize {
            return Err(corrupt(format!(
                "stored length {} does not match recorded {}",
                ciphertext.len(),
                descriptor.size
            )));
        }
        if ChunkName::of(self.flags.hash, ciphertext) != descriptor.hash {
            return Err(corrupt("content hash mismatch".to_string()));
        }

        let mut body = KeySchedule::chunk(key_source.as_bytes(), descriptor.pre_hash.as_bytes())
            .open(ciphertext)
            .map_err(|e| corrupt(e.to_string()))?;

        xor_with_pad(self.flags.hash, pad_source.as_bytes(), &mut body);

        let raw = match self.flags.compression {
            CompressionKind::None => body,
            CompressionKind::Zstd => {
                compression::decompress(&body, descriptor.pre_size as usize)
                    .map_err(|e| corrupt(format!("decompression failed: {e}")))?
            }
        };

        if raw.len() != descriptor.pre_size as usize {
            return Err(corrupt(format!(
                "decoded {} bytes, expected {}",
                raw.len(),
                descriptor.pre_size
            )));
        }
        if self.pre_hash(&raw) != descriptor.pre_hash {
            return Err(corrupt("plaintext hash mismatch".to_string()));
        }
        Ok(raw)
    }
}

fn size_u32(index: usize, len: usize) -> Result<u32, EncryptError> {
    u32::try_from(len)
        .map_err(|_| EncryptError::Size(format!("chunk {index} is {len} bytes, above u32::MAX")))
}
