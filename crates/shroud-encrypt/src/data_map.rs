//! The data map: everything needed to reassemble an item from its chunks.

use bytes::{Bytes, BytesMut};
use shroud_core::encoding::ByteString;
use shroud_core::{CanonicalDecode, CanonicalEncode, ChunkName, DecodeError, HashKind, PreHash};

use crate::transform::neighbours;
use crate::{EncryptError, MAX_CHUNKS, MIN_CHUNKS};

/// Version tag written in front of every encoded data map.
pub const DATA_MAP_VERSION: u32 = 1;

/// Compression applied to chunk plaintext before obfuscation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionKind {
    /// Stored as-is
    #[default]
    None,
    /// zstd
    Zstd,
}

/// Obfuscation pass applied before encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObfuscationKind {
    /// XOR with a repeated-hash pad
    #[default]
    HashPad,
}

/// Symmetric cipher applied to obfuscated chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CipherKind {
    /// XChaCha20-Poly1305
    #[default]
    XChaCha20Poly1305,
}

/// How every chunk of one data map was encoded.
///
/// Packed into a `u32` with one nibble per field: hash in bits 0-3,
/// compression in 4-7, obfuscation in 8-11, cipher in 12-15.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EncodingFlags {
    /// Digest used for names, pre-hashes and pads
    pub hash: HashKind,
    /// Compression kind
    pub compression: CompressionKind,
    /// Obfuscation kind
    pub obfuscation: ObfuscationKind,
    /// Cipher kind
    pub cipher: CipherKind,
}

impl EncodingFlags {
    /// Default flags with the given hash kind.
    pub fn with_hash(hash: HashKind) -> Self {
        Self {
            hash,
            ..Self::default()
        }
    }

    /// Packs the flags into their wire form.
    pub fn to_bits(&self) -> u32 {
        let compression = match self.compression {
            CompressionKind::None => 0,
            CompressionKind::Zstd => 1,
        };
        let obfuscation = match self.obfuscation {
            ObfuscationKind::HashPad => 1,
        };
        let cipher = match self.cipher {
            CipherKind::XChaCha20Poly1305 => 1,
        };
        self.hash.tag() | compression << 4 | obfuscation << 8 | cipher << 12
    }

    /// Unpacks wire flags, rejecting anything this build does not know.
    pub fn from_bits(bits: u32) -> Option<Self> {
        if bits >> 16 != 0 {
            return None;
        }
        let hash = HashKind::from_tag(bits & 0xF)?;
        let compression = match (bits >> 4) & 0xF {
            0 => CompressionKind::None,
            1 => CompressionKind::Zstd,
            _ => return None,
        };
        let obfuscation = match (bits >> 8) & 0xF {
            1 => ObfuscationKind::HashPad,
            _ => return None,
        };
        let cipher = match (bits >> 12) & 0xF {
            1 => CipherKind::XChaCha20Poly1305,
            _ => return None,
        };
        Some(Self {
            hash,
            compression,
            obfuscation,
            cipher,
        })
    }
}

impl CanonicalEncode for EncodingFlags {
    fn encode(&self, buf: &mut BytesMut) {
        self.to_bits().encode(buf);
    }
}

impl CanonicalDecode for EncodingFlags {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        let bits = u32::decode(buf)?;
        Self::from_bits(bits).ok_or(DecodeError::UnsupportedVersion(bits))
    }
}

/// One committed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Hash of the stored bytes; the chunk store key
    pub hash: ChunkName,
    /// Length of the stored bytes
    pub size: u32,
    /// Hash of the plaintext
    pub pre_hash: PreHash,
    /// Length of the plaintext
    pub pre_size: u32,
}

impl CanonicalEncode for ChunkDescriptor {
    fn encode(&self, buf: &mut BytesMut) {
        self.hash.encode(buf);
        self.size.encode(buf);
        self.pre_hash.encode(buf);
        self.pre_size.encode(buf);
    }
}

impl CanonicalDecode for ChunkDescriptor {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            hash: ChunkName::decode(buf)?,
            size: u32::decode(buf)?,
            pre_hash: PreHash::decode(buf)?,
            pre_size: u32::decode(buf)?,
        })
    }
}

/// Metadata record describing one item.
///
/// Small items keep their bytes in `content` and have no chunks. Larger
/// items have between [`MIN_CHUNKS`] and [`MAX_CHUNKS`] chunks whose
/// plaintext lengths add up to `total_size`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMap {
    /// Chunks in item order
    pub chunks: Vec<ChunkDescriptor>,
    /// Inline bytes for items too small to chunk
    pub content: Option<Vec<u8>>,
    /// Logical item length
    pub total_size: u64,
    /// Encoding shared by every chunk
    pub encoding_flags: EncodingFlags,
}

impl Default for DataMap {
    fn default() -> Self {
        Self::empty(EncodingFlags::default())
    }
}

impl DataMap {
    /// Map of an empty item.
    pub fn empty(encoding_flags: EncodingFlags) -> Self {
        Self::inline(Vec::new(), encoding_flags)
    }

    /// Map holding the whole item inline.
    pub fn inline(content: Vec<u8>, encoding_flags: EncodingFlags) -> Self {
        Self {
            chunks: Vec::new(),
            total_size: content.len() as u64,
            content: Some(content),
            encoding_flags,
        }
    }

    /// Map over committed chunks.
    pub fn chunked(chunks: Vec<ChunkDescriptor>, encoding_flags: EncodingFlags) -> Self {
        let total_size = chunks.iter().map(|c| c.pre_size as u64).sum();
        Self {
            chunks,
            content: None,
            total_size,
            encoding_flags,
        }
    }

    /// True for a zero-length item.
    pub fn is_empty(&self) -> bool {
        self.total_size == 0
    }

    /// True when the item lives in `content` rather than in chunks.
    pub fn is_inline(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Item offset at which each chunk starts.
    pub fn chunk_offsets(&self) -> Vec<u64> {
        let mut offset = 0u64;
        self.chunks
            .iter()
            .map(|chunk| {
                let start = offset;
                offset += chunk.pre_size as u64;
                start
            })
            .collect()
    }

    /// Pre-hashes of the chunks a given chunk's transform depends on.
    ///
    /// Returns `(key source, pad source)`: the pre-hashes of chunks
    /// `index + 1` and `index + 2`, wrapping around the end.
    pub fn neighbour_pre_hashes(&self, index: usize) -> (&PreHash, &PreHash) {
        let (next, after) = neighbours(index, self.chunks.len());
        (&self.chunks[next].pre_hash, &self.chunks[after].pre_hash)
    }

    /// Checks the structural invariants.
    pub fn validate(&self) -> Result<(), EncryptError> {
        if self.chunks.is_empty() {
            let inline_len = self.content.as_ref().map_or(0, |c| c.len() as u64);
            if inline_len != self.total_size {
                return Err(EncryptError::InvalidArgument(format!(
                    "inline content holds {inline_len} bytes, data map claims {}",
                    self.total_size
                )));
            }
            return Ok(());
        }

        if self.content.is_some() {
            return Err(EncryptError::InvalidArgument(
                "data map has both chunks and inline content".to_string(),
            ));
        }
        if !(MIN_CHUNKS..=MAX_CHUNKS).contains(&self.chunks.len()) {
            return Err(EncryptError::InvalidArgument(format!(
                "data map has {} chunks, expected {MIN_CHUNKS}..={MAX_CHUNKS}",
                self.chunks.len()
            )));
        }
        let sum: u64 = self.chunks.iter().map(|c| c.pre_size as u64).sum();
        if sum != self.total_size {
            return Err(EncryptError::InvalidArgument(format!(
                "chunk sizes sum to {sum}, data map claims {}",
                self.total_size
            )));
        }
        if self.chunks.iter().any(|c| c.pre_size == 0) {
            return Err(EncryptError::InvalidArgument(
                "data map contains an empty chunk".to_string(),
            ));
        }
        Ok(())
    }

    /// Serializes with the version prefix.
    pub fn serialize(&self) -> Vec<u8> {
        self.to_vec()
    }

    /// Parses and validates a serialized map.
    ///
    /// Unknown versions or encoding flags give `VersionMismatch`; anything
    /// else that fails to parse or validate gives `BadDataMap`.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, EncryptError> {
        let map = Self::from_bytes_exact(bytes).map_err(|e| match e {
            DecodeError::UnsupportedVersion(v) => {
                EncryptError::VersionMismatch(format!("data map version or flags {v:#x}"))
            }
            other => EncryptError::BadDataMap(other.to_string()),
        })?;
        map.validate()
            .map_err(|e| EncryptError::BadDataMap(e.to_string()))?;
        Ok(map)
    }
}

impl CanonicalEncode for DataMap {
    fn encode(&self, buf: &mut BytesMut) {
        DATA_MAP_VERSION.encode(buf);
        self.chunks.encode(buf);
        self.encoding_flags.encode(buf);
        self.total_size.encode(buf);
        self.content.clone().map(ByteString).encode(buf);
    }
}

impl CanonicalDecode for DataMap {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        let version = u32::decode(buf)?;
        if version != DATA_MAP_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        Ok(Self {
            chunks: Vec::<ChunkDescriptor>::decode(buf)?,
            encoding_flags: EncodingFlags::decode(buf)?,
            total_size: u64::decode(buf)?,
            content: Option::<ByteString>::decode(buf)?.map(Vec::from),
        })
    }
}
