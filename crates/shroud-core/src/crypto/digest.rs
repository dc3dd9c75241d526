//! Content digests and hash-derived XOR pads.
//!
//! Every digest in the engine is 64 bytes wide. SHA-512 produces that
//! natively; BLAKE3 runs in extendable-output mode to match.

use sha2::{Digest as _, Sha512};

use super::DIGEST_SIZE;

/// Hash function used for chunk names, pre-hashes and pad expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashKind {
    /// SHA-512
    #[default]
    Sha512,
    /// BLAKE3 with 64 bytes of extended output
    Blake3,
}

impl HashKind {
    /// Wire tag stored in data map encoding flags.
    pub const fn tag(&self) -> u32 {
        match self {
            HashKind::Sha512 => 1,
            HashKind::Blake3 => 2,
        }
    }

    /// Parses a wire tag.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(HashKind::Sha512),
            2 => Some(HashKind::Blake3),
            _ => None,
        }
    }

    /// Digest of `data`.
    pub fn digest(&self, data: &[u8]) -> [u8; DIGEST_SIZE] {
        let mut hasher = Hasher::new(*self);
        hasher.update(data);
        hasher.finalize()
    }
}

/// Incremental hasher over either supported hash kind.
pub enum Hasher {
    /// SHA-512 state
    Sha512(Box<Sha512>),
    /// BLAKE3 state
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    /// Starts a new digest.
    pub fn new(kind: HashKind) -> Self {
        match kind {
            HashKind::Sha512 => Hasher::Sha512(Box::new(Sha512::new())),
            HashKind::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    /// Absorbs more input.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha512(h) => h.update(data),
            Hasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Finishes the digest.
    pub fn finalize(self) -> [u8; DIGEST_SIZE] {
        let mut out = [0u8; DIGEST_SIZE];
        match self {
            Hasher::Sha512(h) => out.copy_from_slice(&(*h).finalize()),
            Hasher::Blake3(h) => h.finalize_xof().fill(&mut out),
        }
        out
    }
}

/// SHA-512 digest, independent of any configured hash kind.
pub fn sha512(data: &[u8]) -> [u8; DIGEST_SIZE] {
    HashKind::Sha512.digest(data)
}

/// Expands `seed` into a pad of exactly `len` bytes.
///
/// The pad is `H(seed) || H(H(seed)) || ...` truncated to `len`.
pub fn expand_pad(kind: HashKind, seed: &[u8], len: usize) -> Vec<u8> {
    let mut pad = Vec::with_capacity(len + DIGEST_SIZE);
    let mut block = kind.digest(seed);
    while pad.len() < len {
        pad.extend_from_slice(&block);
        block = kind.digest(&block);
    }
    pad.truncate(len);
    pad
}

/// XORs `data` in place with the pad expanded from `seed`.
///
/// Applying it twice with the same seed restores the input.
pub fn xor_with_pad(kind: HashKind, seed: &[u8], data: &mut [u8]) {
    let pad = expand_pad(kind, seed, data.len());
    for (byte, mask) in data.iter_mut().zip(pad) {
        *byte ^= mask;
    }
}
