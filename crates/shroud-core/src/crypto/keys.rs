//! Key schedule for chunk and data map encryption.
//!
//! Chunk keys are convergent: they come from the plaintext digests of
//! neighboring chunks, so identical content always encrypts identically.
//! Data map keys come from a pair of caller-supplied identifiers.

use zeroize::{Zeroize, ZeroizeOnDrop};

use super::digest::sha512;
use super::hkdf::hkdf_sha256;
use super::{DIGEST_SIZE, KEY_SIZE, NONCE_SIZE};

/// HKDF info strings.
pub mod info {
    /// Chunk encryption key
    pub const CHUNK_KEY: &[u8] = b"shroud/v1/chunk-key";
    /// Chunk encryption nonce
    pub const CHUNK_NONCE: &[u8] = b"shroud/v1/chunk-nonce";
}

/// A key and nonce pair for XChaCha20-Poly1305. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherParams {
    /// 32-byte key
    pub key: [u8; KEY_SIZE],
    /// 24-byte nonce
    pub nonce: [u8; NONCE_SIZE],
}

impl std::fmt::Debug for CipherParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CipherParams([REDACTED])")
    }
}

/// Derivations used by the engine.
pub struct KeySchedule;

impl KeySchedule {
    /// Cipher parameters for one chunk.
    ///
    /// ```text
    /// key   = HKDF(key_source, salt=∅,      info="shroud/v1/chunk-key",   L=32)
    /// nonce = HKDF(key_source, salt=own,    info="shroud/v1/chunk-nonce", L=24)
    /// ```
    ///
    /// `key_source` is the pre-hash of the next chunk; `own` is the chunk's
    /// own pre-hash.
    pub fn chunk(key_source: &[u8; DIGEST_SIZE], own: &[u8; DIGEST_SIZE]) -> CipherParams {
        let mut params = CipherParams {
            key: [0u8; KEY_SIZE],
            nonce: [0u8; NONCE_SIZE],
        };
        params
            .key
            .copy_from_slice(&hkdf_sha256(key_source, &[], info::CHUNK_KEY, KEY_SIZE));
        params
            .nonce
            .copy_from_slice(&hkdf_sha256(key_source, own, info::CHUNK_NONCE, NONCE_SIZE));
        params
    }

    /// Cipher parameters for a data map stored under `(parent_id, this_id)`.
    ///
    /// One SHA-512 digest of `parent_id || this_id` is split into the key
    /// (bytes 0..32) and nonce (bytes 32..56).
    pub fn data_map(parent_id: &[u8], this_id: &[u8]) -> CipherParams {
        let mut input = Vec::with_capacity(parent_id.len() + this_id.len());
        input.extend_from_slice(parent_id);
        input.extend_from_slice(this_id);
        let mut digest = sha512(&input);

        let mut params = CipherParams {
            key: [0u8; KEY_SIZE],
            nonce: [0u8; NONCE_SIZE],
        };
        params.key.copy_from_slice(&digest[..KEY_SIZE]);
        params
            .nonce
            .copy_from_slice(&digest[KEY_SIZE..KEY_SIZE + NONCE_SIZE]);
        digest.zeroize();
        input.zeroize();
        params
    }

    /// Seed for the data map obfuscation pad: SHA-512 of `this_id || parent_id`.
    ///
    /// The concatenation order is the reverse of [`KeySchedule::data_map`].
    pub fn data_map_pad_seed(parent_id: &[u8], this_id: &[u8]) -> [u8; DIGEST_SIZE] {
        let mut input = Vec::with_capacity(parent_id.len() + this_id.len());
        input.extend_from_slice(this_id);
        input.extend_from_slice(parent_id);
        sha512(&input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_params_deterministic() {
        let next = [0x11u8; DIGEST_SIZE];
        let own = [0x22u8; DIGEST_SIZE];
        let a = KeySchedule::chunk(&next, &own);
        let b = KeySchedule::chunk(&next, &own);
        assert_eq!(a.key, b.key);
        assert_eq!(a.nonce, b.nonce);
    }

    #[test]
    fn test_chunk_key_ignores_own_hash() {
        let next = [0x11u8; DIGEST_SIZE];
        let a = KeySchedule::chunk(&next, &[0x22u8; DIGEST_SIZE]);
        let b = KeySchedule::chunk(&next, &[0x33u8; DIGEST_SIZE]);
        assert_eq!(a.key, b.key);
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn test_chunk_params_match_hkdf() {
        let next = [0x44u8; DIGEST_SIZE];
        let own = [0x55u8; DIGEST_SIZE];
        let params = KeySchedule::chunk(&next, &own);
        assert_eq!(
            params.key.to_vec(),
            hkdf_sha256(&next, &[], info::CHUNK_KEY, KEY_SIZE)
        );
        assert_eq!(
            params.nonce.to_vec(),
            hkdf_sha256(&next, &own, info::CHUNK_NONCE, NONCE_SIZE)
        );
    }

    #[test]
    fn test_data_map_params_split_one_digest() {
        let params = KeySchedule::data_map(b"parent", b"child");
        let digest = sha512(b"parentchild");
        assert_eq!(&params.key[..], &digest[..32]);
        assert_eq!(&params.nonce[..], &digest[32..56]);
    }

    #[test]
    fn test_data_map_ids_are_ordered() {
        let forward = KeySchedule::data_map(b"parent", b"child");
        let swapped = KeySchedule::data_map(b"child", b"parent");
        assert_ne!(forward.key, swapped.key);

        // Pad seed uses the opposite order
        assert_eq!(
            KeySchedule::data_map_pad_seed(b"parent", b"child"),
            sha512(b"childparent")
        );
    }

    #[test]
    fn test_debug_redacts() {
        let params = KeySchedule::data_map(b"a", b"b");
        assert_eq!(format!("{:?}", params), "CipherParams([REDACTED])");
    }
}
