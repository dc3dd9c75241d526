//! HKDF-SHA-256 (RFC 5869) and HMAC-SHA-256 (RFC 2104).
//!
//! Used to turn 64-byte pre-hashes into cipher keys and nonces.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Largest output HKDF-SHA-256 can produce (255 blocks of 32 bytes).
pub const HKDF_MAX_OUTPUT: usize = 255 * 32;

/// Computes HMAC-SHA-256 of a message under `key`.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    let mut output = [0u8; 32];
    output.copy_from_slice(&mac.finalize().into_bytes());
    output
}

/// HKDF-SHA-256 extract-then-expand.
///
/// An empty salt is replaced by 32 zero bytes as RFC 5869 prescribes.
///
/// # Panics
/// Panics if `length` is 0 or exceeds [`HKDF_MAX_OUTPUT`]. All callers in
/// this workspace request fixed key or nonce widths.
///
/// # Example
/// ```
/// use shroud_core::crypto::hkdf_sha256;
///
/// let okm = hkdf_sha256(&[0x0bu8; 22], &[0x00, 0x01, 0x02], b"ctx", 32);
/// assert_eq!(okm.len(), 32);
/// ```
pub fn hkdf_sha256(ikm: &[u8], salt: &[u8], info: &[u8], length: usize) -> Vec<u8> {
    assert!(
        length >= 1 && length <= HKDF_MAX_OUTPUT,
        "HKDF output length must be 1-{HKDF_MAX_OUTPUT} bytes"
    );

    let prk = if salt.is_empty() {
        hmac_sha256(&[0u8; 32], ikm)
    } else {
        hmac_sha256(salt, ikm)
    };

    let mut output = Vec::with_capacity(length + 32);
    let mut previous: Vec<u8> = Vec::new();
    let mut counter = 1u8;
    while output.len() < length {
        let mut mac = HmacSha256::new_from_slice(&prk).expect("HMAC can take key of any size");
        mac.update(&previous);
        mac.update(info);
        mac.update(&[counter]);
        previous = mac.finalize().into_bytes().to_vec();
        output.extend_from_slice(&previous);
        counter = counter.wrapping_add(1);
    }

    output.truncate(length);
    output
}
