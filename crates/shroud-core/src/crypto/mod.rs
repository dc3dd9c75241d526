//! Cryptographic primitives.
//!
//! - SHA-512 and BLAKE3 (64-byte XOF) digests
//! - Hash-chain XOR pads
//! - HKDF-SHA-256 (RFC 5869) and HMAC-SHA-256
//! - XChaCha20-Poly1305 AEAD

mod aead;
mod digest;
mod hkdf;
mod keys;

pub use aead::{decrypt_xchacha20poly1305, encrypt_xchacha20poly1305, AeadError};
pub use digest::{expand_pad, sha512, xor_with_pad, HashKind, Hasher};
pub use hkdf::{hkdf_sha256, hmac_sha256, HKDF_MAX_OUTPUT};
pub use keys::{info, CipherParams, KeySchedule};

/// Width of every digest in the engine
pub const DIGEST_SIZE: usize = 64;

/// AEAD nonce size for XChaCha20-Poly1305
pub const NONCE_SIZE: usize = 24;

/// AEAD tag size for XChaCha20-Poly1305
pub const TAG_SIZE: usize = 16;

/// Key size for XChaCha20-Poly1305
pub const KEY_SIZE: usize = 32;
