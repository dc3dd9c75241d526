//! Shroud Core - primitives shared by the self-encryption engine.
//!
//! This crate provides:
//! - Digests (SHA-512, BLAKE3 XOF), hash-chain pads, HKDF and AEAD
//! - The key schedule for chunks and data maps
//! - Canonical encoding for persisted records
//! - Digest-valued identifiers (`ChunkName`, `PreHash`)

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod crypto;
pub mod encoding;
pub mod identifiers;

pub use crypto::{HashKind, DIGEST_SIZE};
pub use encoding::{CanonicalDecode, CanonicalEncode, DecodeError};
pub use identifiers::{ChunkName, PreHash};
