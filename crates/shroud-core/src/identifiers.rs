//! Digest-valued identifiers.
//!
//! Both identifiers are 64-byte digests produced by a [`HashKind`]:
//! - `ChunkName` - Hash(stored ciphertext), the content address in a chunk store
//! - `PreHash` - Hash(raw chunk bytes), key material for neighboring chunks

use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::crypto::{HashKind, DIGEST_SIZE};
use crate::encoding::{CanonicalDecode, CanonicalEncode, DecodeError};

macro_rules! define_digest_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub [u8; DIGEST_SIZE]);

        impl $name {
            /// Wraps a raw digest.
            pub const fn new(bytes: [u8; DIGEST_SIZE]) -> Self {
                Self(bytes)
            }

            /// Digest of `data` under the given hash kind.
            pub fn of(kind: HashKind, data: &[u8]) -> Self {
                Self(kind.digest(data))
            }

            /// Returns the raw digest.
            pub const fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
                &self.0
            }

            /// Parses a 128-character hex string.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let mut bytes = [0u8; DIGEST_SIZE];
                hex::decode_to_slice(s, &mut bytes)?;
                Ok(Self(bytes))
            }

            /// Full lowercase hex form.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.to_hex()[..16])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", &self.to_hex()[..16])
            }
        }

        impl From<[u8; DIGEST_SIZE]> for $name {
            fn from(bytes: [u8; DIGEST_SIZE]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl CanonicalEncode for $name {
            fn encode(&self, buf: &mut BytesMut) {
                self.0.encode(buf);
            }
        }

        impl CanonicalDecode for $name {
            fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
                Ok(Self(<[u8; DIGEST_SIZE]>::decode(buf)?))
            }
        }
    };
}

define_digest_type!(
    /// Hash of a chunk's stored bytes.
    ///
    /// Used as the key under which a chunk store holds the chunk.
    ChunkName
);

define_digest_type!(
    /// Hash of a chunk's plaintext before compression, obfuscation and encryption.
    PreHash
);
