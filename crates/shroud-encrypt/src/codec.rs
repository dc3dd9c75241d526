//! Encryption of whole data maps under a pair of identifiers.
//!
//! A directory layer stores each child's data map encrypted under the
//! parent's identifier and the child's own. The pair is ordered: swapping
//! the identifiers gives a different key and pad.

use bytes::{Bytes, BytesMut};
use shroud_core::crypto::{xor_with_pad, KeySchedule};
use shroud_core::encoding::ByteString;
use shroud_core::{CanonicalDecode, CanonicalEncode, DecodeError, HashKind};
use tracing::trace;

use crate::data_map::DataMap;
use crate::EncryptError;

/// Version tag of the encrypted envelope.
pub const CODEC_VERSION: u32 = 1;

/// zstd level used for serialized data maps.
const MAP_COMPRESSION_LEVEL: i32 = 3;

struct Envelope {
    version: u32,
    ciphertext: ByteString,
}

impl CanonicalEncode for Envelope {
    fn encode(&self, buf: &mut BytesMut) {
        self.version.encode(buf);
        self.ciphertext.encode(buf);
    }
}

impl CanonicalDecode for Envelope {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            version: u32::decode(buf)?,
            ciphertext: ByteString::decode(buf)?,
        })
    }
}

/// Seals and opens data maps.
///
/// ```text
/// key, nonce = SHA-512(parent_id || this_id)[0..32], [32..56]
/// pad seed   = SHA-512(this_id || parent_id)
/// sealed     = AEAD(zstd(serialize(map)) XOR pad)
/// ```
pub struct DataMapCodec;

impl DataMapCodec {
    /// Encrypts `data_map` for storage under `(parent_id, this_id)`.
    pub fn encrypt(parent_id: &[u8], this_id: &[u8], data_map: &DataMap) -> Result<Vec<u8>, EncryptError> {
        check_ids(parent_id, this_id)?;

        let mut body = zstd::encode_all(data_map.serialize().as_slice(), MAP_COMPRESSION_LEVEL)
            .map_err(|e| EncryptError::BadDataMap(format!("compression failed: {e}")))?;
        xor_with_pad(
            HashKind::Sha512,
            &KeySchedule::data_map_pad_seed(parent_id, this_id),
            &mut body,
        );
        let ciphertext = KeySchedule::data_map(parent_id, this_id)
            .seal(&body)
            .map_err(|e| EncryptError::BadDataMap(e.to_string()))?;

        trace!(chunks = data_map.chunks.len(), sealed = ciphertext.len(), "Sealed data map");
        Ok(Envelope {
            version: CODEC_VERSION,
            ciphertext: ByteString(ciphertext),
        }
        .to_vec())
    }

    /// Opens bytes produced by [`encrypt`](Self::encrypt) with the same ids.
    pub fn decrypt(parent_id: &[u8], this_id: &[u8], sealed: &[u8]) -> Result<DataMap, EncryptError> {
        check_ids(parent_id, this_id)?;

        let envelope = Envelope::from_bytes_exact(sealed)
            .map_err(|e| EncryptError::BadDataMap(format!("envelope: {e}")))?;
        if envelope.version != CODEC_VERSION {
            return Err(EncryptError::VersionMismatch(format!(
                "data map envelope version {}",
                envelope.version
            )));
        }

        let mut body = KeySchedule::data_map(parent_id, this_id)
            .open(&envelope.ciphertext.0)
            .map_err(|e| EncryptError::BadDataMap(e.to_string()))?;
        xor_with_pad(
            HashKind::Sha512,
            &KeySchedule::data_map_pad_seed(parent_id, this_id),
            &mut body,
        );
        let serialized = zstd::decode_all(body.as_slice())
            .map_err(|e| EncryptError::BadDataMap(format!("decompression failed: {e}")))?;
        DataMap::deserialize(&serialized).map_err(|e| match e {
            EncryptError::BadDataMap(_) => e,
            other => EncryptError::BadDataMap(other.to_string()),
        })
    }
}

fn check_ids(parent_id: &[u8], this_id: &[u8]) -> Result<(), EncryptError> {
    if parent_id.is_empty() || this_id.is_empty() {
        return Err(EncryptError::InvalidArgument(
            "data map identifiers must not be empty".to_string(),
        ));
    }
    Ok(())
}
