//! XChaCha20-Poly1305 authenticated encryption.
//!
//! Output is ciphertext followed by the 16-byte tag. The nonce is never
//! stored: every caller derives it again from the key schedule.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use thiserror::Error;

use super::keys::CipherParams;
use super::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Errors that can occur during AEAD operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AeadError {
    /// Invalid key length (must be 32 bytes)
    #[error("Invalid key length: expected {KEY_SIZE} bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Invalid nonce length (must be 24 bytes)
    #[error("Invalid nonce length: expected {NONCE_SIZE} bytes, got {0}")]
    InvalidNonceLength(usize),

    /// Encryption failed
    #[error("Encryption failed")]
    EncryptionFailed,

    /// Authentication tag mismatch
    #[error("Decryption failed: authentication tag mismatch")]
    DecryptionFailed,

    /// Input shorter than a tag
    #[error("Ciphertext too short: expected at least {TAG_SIZE} bytes, got {0}")]
    CiphertextTooShort(usize),
}

fn cipher_for(key: &[u8], nonce: &[u8]) -> Result<XChaCha20Poly1305, AeadError> {
    if key.len() != KEY_SIZE {
        return Err(AeadError::InvalidKeyLength(key.len()));
    }
    if nonce.len() != NONCE_SIZE {
        return Err(AeadError::InvalidNonceLength(nonce.len()));
    }
    XChaCha20Poly1305::new_from_slice(key).map_err(|_| AeadError::InvalidKeyLength(key.len()))
}

/// Encrypts `plaintext`, authenticating `aad` alongside it.
pub fn encrypt_xchacha20poly1305(
    key: &[u8],
    nonce: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, AeadError> {
    let cipher = cipher_for(key, nonce)?;
    cipher
        .encrypt(XNonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| AeadError::EncryptionFailed)
}

/// Decrypts and authenticates `ciphertext_with_tag`.
pub fn decrypt_xchacha20poly1305(
    key: &[u8],
    nonce: &[u8],
    ciphertext_with_tag: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, AeadError> {
    let cipher = cipher_for(key, nonce)?;
    if ciphertext_with_tag.len() < TAG_SIZE {
        return Err(AeadError::CiphertextTooShort(ciphertext_with_tag.len()));
    }
    cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext_with_tag,
                aad,
            },
        )
        .map_err(|_| AeadError::DecryptionFailed)
}

impl CipherParams {
    /// Encrypts with these parameters and no associated data.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, AeadError> {
        encrypt_xchacha20poly1305(&self.key, &self.nonce, plaintext, &[])
    }

    /// Decrypts with these parameters and no associated data.
    pub fn open(&self, ciphertext_with_tag: &[u8]) -> Result<Vec<u8>, AeadError> {
        decrypt_xchacha20poly1305(&self.key, &self.nonce, ciphertext_with_tag, &[])
    }
}
