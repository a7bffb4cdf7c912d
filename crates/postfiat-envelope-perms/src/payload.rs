//! Content sealing.
//!
//! Encrypted content is wrapped in an [`EncryptedPayload`] that carries the
//! nonce next to the ciphertext. Its CBOR encoding is the byte string placed
//! in an envelope payload (or handed to external storage).

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use postfiat_envelope_core::EncryptionMode;

use crate::crypto::{EncryptionKey, EncryptionNonce};
use crate::error::{PermsError, Result};

/// Format identifier for encrypted payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EncryptionFormat {
    /// ChaCha20-Poly1305 with 256-bit key.
    ChaCha20Poly1305 = 1,
}

/// Ciphertext plus what is needed to decrypt it, given the content key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Encryption algorithm used.
    pub format: EncryptionFormat,

    /// Nonce used for encryption (unique per encryption).
    pub nonce: EncryptionNonce,

    /// The encrypted data (includes authentication tag).
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    /// Encrypt plaintext with the given key.
    pub fn encrypt<R: RngCore + CryptoRng>(
        plaintext: &[u8],
        key: &EncryptionKey,
        rng: &mut R,
    ) -> Result<Self> {
        let nonce = EncryptionNonce::generate(rng);
        let ciphertext = key.encrypt(plaintext, &nonce)?;

        Ok(Self {
            format: EncryptionFormat::ChaCha20Poly1305,
            nonce,
            ciphertext,
        })
    }

    /// Decrypt with the given key.
    pub fn decrypt(&self, key: &EncryptionKey) -> Result<Vec<u8>> {
        match self.format {
            EncryptionFormat::ChaCha20Poly1305 => key.decrypt(&self.ciphertext, &self.nonce),
        }
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| PermsError::SerializationError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| PermsError::SerializationError(e.to_string()))
    }
}

/// Draw a fresh content key for one envelope.
pub fn derive_content_key<R: RngCore + CryptoRng>(rng: &mut R) -> EncryptionKey {
    EncryptionKey::generate(rng)
}

/// Seal plaintext for the given mode.
///
/// `None` passes the plaintext through unchanged and ignores `key`. The
/// encrypted modes require a content key and return the encoded
/// [`EncryptedPayload`].
pub fn seal_content<R: RngCore + CryptoRng>(
    plaintext: &[u8],
    mode: EncryptionMode,
    key: Option<&EncryptionKey>,
    rng: &mut R,
) -> Result<Vec<u8>> {
    match mode {
        EncryptionMode::None => Ok(plaintext.to_vec()),
        EncryptionMode::Protected | EncryptionMode::PublicKey => {
            let key = key.ok_or_else(|| {
                PermsError::EncryptionError(format!("{mode:?} mode requires a content key"))
            })?;
            EncryptedPayload::encrypt(plaintext, key, rng)?.to_bytes()
        }
    }
}

/// Reverse [`seal_content`].
///
/// Sealed bytes that do not parse, or do not authenticate under `key`, are a
/// [`PermsError::DecryptionError`].
pub fn open_content(
    sealed: &[u8],
    mode: EncryptionMode,
    key: Option<&EncryptionKey>,
) -> Result<Vec<u8>> {
    match mode {
        EncryptionMode::None => Ok(sealed.to_vec()),
        EncryptionMode::Protected | EncryptionMode::PublicKey => {
            let key = key.ok_or_else(|| {
                PermsError::DecryptionError(format!("{mode:?} mode requires a content key"))
            })?;
            let payload = EncryptedPayload::from_bytes(sealed)
                .map_err(|e| PermsError::DecryptionError(format!("malformed payload: {e}")))?;
            payload.decrypt(key)
        }
    }
}
