//! Failures from sealing, wrapping, and resolving access.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PermsError {
    /// The reader holds no key that opens any of the envelope's grants.
    #[error("access denied: none of {grants} grant(s) opens with the keys held")]
    AccessDenied { grants: usize },

    /// A grant could not be built or does not fit the envelope's mode.
    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    #[error("encryption failed: {0}")]
    EncryptionError(String),

    /// AEAD open failed: wrong key, wrong nonce, or altered bytes.
    #[error("decryption failed: {0}")]
    DecryptionError(String),

    /// A sealed payload or wrapped key did not (de)serialize.
    #[error("malformed sealed data: {0}")]
    SerializationError(String),
}

impl PermsError {
    /// True when the reader lacks keys, as opposed to the bytes being bad.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }
}

pub type Result<T> = std::result::Result<T, PermsError>;
