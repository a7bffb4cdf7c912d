//! Error types for the envelope core.

use thiserror::Error;

use crate::crypto::ContentHash;

/// Core errors that can occur while encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u8),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Structural validation errors for envelopes.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    #[error("multipart part is missing metadata key {0:?}")]
    MissingMetadata(&'static str),

    #[error("invalid part position: index {index} of {total}")]
    InvalidPosition { index: u32, total: u32 },

    #[error("core envelope carries chunk metadata")]
    UnexpectedChunkMetadata,

    #[error("descriptor hash {descriptor} does not match envelope content hash {envelope}")]
    DescriptorHashMismatch {
        envelope: ContentHash,
        descriptor: ContentHash,
    },

    #[error("externally stored envelope must not carry an inline payload")]
    ExternalWithPayload,

    #[error("unencrypted envelope carries {0} access grants")]
    GrantsOnPlaintext(usize),

    #[error("encrypted envelope carries no access grants")]
    MissingGrants,

    #[error("grant kind does not match its target")]
    GrantKindMismatch,

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::UnsupportedVersion(v) => ValidationError::UnsupportedVersion(v),
            CoreError::MalformedEnvelope(msg)
            | CoreError::InvalidMetadata(msg)
            | CoreError::EncodingError(msg)
            | CoreError::DecodingError(msg) => ValidationError::StructuralError(msg),
        }
    }
}
