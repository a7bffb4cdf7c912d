//! Error types for envelope operations.

use postfiat_envelope_core::{ContentHash, CoreError, EnvelopeId, MessageId, ValidationError};
use postfiat_envelope_perms::PermsError;
use postfiat_envelope_store::StoreError;
use thiserror::Error;

/// Errors that can occur while creating, opening, or traversing envelopes.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The request cannot produce envelopes within the given limits.
    #[error("envelope validation failed: {0}")]
    EnvelopeValidation(String),

    /// An envelope is structurally invalid.
    #[error("invalid envelope: {0}")]
    Validation(#[from] ValidationError),

    /// Encoding or decoding error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// No content key could be recovered from the envelope's grants with
    /// the reader's keys.
    #[error("access resolution failed: {0}")]
    Access(#[source] PermsError),

    /// Sealing, wrapping, or payload decryption failed.
    #[error("permission error: {0}")]
    Permission(#[from] PermsError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// A chunk set is missing parts.
    #[error("chunk set {message_id} is missing parts {missing:?} of {total}")]
    ChunkMissing {
        message_id: MessageId,
        missing: Vec<u32>,
        total: u32,
    },

    /// Recovered content does not match its declared hash.
    #[error("integrity check failed: expected {expected}, got {actual}")]
    Integrity {
        expected: ContentHash,
        actual: ContentHash,
    },

    /// The context references loop back on themselves.
    #[error("cyclic context reference at envelope {envelope}")]
    CyclicContext { envelope: EnvelopeId },

    /// The envelope is not in the context graph.
    #[error("unknown envelope: {0}")]
    UnknownEnvelope(EnvelopeId),
}

impl EnvelopeError {
    /// Whether the caller holds no key matching any grant.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, EnvelopeError::Access(e) if e.is_access_denied())
    }

    /// Whether grant resolution failed for this reader.
    ///
    /// Payload decryption and hash failures after a key was recovered are
    /// not covered: those mean the content is broken.
    pub fn is_inaccessible(&self) -> bool {
        matches!(self, EnvelopeError::Access(_))
    }
}

/// Result type for envelope operations.
pub type Result<T> = std::result::Result<T, EnvelopeError>;
