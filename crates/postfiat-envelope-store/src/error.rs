//! Content store failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient: another backend, or a later attempt, may succeed.
    #[error("{backend} store unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    /// Permanent for this content on this backend, e.g. over its size cap.
    #[error("{backend} store refused content: {reason}")]
    Rejected { backend: String, reason: String },

    #[error("no blob stored at {0}")]
    NotFound(String),

    /// The descriptor points at a scheme this backend does not serve.
    #[error("uri {0} is not served by this store")]
    UnsupportedUri(String),

    /// The bytes read back do not hash to the address they were stored under.
    #[error("blob at {uri} is corrupt: bytes hash to {actual}")]
    Corrupt { uri: String, actual: String },

    #[error("sqlite: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("schema migration failed: {0}")]
    Migration(String),
}

impl StoreError {
    /// Whether the factory should try the next backend or fall back to parts.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
