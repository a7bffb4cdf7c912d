//! ContentStorage trait: the abstract interface for external content.
//!
//! Envelopes whose sealed content is too large to travel inline point at a
//! blob held by a storage backend. Implementations include SQLite, in-memory,
//! and a composite that tries several backends in a fixed order.

use async_trait::async_trait;
use bytes::Bytes;

use postfiat_envelope_core::{Blake3Hash, ContentDescriptor, ContentHash};

use crate::error::{Result, StoreError};

/// One request to persist sealed content.
#[derive(Debug, Clone, Copy)]
pub struct StoreRequest<'a> {
    /// Hash of the plaintext; copied into the returned descriptor.
    pub content_hash: ContentHash,
    /// MIME type of the plaintext.
    pub content_type: &'a str,
    /// The bytes to store (sealed content).
    pub bytes: &'a [u8],
}

impl<'a> StoreRequest<'a> {
    /// Create a request.
    pub fn new(content_hash: ContentHash, content_type: &'a str, bytes: &'a [u8]) -> Self {
        Self {
            content_hash,
            content_type,
            bytes,
        }
    }

    /// Blob key: the Blake3 hash of the stored bytes.
    pub fn blob_hash(&self) -> Blake3Hash {
        Blake3Hash::hash(self.bytes)
    }

    /// Size of the stored bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// The descriptor a backend with the given scheme returns for this request.
    pub fn descriptor(&self, scheme: &str) -> ContentDescriptor {
        ContentDescriptor {
            uri: ContentDescriptor::blob_uri(scheme, &self.blob_hash()),
            content_type: self.content_type.to_owned(),
            content_length: self.size(),
            content_hash: self.content_hash,
        }
    }
}

/// The ContentStorage trait: async interface for external content.
///
/// # Design Notes
///
/// - **Content addressing**: blobs are keyed by the Blake3 hash of the stored
///   bytes and addressed as `"<scheme>://<hex>"`.
/// - **Deduplication**: storing identical bytes twice performs one write and
///   returns an identical descriptor.
/// - **Verification**: `retrieve` checks the stored bytes against the blob
///   hash and fails with [`StoreError::Corrupt`] on mismatch.
#[async_trait]
pub trait ContentStorage: Send + Sync {
    /// Backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Whether this backend accepts content of the given size and type.
    fn can_handle(&self, size_hint: u64, content_type: &str) -> bool;

    /// Persist bytes and describe where they live.
    async fn store(&self, request: StoreRequest<'_>) -> Result<ContentDescriptor>;

    /// Fetch the bytes a descriptor points at.
    async fn retrieve(&self, descriptor: &ContentDescriptor) -> Result<Bytes>;
}

/// Extract the blob hash from a descriptor, requiring the given scheme.
pub(crate) fn locate(descriptor: &ContentDescriptor, scheme: &str) -> Result<Blake3Hash> {
    match descriptor.blob_location() {
        Some((s, blob)) if s == scheme => Ok(blob),
        _ => Err(StoreError::UnsupportedUri(descriptor.uri.clone())),
    }
}

/// Check retrieved bytes against their blob hash.
pub(crate) fn verify_blob(
    descriptor: &ContentDescriptor,
    blob: &Blake3Hash,
    bytes: Bytes,
) -> Result<Bytes> {
    let actual = Blake3Hash::hash(&bytes);
    if actual != *blob {
        return Err(StoreError::Corrupt {
            uri: descriptor.uri.clone(),
            actual: actual.to_hex(),
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_descriptor() {
        let hash = ContentHash::hash(b"plain");
        let request = StoreRequest::new(hash, "text/plain", b"sealed");
        let descriptor = request.descriptor("mem");

        assert_eq!(
            descriptor.uri,
            format!("mem://{}", Blake3Hash::hash(b"sealed").to_hex())
        );
        assert_eq!(descriptor.content_length, 6);
        assert_eq!(descriptor.content_hash, hash);
        assert_eq!(locate(&descriptor, "mem").unwrap(), request.blob_hash());
        assert!(matches!(
            locate(&descriptor, "sqlite"),
            Err(StoreError::UnsupportedUri(_))
        ));
    }

    #[test]
    fn test_verify_blob() {
        let request = StoreRequest::new(ContentHash::hash(b"p"), "text/plain", b"sealed");
        let descriptor = request.descriptor("mem");
        let blob = request.blob_hash();

        assert!(verify_blob(&descriptor, &blob, Bytes::from_static(b"sealed")).is_ok());
        assert!(matches!(
            verify_blob(&descriptor, &blob, Bytes::from_static(b"tampered")),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
