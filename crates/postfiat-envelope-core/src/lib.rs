//! # PostFiat Envelope Core
//!
//! Pure primitives for PostFiat envelopes: the envelope data model, content
//! hashing, and canonicalization.
//!
//! This crate contains no I/O, no storage, no key material. It is pure
//! computation over envelope data structures.
//!
//! ## Key Types
//!
//! - [`Envelope`] - The immutable unit of encrypted, addressable content
//! - [`ContentHash`] - Blake3 hash of the original plaintext
//! - [`EnvelopeId`] - Content-addressed identifier of an encoded envelope
//! - [`AccessGrant`] - One wrapped copy of the content key
//! - [`ContentDescriptor`] - Pointer to externally stored content
//! - [`ContextReference`] - Directed edge to a prior envelope
//!
//! ## Canonicalization
//!
//! Envelopes are encoded using deterministic CBOR. See [`canonical`] module.
//! The encoded length is the size compared against byte limits.

pub mod canonical;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod types;
pub mod validation;

pub use canonical::{canonical_bytes, cbor_header_len, decode_envelope};
pub use crypto::{Blake3Hash, ContentHash, X25519PublicKey};
pub use envelope::{
    AccessGrant, ContentDescriptor, ContextReference, ContextRelation, EncryptionMode, Envelope,
    EnvelopeBuilder, EnvelopeKind, GrantKind, GrantTarget, PartPosition, ENVELOPE_VERSION,
    META_MESSAGE_ID, META_MULTIPART,
};
pub use error::{CoreError, ValidationError};
pub use types::{EnvelopeId, GroupId, MessageId};
pub use validation::validate_envelope;
