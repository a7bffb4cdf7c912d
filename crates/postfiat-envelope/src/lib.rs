//! # PostFiat Envelope
//!
//! The unified API for PostFiat envelopes: encrypted, content-addressed
//! messages that respect a caller's byte limit.
//!
//! ## Overview
//!
//! - **Factory**: hashes and seals content, wraps the content key for each
//!   reader, and emits one inline envelope, one envelope pointing at external
//!   storage, or a chunk set of multipart envelopes
//! - **Reassembly**: opens single envelopes and rebuilds chunk sets, verifying
//!   the plaintext hash every time
//! - **Context**: walks `reply_to` and context references back through earlier
//!   envelopes, tolerating ancestors the reader cannot decrypt
//!
//! ## Key Concepts
//!
//! - **Content hash**: Blake3 of the plaintext. Identical whether the content
//!   ends up inline, external, or chunked.
//! - **Grant**: one wrapped copy of the content key for a recipient or group.
//! - **Chunk set**: parts sharing a `message_id`, each labelled with its
//!   position. Parts may arrive in any order.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use postfiat_envelope::{open_envelope, EnvelopeFactory, EnvelopeOutput, EnvelopeRequest};
//! use postfiat_envelope::core::EncryptionMode;
//! use postfiat_envelope::perms::{generate_keypair, Keyring};
//! use rand::rngs::OsRng;
//!
//! async fn example() {
//!     let (bob, bob_secret) = generate_keypair(&mut OsRng);
//!     let factory = EnvelopeFactory::default();
//!
//!     let request = EnvelopeRequest::new(b"hello bob", EncryptionMode::PublicKey, 1000)
//!         .recipient(bob);
//!     let output = factory.create_envelope(request, &mut OsRng).await.unwrap();
//!
//!     if let EnvelopeOutput::Single(envelope) = output {
//!         let keyring = Keyring::new().with_secret(bob_secret);
//!         let content = open_envelope(&envelope, &keyring, None).await.unwrap();
//!         assert_eq!(content, b"hello bob");
//!     }
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `postfiat_envelope::core` - Data model, hashing, and canonical encoding
//! - `postfiat_envelope::perms` - Keys, grants, and payload encryption
//! - `postfiat_envelope::store` - External content storage backends

pub mod chunking;
pub mod context;
pub mod error;
pub mod factory;
pub mod reassembly;

// Re-export component crates
pub use postfiat_envelope_core as core;
pub use postfiat_envelope_perms as perms;
pub use postfiat_envelope_store as store;

// Re-export main types for convenience
pub use chunking::ChunkPlan;
pub use context::{resolve_context, Ancestor, ContextEntry, ContextGraph};
pub use error::{EnvelopeError, Result};
pub use factory::{EnvelopeFactory, EnvelopeOutput, EnvelopeRequest, FactoryConfig};
pub use reassembly::{open_envelope, reconstruct_content_from_chunks, ChunkCollector};

// Re-export commonly used core types
pub use postfiat_envelope_core::{
    ContentDescriptor, ContentHash, ContextReference, EncryptionMode, Envelope, EnvelopeId,
    EnvelopeKind, MessageId,
};
