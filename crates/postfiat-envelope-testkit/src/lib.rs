//! # PostFiat Envelope Testkit
//!
//! Shared setup for the envelope crates' tests and benches.
//!
//! - [`vectors`]: named, seeded factory runs that must reproduce exactly
//! - [`generators`]: proptest strategies for envelopes and factory requests
//! - [`fixtures`]: alice, bob, and eve with keys, plus a memory-backed factory
//!
//! ## Replaying vectors
//!
//! ```rust,no_run
//! use postfiat_envelope_testkit::vectors::{all_vectors, generate_from_vector};
//!
//! async fn example() {
//!     for vector in all_vectors() {
//!         let output = generate_from_vector(&vector).await.unwrap();
//!         println!("{}: {} envelope(s)", vector.name, output.envelopes().len());
//!     }
//! }
//! ```
//!
//! ## Generated envelopes
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use postfiat_envelope_testkit::generators::{envelope_from_params, EnvelopeParams};
//!
//! proptest! {
//!     #[test]
//!     fn envelope_id_is_deterministic(params: EnvelopeParams) {
//!         let e1 = envelope_from_params(&params);
//!         let e2 = envelope_from_params(&params);
//!         prop_assert_eq!(e1.compute_id(), e2.compute_id());
//!     }
//! }
//! ```
//!
//! ## Parties and groups
//!
//! ```rust
//! use postfiat_envelope_testkit::fixtures::TestFixture;
//!
//! let mut fixture = TestFixture::new();
//! let group = fixture.group("team");
//! let keyring = fixture.bob.keyring().with_group(group);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{multi_party_fixtures, patterned_content, Party, TestFixture};
pub use generators::{envelope_from_params, EnvelopeParams, RequestParams};
pub use vectors::{
    all_vectors, export_vectors_json, generate_from_vector, vector_reports, verify_all_vectors,
    EnvelopeVector, VectorReport,
};
