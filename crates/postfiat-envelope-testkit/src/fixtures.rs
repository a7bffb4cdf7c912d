//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: named parties with deterministic
//! keys, shared groups, and a factory wired to in-memory storage.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use postfiat_envelope::{EnvelopeFactory, FactoryConfig};
use postfiat_envelope_core::{GroupId, X25519PublicKey};
use postfiat_envelope_perms::{GroupKey, Keyring, X25519StaticSecret};
use postfiat_envelope_store::MemoryStorage;

/// A party with a deterministic X25519 key.
#[derive(Debug, Clone)]
pub struct Party {
    pub name: &'static str,
    pub secret: X25519StaticSecret,
}

impl Party {
    /// Create a party whose secret is derived from `seed`.
    pub fn with_seed(name: &'static str, seed: [u8; 32]) -> Self {
        Self {
            name,
            secret: X25519StaticSecret::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> X25519PublicKey {
        self.secret.public_key()
    }

    /// A keyring holding only this party's secret.
    pub fn keyring(&self) -> Keyring {
        Keyring::new().with_secret(self.secret.clone())
    }
}

/// Alice, Bob, and an outsider, Eve, plus a factory backed by memory storage.
pub struct TestFixture {
    pub alice: Party,
    pub bob: Party,
    pub eve: Party,
    pub storage: Arc<MemoryStorage>,
    pub factory: EnvelopeFactory,
    pub rng: StdRng,
}

impl TestFixture {
    /// Create a fixture with the default factory configuration.
    pub fn new() -> Self {
        Self::with_config(FactoryConfig::default())
    }

    /// Create a fixture with a custom factory configuration.
    pub fn with_config(config: FactoryConfig) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        Self {
            alice: Party::with_seed("alice", [0xa1; 32]),
            bob: Party::with_seed("bob", [0xb0; 32]),
            eve: Party::with_seed("eve", [0xee; 32]),
            factory: EnvelopeFactory::new(config).with_storage(storage.clone()),
            storage,
            rng: StdRng::seed_from_u64(0x5eed),
        }
    }

    /// A factory with no external storage, so oversized content is chunked.
    pub fn chunking_factory(&self) -> EnvelopeFactory {
        EnvelopeFactory::new(self.factory.config().clone())
    }

    /// A group shared by Alice and Bob.
    pub fn group(&mut self, name: &str) -> GroupKey {
        let id = GroupId::new(name).unwrap_or_else(|e| panic!("invalid group id {name:?}: {e}"));
        GroupKey::generate(id, &mut self.rng)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create several parties for multi-party tests.
pub fn multi_party_fixtures(count: usize) -> Vec<Party> {
    (0..count)
        .map(|i| {
            let mut seed = [0x70u8; 32];
            seed[0] = i as u8;
            Party::with_seed("party", seed)
        })
        .collect()
}

/// Content of `len` bytes with a repeating, non-constant pattern.
pub fn patterned_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
