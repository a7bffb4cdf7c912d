//! Reader key material.

use std::collections::BTreeMap;

use postfiat_envelope_core::{GroupId, X25519PublicKey};

use crate::crypto::X25519StaticSecret;
use crate::grant::GroupKey;
use crate::wrap::KeyMaterial;

/// The keys a reader holds: static X25519 secrets and group secrets.
///
/// Secrets are kept in insertion order; adding a secret whose public key is
/// already present is a no-op. Group keys are indexed by id and replace any
/// previous key for the same id.
#[derive(Debug, Clone, Default)]
pub struct Keyring {
    secrets: Vec<X25519StaticSecret>,
    groups: BTreeMap<GroupId, GroupKey>,
}

impl Keyring {
    /// Create an empty keyring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a static secret.
    pub fn with_secret(mut self, secret: X25519StaticSecret) -> Self {
        self.add_secret(secret);
        self
    }

    /// Add a group key.
    pub fn with_group(mut self, group: GroupKey) -> Self {
        self.add_group(group);
        self
    }

    /// Add a static secret in place.
    pub fn add_secret(&mut self, secret: X25519StaticSecret) {
        let public = secret.public_key();
        if !self.secrets.iter().any(|s| s.public_key() == public) {
            self.secrets.push(secret);
        }
    }

    /// Add a group key in place.
    pub fn add_group(&mut self, group: GroupKey) {
        self.groups.insert(group.id().clone(), group);
    }

    /// Public keys of the held secrets.
    pub fn public_keys(&self) -> impl Iterator<Item = X25519PublicKey> + '_ {
        self.secrets.iter().map(X25519StaticSecret::public_key)
    }

    /// Look up a group key.
    pub fn group(&self, id: &GroupId) -> Option<&GroupKey> {
        self.groups.get(id)
    }

    /// Every piece of key material, secrets first.
    pub fn materials(&self) -> impl Iterator<Item = KeyMaterial<'_>> + '_ {
        self.secrets
            .iter()
            .map(KeyMaterial::Secret)
            .chain(self.groups.values().map(KeyMaterial::Group))
    }

    /// Whether the keyring holds no keys.
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty() && self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_keypair;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_duplicate_secret_ignored() {
        let mut rng = StdRng::seed_from_u64(20);
        let (_, sk) = generate_keypair(&mut rng);
        let ring = Keyring::new().with_secret(sk.clone()).with_secret(sk);
        assert_eq!(ring.public_keys().count(), 1);
    }

    #[test]
    fn test_materials_order() {
        let mut rng = StdRng::seed_from_u64(21);
        let (_, sk) = generate_keypair(&mut rng);
        let group = GroupKey::generate(GroupId::new("g").unwrap(), &mut rng);
        let ring = Keyring::new().with_group(group).with_secret(sk);

        let kinds: Vec<_> = ring
            .materials()
            .map(|m| matches!(m, KeyMaterial::Secret(_)))
            .collect();
        assert_eq!(kinds, vec![true, false]);
        assert!(!ring.is_empty());
        assert!(Keyring::new().is_empty());
    }
}
