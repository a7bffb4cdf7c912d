//! Grant targets: who may receive a wrapped content key.

use std::fmt;

use rand::{CryptoRng, RngCore};

use postfiat_envelope_core::{GrantTarget, GroupId, X25519PublicKey};

use crate::crypto::EncryptionKey;

/// A shared group secret, identified by its group id.
#[derive(Clone, PartialEq, Eq)]
pub struct GroupKey {
    id: GroupId,
    secret: [u8; 32],
}

impl GroupKey {
    /// Create from an id and raw secret.
    pub fn new(id: GroupId, secret: [u8; 32]) -> Self {
        Self { id, secret }
    }

    /// Generate a fresh random secret for a group.
    pub fn generate<R: RngCore + CryptoRng>(id: GroupId, rng: &mut R) -> Self {
        let mut secret = [0u8; 32];
        rng.fill_bytes(&mut secret);
        Self { id, secret }
    }

    /// The group id.
    pub fn id(&self) -> &GroupId {
        &self.id
    }

    /// Raw secret bytes.
    pub fn secret(&self) -> &[u8; 32] {
        &self.secret
    }

    /// Key used to wrap content keys for this group.
    pub fn wrapping_key(&self) -> EncryptionKey {
        let mut hasher = blake3::Hasher::new_derive_key("postfiat-envelope-v1 group-wrap");
        hasher.update(&self.secret);
        hasher.update(self.id.as_str().as_bytes());
        EncryptionKey::from_bytes(*hasher.finalize().as_bytes())
    }
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupKey")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Who a content key should be wrapped for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessTarget {
    /// An individual recipient key.
    Recipient(X25519PublicKey),
    /// Every holder of a group secret.
    Group(GroupKey),
}

impl AccessTarget {
    /// The public identity recorded on the resulting grant.
    pub fn grant_target(&self) -> GrantTarget {
        match self {
            AccessTarget::Recipient(pk) => GrantTarget::Recipient(*pk),
            AccessTarget::Group(group) => GrantTarget::Group(group.id().clone()),
        }
    }
}

impl From<X25519PublicKey> for AccessTarget {
    fn from(pk: X25519PublicKey) -> Self {
        AccessTarget::Recipient(pk)
    }
}

impl From<GroupKey> for AccessTarget {
    fn from(group: GroupKey) -> Self {
        AccessTarget::Group(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn group(name: &str, secret: u8) -> GroupKey {
        GroupKey::new(GroupId::new(name).unwrap(), [secret; 32])
    }

    #[test]
    fn test_wrapping_key_depends_on_secret_and_id() {
        let a = group("ops", 1).wrapping_key();
        assert_eq!(a.as_bytes(), group("ops", 1).wrapping_key().as_bytes());
        assert_ne!(a.as_bytes(), group("ops", 2).wrapping_key().as_bytes());
        assert_ne!(a.as_bytes(), group("dev", 1).wrapping_key().as_bytes());
    }

    #[test]
    fn test_debug_hides_secret() {
        let rendered = format!("{:?}", group("ops", 0xab));
        assert!(rendered.contains("ops"));
        assert!(!rendered.contains("171"));
    }

    #[test]
    fn test_grant_target_mapping() {
        let mut rng = StdRng::seed_from_u64(7);
        let g = GroupKey::generate(GroupId::new("team").unwrap(), &mut rng);
        assert_eq!(
            AccessTarget::from(g.clone()).grant_target(),
            GrantTarget::Group(g.id().clone())
        );

        let pk = X25519PublicKey::from_bytes([3; 32]);
        assert_eq!(
            AccessTarget::from(pk).grant_target(),
            GrantTarget::Recipient(pk)
        );
    }
}
