//! Building grants for writers and resolving them for readers.

use std::collections::btree_map::{BTreeMap, Entry};

use rand::{CryptoRng, RngCore};

use postfiat_envelope_core::{AccessGrant, EncryptionMode, GrantTarget};

use crate::crypto::{EncryptionKey, X25519StaticSecret};
use crate::error::{PermsError, Result};
use crate::grant::AccessTarget;
use crate::keyring::Keyring;
use crate::wrap::{unwrap_key, wrap_key};

/// Wrap `key` once for every distinct target.
///
/// Targets are deduplicated (one grant per recipient key, one per group id)
/// and the grants come out in [`GrantTarget`] order: recipients by key bytes,
/// then groups by id. `None` mode yields no grants.
pub fn build_grants<R: RngCore + CryptoRng>(
    key: &EncryptionKey,
    mode: EncryptionMode,
    sender: Option<&X25519StaticSecret>,
    targets: &[AccessTarget],
    rng: &mut R,
) -> Result<Vec<AccessGrant>> {
    if !mode.is_encrypted() {
        return Ok(Vec::new());
    }
    if targets.is_empty() {
        return Err(PermsError::InvalidGrant(format!(
            "{mode:?} mode requires at least one recipient or group"
        )));
    }

    let mut unique: BTreeMap<GrantTarget, &AccessTarget> = BTreeMap::new();
    for target in targets {
        match unique.entry(target.grant_target()) {
            Entry::Vacant(slot) => {
                slot.insert(target);
            }
            Entry::Occupied(existing) => {
                if let (AccessTarget::Group(kept), AccessTarget::Group(group)) =
                    (*existing.get(), target)
                {
                    if kept.secret() != group.secret() {
                        return Err(PermsError::InvalidGrant(format!(
                            "conflicting secrets for group {}",
                            group.id()
                        )));
                    }
                }
            }
        }
    }

    let mut grants = Vec::with_capacity(unique.len());
    for (grant_target, target) in unique {
        let wrapped = wrap_key(key, target, mode, sender, rng)?;
        grants.push(AccessGrant::new(grant_target, wrapped.to_bytes()?));
    }
    Ok(grants)
}

/// Recover the content key using whatever the keyring holds.
///
/// Grants are scanned in order and only key material matching a grant target
/// is tried. The first successful unwrap wins. When nothing in the keyring
/// matches any grant the result is [`PermsError::AccessDenied`]; when a
/// matching grant fails to open and no other grant succeeds, the last
/// failure is returned.
pub fn resolve_access(
    grants: &[AccessGrant],
    mode: EncryptionMode,
    keyring: &Keyring,
) -> Result<EncryptionKey> {
    if !mode.is_encrypted() {
        return Err(PermsError::InvalidGrant(
            "plaintext envelopes carry no content key".into(),
        ));
    }

    let mut failure = None;
    for grant in grants {
        for material in keyring.materials() {
            match unwrap_key(grant, mode, material) {
                Ok(key) => return Ok(key),
                Err(e) if e.is_access_denied() => {}
                Err(e) => {
                    tracing::debug!(grant = ?grant.target, error = %e, "matching grant failed to unwrap");
                    failure = Some(e);
                }
            }
        }
    }

    Err(failure.unwrap_or(PermsError::AccessDenied {
        grants: grants.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_keypair;
    use crate::grant::GroupKey;
    use postfiat_envelope_core::{GrantKind, GroupId, X25519PublicKey};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(30)
    }

    #[test]
    fn test_none_mode_has_no_grants() {
        let mut rng = rng();
        let key = EncryptionKey::generate(&mut rng);
        let target = AccessTarget::Recipient(X25519PublicKey::from_bytes([1; 32]));
        let grants = build_grants(&key, EncryptionMode::None, None, &[target], &mut rng).unwrap();
        assert!(grants.is_empty());
    }

    #[test]
    fn test_encrypted_mode_requires_targets() {
        let mut rng = rng();
        let key = EncryptionKey::generate(&mut rng);
        assert!(matches!(
            build_grants(&key, EncryptionMode::PublicKey, None, &[], &mut rng),
            Err(PermsError::InvalidGrant(_))
        ));
    }

    #[test]
    fn test_dedup_and_order() {
        let mut rng = rng();
        let key = EncryptionKey::generate(&mut rng);
        let group = GroupKey::generate(GroupId::new("g").unwrap(), &mut rng);
        let low = X25519PublicKey::from_bytes([1; 32]);
        let high = X25519PublicKey::from_bytes([2; 32]);

        let targets = vec![
            AccessTarget::Group(group.clone()),
            AccessTarget::Recipient(high),
            AccessTarget::Recipient(low),
            AccessTarget::Recipient(high),
            AccessTarget::Group(group),
        ];
        let grants =
            build_grants(&key, EncryptionMode::PublicKey, None, &targets, &mut rng).unwrap();

        assert_eq!(grants.len(), 3);
        assert_eq!(grants[0].target, GrantTarget::Recipient(low));
        assert_eq!(grants[1].target, GrantTarget::Recipient(high));
        assert_eq!(grants[2].kind, GrantKind::GroupKey);
    }

    #[test]
    fn test_conflicting_group_secrets() {
        let mut rng = rng();
        let key = EncryptionKey::generate(&mut rng);
        let id = GroupId::new("g").unwrap();
        let targets = vec![
            AccessTarget::Group(GroupKey::new(id.clone(), [1; 32])),
            AccessTarget::Group(GroupKey::new(id, [2; 32])),
        ];
        assert!(matches!(
            build_grants(&key, EncryptionMode::PublicKey, None, &targets, &mut rng),
            Err(PermsError::InvalidGrant(_))
        ));
    }

    #[test]
    fn test_resolve_for_recipient_and_group_member() {
        let mut rng = rng();
        let key = EncryptionKey::generate(&mut rng);
        let (bob_pk, bob_sk) = generate_keypair(&mut rng);
        let group = GroupKey::generate(GroupId::new("g").unwrap(), &mut rng);
        let targets = vec![
            AccessTarget::Recipient(bob_pk),
            AccessTarget::Group(group.clone()),
        ];
        let grants =
            build_grants(&key, EncryptionMode::PublicKey, None, &targets, &mut rng).unwrap();

        let bob = Keyring::new().with_secret(bob_sk);
        let member = Keyring::new().with_group(group);
        for ring in [bob, member] {
            let resolved = resolve_access(&grants, EncryptionMode::PublicKey, &ring).unwrap();
            assert_eq!(resolved.as_bytes(), key.as_bytes());
        }
    }

    #[test]
    fn test_access_denied_vs_decryption_error() {
        let mut rng = rng();
        let key = EncryptionKey::generate(&mut rng);
        let id = GroupId::new("g").unwrap();
        let group = GroupKey::generate(id.clone(), &mut rng);
        let grants = build_grants(
            &key,
            EncryptionMode::PublicKey,
            None,
            &[AccessTarget::Group(group)],
            &mut rng,
        )
        .unwrap();

        let (_, stranger) = generate_keypair(&mut rng);
        let outsider = Keyring::new().with_secret(stranger);
        assert!(matches!(
            resolve_access(&grants, EncryptionMode::PublicKey, &outsider),
            Err(PermsError::AccessDenied { grants: 1 })
        ));

        let stale = Keyring::new().with_group(GroupKey::generate(id, &mut rng));
        assert!(matches!(
            resolve_access(&grants, EncryptionMode::PublicKey, &stale),
            Err(PermsError::DecryptionError(_))
        ));
    }

    #[test]
    fn test_protected_sender_reads_own_envelope() {
        let mut rng = rng();
        let key = EncryptionKey::generate(&mut rng);
        let (_, alice_sk) = generate_keypair(&mut rng);
        let (bob_pk, _) = generate_keypair(&mut rng);
        let grants = build_grants(
            &key,
            EncryptionMode::Protected,
            Some(&alice_sk),
            &[AccessTarget::Recipient(bob_pk)],
            &mut rng,
        )
        .unwrap();

        let alice = Keyring::new().with_secret(alice_sk);
        let resolved = resolve_access(&grants, EncryptionMode::Protected, &alice).unwrap();
        assert_eq!(resolved.as_bytes(), key.as_bytes());
    }
}
