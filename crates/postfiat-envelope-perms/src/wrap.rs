//! Content key wrapping.
//!
//! A content key is wrapped once per grant target:
//!
//! - `PublicKey` mode: an ephemeral X25519 key agrees with the recipient key.
//!   Only the recipient can unwrap.
//! - `Protected` mode: the sender's static key agrees with the recipient key.
//!   The sender public key travels with the wrapped key, so the sender and
//!   the recipient can both unwrap.
//! - Group targets: the wrapping key is derived from the group secret.
//!
//! Wrapping keys derived from X25519 agreement are bound to the recipient key
//! bytes through the Blake3 derivation context.

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use postfiat_envelope_core::{AccessGrant, EncryptionMode, GrantTarget, X25519PublicKey};

use crate::crypto::{EncryptionKey, EncryptionNonce, EphemeralKeyPair, X25519StaticSecret};
use crate::error::{PermsError, Result};
use crate::grant::{AccessTarget, GroupKey};

/// The bytes stored in [`AccessGrant::wrapped_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    /// Ephemeral key (`PublicKey` mode) or sender key (`Protected` mode).
    /// Absent for group grants.
    pub peer_public: Option<X25519PublicKey>,

    /// Nonce used to encrypt the content key.
    pub nonce: EncryptionNonce,

    /// The encrypted content key.
    pub ciphertext: Vec<u8>,
}

impl WrappedKey {
    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| PermsError::SerializationError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| PermsError::SerializationError(e.to_string()))
    }
}

/// Reader-side key material tried against a grant.
#[derive(Debug, Clone, Copy)]
pub enum KeyMaterial<'a> {
    /// A static X25519 secret (recipient or sender).
    Secret(&'a X25519StaticSecret),
    /// A group secret.
    Group(&'a GroupKey),
}

/// Wrap `key` for one target.
pub fn wrap_key<R: RngCore + CryptoRng>(
    key: &EncryptionKey,
    target: &AccessTarget,
    mode: EncryptionMode,
    sender: Option<&X25519StaticSecret>,
    rng: &mut R,
) -> Result<WrappedKey> {
    let (wrapping_key, peer_public) = match (target, mode) {
        (_, EncryptionMode::None) => {
            return Err(PermsError::InvalidGrant(
                "plaintext envelopes have no content key to wrap".into(),
            ))
        }
        (AccessTarget::Group(group), _) => (group.wrapping_key(), None),
        (AccessTarget::Recipient(recipient), EncryptionMode::PublicKey) => {
            let ephemeral = EphemeralKeyPair::generate(rng);
            let ephemeral_public = ephemeral.public_key();
            let shared = ephemeral.diffie_hellman(recipient);
            (
                shared.derive_encryption_key(recipient.as_bytes()),
                Some(ephemeral_public),
            )
        }
        (AccessTarget::Recipient(recipient), EncryptionMode::Protected) => {
            let sender = sender.ok_or_else(|| {
                PermsError::InvalidGrant("protected mode requires a sender secret".into())
            })?;
            let shared = sender.diffie_hellman(recipient);
            (
                shared.derive_encryption_key(recipient.as_bytes()),
                Some(sender.public_key()),
            )
        }
    };

    let nonce = EncryptionNonce::generate(rng);
    let ciphertext = wrapping_key.encrypt(key.as_bytes(), &nonce)?;

    Ok(WrappedKey {
        peer_public,
        nonce,
        ciphertext,
    })
}

/// Recover the content key from one grant.
///
/// Returns [`PermsError::AccessDenied`] when `material` does not correspond to
/// the grant target at all, and [`PermsError::DecryptionError`] when it does
/// but the wrapped bytes fail to open.
pub fn unwrap_key(
    grant: &AccessGrant,
    mode: EncryptionMode,
    material: KeyMaterial<'_>,
) -> Result<EncryptionKey> {
    let denied = || PermsError::AccessDenied { grants: 1 };
    let decode = || {
        WrappedKey::from_bytes(&grant.wrapped_key)
            .map_err(|e| PermsError::DecryptionError(format!("malformed wrapped key: {e}")))
    };
    let peer_of = |wrapped: &WrappedKey| {
        wrapped
            .peer_public
            .ok_or_else(|| PermsError::DecryptionError("wrapped key has no peer key".into()))
    };

    let (wrapping_key, wrapped) = match (material, &grant.target) {
        (KeyMaterial::Group(group), GrantTarget::Group(id)) if group.id() == id => {
            (group.wrapping_key(), decode()?)
        }
        (KeyMaterial::Secret(secret), GrantTarget::Recipient(recipient)) => {
            let own = secret.public_key();
            match mode {
                EncryptionMode::PublicKey | EncryptionMode::Protected if own == *recipient => {
                    let wrapped = decode()?;
                    let shared = secret.diffie_hellman(&peer_of(&wrapped)?);
                    (shared.derive_encryption_key(recipient.as_bytes()), wrapped)
                }
                EncryptionMode::Protected => {
                    // The sender reads its own envelope through the recipient key.
                    let wrapped = decode().map_err(|_| denied())?;
                    if wrapped.peer_public != Some(own) {
                        return Err(denied());
                    }
                    let shared = secret.diffie_hellman(recipient);
                    (shared.derive_encryption_key(recipient.as_bytes()), wrapped)
                }
                _ => return Err(denied()),
            }
        }
        _ => return Err(denied()),
    };

    let key_bytes = wrapping_key.decrypt(&wrapped.ciphertext, &wrapped.nonce)?;
    let key_bytes: [u8; 32] = key_bytes.as_slice().try_into().map_err(|_| {
        PermsError::DecryptionError(format!(
            "invalid key length: expected 32, got {}",
            key_bytes.len()
        ))
    })?;
    Ok(EncryptionKey::from_bytes(key_bytes))
}
