//! Key primitives for sealing envelope content.
//!
//! Recipient keys are X25519; content and wrapping keys are 256-bit
//! ChaCha20-Poly1305 keys. Nothing in this module touches an ambient RNG:
//! callers pass one in so that seeded runs are reproducible.

use std::fmt;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use postfiat_envelope_core::X25519PublicKey;

use crate::error::{PermsError, Result};

/// Domain separation label for wrapping keys derived from a DH secret.
const KEY_WRAP_CONTEXT: &str = "postfiat-envelope-v1 key-wrap";

fn random_array<const N: usize, R: RngCore + CryptoRng>(rng: &mut R) -> [u8; N] {
    let mut out = [0u8; N];
    rng.fill_bytes(&mut out);
    out
}

/// Create a recipient identity: the public half to publish, the secret half
/// to keep in a [`Keyring`](crate::Keyring).
pub fn generate_keypair<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> (X25519PublicKey, X25519StaticSecret) {
    let secret = X25519StaticSecret::generate(rng);
    (secret.public_key(), secret)
}

/// Long-lived X25519 secret held by a reader or a `Protected` sender.
#[derive(Clone)]
pub struct X25519StaticSecret(StaticSecret);

impl X25519StaticSecret {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_bytes(random_array(rng))
    }

    /// Rebuild a secret from its 32 byte seed.
    pub fn from_bytes(seed: [u8; 32]) -> Self {
        Self(StaticSecret::from(seed))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(PublicKey::from(&self.0))
    }

    /// Agree on a secret with `peer`. Symmetric: either side gets the same bytes.
    pub fn diffie_hellman(&self, peer: &X25519PublicKey) -> SharedKey {
        SharedKey(*self.0.diffie_hellman(&peer.to_dalek()).as_bytes())
    }
}

impl fmt::Debug for X25519StaticSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("X25519StaticSecret")
            .field(&self.public_key())
            .finish()
    }
}

/// Raw output of an X25519 exchange. Never used as a cipher key directly.
#[derive(Clone)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Turn the exchange output into a wrapping key bound to `context`
    /// (the recipient's public key bytes when wrapping for a recipient).
    pub fn derive_encryption_key(&self, context: &[u8]) -> EncryptionKey {
        let mut kdf = blake3::Hasher::new_derive_key(KEY_WRAP_CONTEXT);
        kdf.update(&self.0);
        kdf.update(context);
        EncryptionKey(kdf.finalize().into())
    }
}

/// Symmetric ChaCha20-Poly1305 key, used for content and for key wrapping.
#[derive(Clone)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(random_array(rng))
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }

    /// Seal `plaintext`. The output carries a 16 byte Poly1305 tag.
    pub fn encrypt(&self, plaintext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        self.cipher()
            .encrypt(Nonce::from_slice(nonce.as_bytes()), plaintext)
            .map_err(|e| PermsError::EncryptionError(e.to_string()))
    }

    /// Open `ciphertext`, failing on a wrong key, wrong nonce, or any tampering.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        self.cipher()
            .decrypt(Nonce::from_slice(nonce.as_bytes()), ciphertext)
            .map_err(|e| PermsError::DecryptionError(e.to_string()))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// 96-bit AEAD nonce. A fresh one is drawn for every seal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionNonce(pub [u8; 12]);

impl EncryptionNonce {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(random_array(rng))
    }

    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

/// Single-use sender key for `PublicKey` mode grants.
///
/// The public half travels in the wrapped key so the recipient can redo
/// the exchange; the secret half is dropped after one agreement.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl EphemeralKeyPair {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = EphemeralSecret::random_from_rng(rng);
        let public: X25519PublicKey = PublicKey::from(&secret).into();
        Self { secret, public }
    }

    pub fn public_key(&self) -> X25519PublicKey {
        self.public
    }

    pub fn diffie_hellman(self, peer: &X25519PublicKey) -> SharedKey {
        SharedKey(*self.secret.diffie_hellman(&peer.to_dalek()).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_static_exchange_is_symmetric() {
        let mut rng = StdRng::seed_from_u64(42);
        let (reader_pub, reader) = generate_keypair(&mut rng);
        let (sender_pub, sender) = generate_keypair(&mut rng);

        assert_eq!(
            reader.diffie_hellman(&sender_pub).as_bytes(),
            sender.diffie_hellman(&reader_pub).as_bytes()
        );
    }

    #[test]
    fn test_ephemeral_exchange_matches_recipient_side() {
        let mut rng = StdRng::seed_from_u64(43);
        let (reader_pub, reader) = generate_keypair(&mut rng);
        let ephemeral = EphemeralKeyPair::generate(&mut rng);
        let ephemeral_pub = ephemeral.public_key();

        let sender_side = ephemeral.diffie_hellman(&reader_pub);
        let reader_side = reader.diffie_hellman(&ephemeral_pub);
        assert_eq!(sender_side.as_bytes(), reader_side.as_bytes());
    }

    #[test]
    fn test_seal_open() {
        let mut rng = StdRng::seed_from_u64(44);
        let key = EncryptionKey::generate(&mut rng);
        let nonce = EncryptionNonce::generate(&mut rng);

        let sealed = key.encrypt(b"envelope body", &nonce).unwrap();
        assert_eq!(sealed.len(), b"envelope body".len() + 16);
        assert_eq!(key.decrypt(&sealed, &nonce).unwrap(), b"envelope body");
    }

    #[test]
    fn test_open_rejects_wrong_key_and_tampering() {
        let mut rng = StdRng::seed_from_u64(45);
        let key = EncryptionKey::generate(&mut rng);
        let other = EncryptionKey::generate(&mut rng);
        let nonce = EncryptionNonce::generate(&mut rng);
        let mut sealed = key.encrypt(b"secret", &nonce).unwrap();

        assert!(matches!(
            other.decrypt(&sealed, &nonce),
            Err(PermsError::DecryptionError(_))
        ));

        sealed[0] ^= 1;
        assert!(matches!(
            key.decrypt(&sealed, &nonce),
            Err(PermsError::DecryptionError(_))
        ));
    }

    #[test]
    fn test_seeded_secret_is_reproducible() {
        let a = X25519StaticSecret::generate(&mut StdRng::seed_from_u64(9));
        let b = X25519StaticSecret::generate(&mut StdRng::seed_from_u64(9));
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(
            X25519StaticSecret::from_bytes(a.to_bytes()).public_key(),
            a.public_key()
        );
    }

    #[test]
    fn test_wrapping_key_bound_to_context() {
        let shared = SharedKey([0x42; 32]);
        let a = shared.derive_encryption_key(b"recipient-a");
        let b = shared.derive_encryption_key(b"recipient-b");

        assert_ne!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), shared.as_bytes());
        assert_eq!(
            a.as_bytes(),
            shared.derive_encryption_key(b"recipient-a").as_bytes()
        );
    }
}
