//! # PostFiat Envelope Permissions
//!
//! Content keys, key wrapping, and access grants.
//!
//! ## Encryption Model
//!
//! Encrypted content uses a two-layer key model:
//!
//! 1. **Content Key**: a fresh symmetric key (ChaCha20-Poly1305) per envelope
//!    that encrypts the payload
//! 2. **Access Grants**: the content key wrapped once per recipient key or
//!    group, carried on the envelope
//!
//! Readers resolve a grant with the key material in their [`Keyring`]. Grant
//! targets are public; the content key is not.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use postfiat_envelope_core::EncryptionMode;
//! use postfiat_envelope_perms::{
//!     build_grants, derive_content_key, generate_keypair, open_content, resolve_access,
//!     seal_content, AccessTarget, Keyring,
//! };
//! use rand::rngs::OsRng;
//!
//! let mut rng = OsRng;
//! let (bob_public, bob_secret) = generate_keypair(&mut rng);
//!
//! let key = derive_content_key(&mut rng);
//! let sealed = seal_content(b"hi", EncryptionMode::PublicKey, Some(&key), &mut rng).unwrap();
//! let grants = build_grants(
//!     &key,
//!     EncryptionMode::PublicKey,
//!     None,
//!     &[AccessTarget::Recipient(bob_public)],
//!     &mut rng,
//! )
//! .unwrap();
//!
//! let keyring = Keyring::new().with_secret(bob_secret);
//! let key = resolve_access(&grants, EncryptionMode::PublicKey, &keyring).unwrap();
//! let plain = open_content(&sealed, EncryptionMode::PublicKey, Some(&key)).unwrap();
//! assert_eq!(plain, b"hi");
//! ```

pub mod crypto;
pub mod error;
pub mod grant;
pub mod keyring;
pub mod payload;
pub mod resolver;
pub mod wrap;

pub use crypto::{
    generate_keypair, EncryptionKey, EncryptionNonce, EphemeralKeyPair, SharedKey,
    X25519StaticSecret,
};
pub use error::{PermsError, Result};
pub use grant::{AccessTarget, GroupKey};
pub use keyring::Keyring;
pub use payload::{derive_content_key, open_content, seal_content, EncryptedPayload, EncryptionFormat};
pub use resolver::{build_grants, resolve_access};
pub use wrap::{unwrap_key, wrap_key, KeyMaterial, WrappedKey};
