//! Hash and public key newtypes.
//!
//! Only public material lives here. Secrets and ciphers belong to
//! `postfiat-envelope-perms`.

/// Declares a 32 byte newtype with hex helpers and a short `Debug` form.
macro_rules! byte_newtype {
    ($(#[$meta:meta])* $name:ident, $debug:literal) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Lowercase hex, 64 characters.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                $crate::crypto::decode_hex_32(s).map(Self)
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, concat!($debug, "({}..)"), &self.to_hex()[..16])
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }
    };
}

pub(crate) use byte_newtype;

byte_newtype!(
    /// Blake3 digest of arbitrary bytes: envelope encodings, stored blobs.
    Blake3Hash,
    "Blake3"
);

byte_newtype!(
    /// Blake3 digest of an envelope's plaintext.
    ///
    /// The same content has the same hash inline, in external storage, or
    /// split into parts, under any encryption mode.
    ContentHash,
    "ContentHash"
);

byte_newtype!(
    /// X25519 public key of a recipient or a `Protected` sender.
    X25519PublicKey,
    "X25519Pub"
);

impl Blake3Hash {
    pub fn hash(data: &[u8]) -> Self {
        Self(blake3::hash(data).into())
    }
}

impl ContentHash {
    pub fn hash(content: &[u8]) -> Self {
        Self(blake3::hash(content).into())
    }
}

impl X25519PublicKey {
    pub fn to_dalek(&self) -> x25519_dalek::PublicKey {
        x25519_dalek::PublicKey::from(self.0)
    }
}

impl From<x25519_dalek::PublicKey> for X25519PublicKey {
    fn from(key: x25519_dalek::PublicKey) -> Self {
        Self(*key.as_bytes())
    }
}

pub(crate) fn decode_hex_32(s: &str) -> Result<[u8; 32], hex::FromHexError> {
    let mut out = [0u8; 32];
    hex::decode_to_slice(s, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(Blake3Hash::hash(b"blob"), Blake3Hash::hash(b"blob"));
        assert_ne!(Blake3Hash::hash(b"blob"), Blake3Hash::hash(b"blob "));
    }

    #[test]
    fn test_content_hash_matches_blake3() {
        let content = b"envelope body";
        assert_eq!(
            ContentHash::hash(content).as_bytes(),
            blake3::hash(content).as_bytes()
        );
    }

    #[test]
    fn test_content_hash_empty_vector() {
        assert_eq!(
            ContentHash::hash(b"").to_hex(),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn test_hex_parse() {
        let hash = ContentHash::hash(b"parse me");
        assert_eq!(ContentHash::from_hex(&hash.to_hex()).unwrap(), hash);

        let pk = X25519PublicKey::from_bytes([0x11; 32]);
        assert_eq!(X25519PublicKey::from_hex(&"11".repeat(32)).unwrap(), pk);
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(Blake3Hash::from_hex("abcd").is_err());
        assert!(Blake3Hash::from_hex(&"00".repeat(33)).is_err());
    }

    #[test]
    fn test_debug_is_abbreviated() {
        let shown = format!("{:?}", ContentHash::from_bytes([0xab; 32]));
        assert_eq!(shown, "ContentHash(abababababababab..)");
    }
}
