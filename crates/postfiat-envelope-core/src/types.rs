//! Strong type definitions for envelope identifiers.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::crypto::byte_newtype;
use crate::error::CoreError;

byte_newtype!(
    /// Blake3 of an envelope's canonical encoding.
    ///
    /// Context references point at envelopes by this id. Two envelopes with
    /// the same encoding have the same id.
    EnvelopeId,
    "EnvelopeId"
);

impl TryFrom<&[u8]> for EnvelopeId {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}

/// Correlation id shared by every part of one chunk set.
///
/// 128 random bits rendered as 32 lowercase hex characters, which is how it
/// appears under the `message_id` metadata key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Length of the hex rendering.
    pub const HEX_LEN: usize = 32;

    /// Generate a fresh random message id.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// The hex string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MessageId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s.len() == Self::HEX_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(CoreError::InvalidMetadata(format!("invalid message_id: {s:?}")));
        }
        Ok(Self(s.to_string()))
    }
}

/// Identifier of a reader group that shares one group key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(String);

impl GroupId {
    /// Create a group id. Empty ids are rejected.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::MalformedEnvelope("empty group id".into()));
        }
        Ok(Self(id))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_envelope_id_hex_roundtrip() {
        let id = EnvelopeId::from_bytes([0x42; 32]);
        let recovered = EnvelopeId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_envelope_id_display_and_slice() {
        let id = EnvelopeId::from_bytes([0xab; 32]);
        assert_eq!(id.to_string(), "ab".repeat(32));
        assert_eq!(format!("{id:?}"), "EnvelopeId(abababababababab..)");

        assert_eq!(EnvelopeId::try_from(&[0xab; 32][..]).unwrap(), id);
        assert!(EnvelopeId::try_from(&[0xab; 31][..]).is_err());
    }

    #[test]
    fn test_message_id_is_hex_and_parses() {
        let mut rng = StdRng::seed_from_u64(7);
        let id = MessageId::generate(&mut rng);
        assert_eq!(id.as_str().len(), MessageId::HEX_LEN);
        assert_eq!(id.as_str().parse::<MessageId>().unwrap(), id);
    }

    #[test]
    fn test_message_id_deterministic_with_seeded_rng() {
        let a = MessageId::generate(&mut StdRng::seed_from_u64(1));
        let b = MessageId::generate(&mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }

    #[test]
    fn test_message_id_rejects_garbage() {
        assert!("not-hex".parse::<MessageId>().is_err());
        assert!("ABCDEF0123456789ABCDEF0123456789".parse::<MessageId>().is_err());
    }

    #[test]
    fn test_group_id_rejects_empty() {
        assert!(GroupId::new("").is_err());
        assert_eq!(GroupId::new("validators").unwrap().as_str(), "validators");
    }
}
