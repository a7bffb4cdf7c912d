//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats
//!
//! The canonical encoding is what every size-limit decision measures, and its
//! Blake3 hash is the envelope id. The same envelope therefore produces
//! identical bytes, sizes and ids on every platform.

use std::collections::BTreeMap;

use bytes::Bytes;
use ciborium::value::Value;

use crate::crypto::{ContentHash, X25519PublicKey};
use crate::envelope::{
    AccessGrant, ContentDescriptor, ContextReference, ContextRelation, EncryptionMode, Envelope,
    EnvelopeKind, GrantKind, GrantTarget,
};
use crate::error::CoreError;
use crate::types::{EnvelopeId, GroupId};

/// Envelope field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const VERSION: u64 = 0;
    pub const CONTENT_HASH: u64 = 1;
    pub const KIND: u64 = 2;
    pub const ENCRYPTION: u64 = 3;
    pub const REPLY_TO: u64 = 4;
    pub const CONTEXT_REFS: u64 = 5;
    pub const GRANTS: u64 = 6;
    pub const PAYLOAD: u64 = 7;
    pub const METADATA: u64 = 8;
    pub const DESCRIPTOR: u64 = 9;

    pub const GRANT_KIND: u64 = 0;
    pub const GRANT_TARGET: u64 = 1;
    pub const GRANT_WRAPPED_KEY: u64 = 2;

    pub const DESCRIPTOR_URI: u64 = 0;
    pub const DESCRIPTOR_CONTENT_TYPE: u64 = 1;
    pub const DESCRIPTOR_LENGTH: u64 = 2;
    pub const DESCRIPTOR_HASH: u64 = 3;
}

/// Encode an envelope to canonical CBOR bytes.
pub fn canonical_bytes(envelope: &Envelope) -> Vec<u8> {
    let value = envelope_to_cbor_value(envelope);
    let mut buf = Vec::new();
    encode_value_to(&mut buf, &value);
    buf
}

/// Number of bytes a CBOR major-type header takes for the given length.
///
/// A byte string of `n` bytes encodes as `cbor_header_len(n) + n` bytes.
pub fn cbor_header_len(len: u64) -> usize {
    if len < 24 {
        1
    } else if len <= 0xff {
        2
    } else if len <= 0xffff {
        3
    } else if len <= 0xffff_ffff {
        5
    } else {
        9
    }
}

fn int(n: u64) -> Value {
    Value::Integer(n.into())
}

/// Convert an envelope to a CBOR Value (map with integer keys).
fn envelope_to_cbor_value(envelope: &Envelope) -> Value {
    let mut entries = Vec::with_capacity(10);

    entries.push((int(keys::VERSION), int(envelope.version.into())));
    entries.push((
        int(keys::CONTENT_HASH),
        Value::Bytes(envelope.content_hash.0.to_vec()),
    ));
    entries.push((int(keys::KIND), int(envelope.kind.to_u8().into())));
    entries.push((
        int(keys::ENCRYPTION),
        int(envelope.encryption.to_u8().into()),
    ));

    let reply_to = match &envelope.reply_to {
        Some(id) => Value::Bytes(id.0.to_vec()),
        None => Value::Null,
    };
    entries.push((int(keys::REPLY_TO), reply_to));

    let refs = envelope
        .context_refs
        .iter()
        .map(|r| {
            Value::Array(vec![
                Value::Bytes(r.target.0.to_vec()),
                int(r.relation.to_u8().into()),
            ])
        })
        .collect();
    entries.push((int(keys::CONTEXT_REFS), Value::Array(refs)));

    let grants = envelope.grants.iter().map(grant_to_cbor_value).collect();
    entries.push((int(keys::GRANTS), Value::Array(grants)));

    entries.push((int(keys::PAYLOAD), Value::Bytes(envelope.payload.to_vec())));

    let metadata = envelope
        .metadata
        .iter()
        .map(|(k, v)| (Value::Text(k.clone()), Value::Text(v.clone())))
        .collect();
    entries.push((int(keys::METADATA), Value::Map(metadata)));

    let descriptor = match &envelope.descriptor {
        Some(d) => descriptor_to_cbor_value(d),
        None => Value::Null,
    };
    entries.push((int(keys::DESCRIPTOR), descriptor));

    Value::Map(entries)
}

fn grant_to_cbor_value(grant: &AccessGrant) -> Value {
    let target = match &grant.target {
        GrantTarget::Recipient(pk) => Value::Bytes(pk.0.to_vec()),
        GrantTarget::Group(id) => Value::Text(id.as_str().to_string()),
    };
    Value::Map(vec![
        (int(keys::GRANT_KIND), int(grant.kind.to_u8().into())),
        (int(keys::GRANT_TARGET), target),
        (
            int(keys::GRANT_WRAPPED_KEY),
            Value::Bytes(grant.wrapped_key.clone()),
        ),
    ])
}

fn descriptor_to_cbor_value(descriptor: &ContentDescriptor) -> Value {
    Value::Map(vec![
        (int(keys::DESCRIPTOR_URI), Value::Text(descriptor.uri.clone())),
        (
            int(keys::DESCRIPTOR_CONTENT_TYPE),
            Value::Text(descriptor.content_type.clone()),
        ),
        (int(keys::DESCRIPTOR_LENGTH), int(descriptor.content_length)),
        (
            int(keys::DESCRIPTOR_HASH),
            Value::Bytes(descriptor.content_hash.0.to_vec()),
        ),
    ])
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr),
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        other => unreachable!("envelope encoding never produces {other:?}"),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, key_value_pairs.len() as u64);

    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

/// Decode an envelope from canonical bytes.
///
/// Input that parses but is not in canonical form (trailing bytes, unsorted
/// keys, oversized integers) is rejected, so the envelope id of a decoded
/// envelope always matches the bytes it was decoded from.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, CoreError> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;

    let envelope = cbor_value_to_envelope(&value)?;

    if canonical_bytes(&envelope) != bytes {
        return Err(CoreError::MalformedEnvelope("non-canonical encoding".into()));
    }

    Ok(envelope)
}

fn malformed(what: &str) -> CoreError {
    CoreError::MalformedEnvelope(what.to_string())
}

fn map_get(map: &[(Value, Value)], key: u64) -> Option<&Value> {
    map.iter()
        .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == key as i128))
        .map(|(_, v)| v)
}

fn as_uint(value: Option<&Value>, what: &str) -> Result<u64, CoreError> {
    match value {
        Some(Value::Integer(i)) => u64::try_from(i128::from(*i)).map_err(|_| malformed(what)),
        _ => Err(malformed(what)),
    }
}

fn as_u8(value: Option<&Value>, what: &str) -> Result<u8, CoreError> {
    u8::try_from(as_uint(value, what)?).map_err(|_| malformed(what))
}

fn as_32(value: Option<&Value>, what: &str) -> Result<[u8; 32], CoreError> {
    match value {
        Some(Value::Bytes(b)) if b.len() == 32 => {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(b);
            Ok(arr)
        }
        _ => Err(malformed(what)),
    }
}

fn as_text(value: Option<&Value>, what: &str) -> Result<String, CoreError> {
    match value {
        Some(Value::Text(s)) => Ok(s.clone()),
        _ => Err(malformed(what)),
    }
}

/// Convert a CBOR Value (map) back to an Envelope.
fn cbor_value_to_envelope(value: &Value) -> Result<Envelope, CoreError> {
    let map = match value {
        Value::Map(m) => m,
        _ => return Err(malformed("expected map")),
    };

    let version = as_u8(map_get(map, keys::VERSION), "missing version")?;
    let content_hash = ContentHash(as_32(map_get(map, keys::CONTENT_HASH), "invalid content_hash")?);

    let kind_raw = as_u8(map_get(map, keys::KIND), "missing kind")?;
    let kind = EnvelopeKind::from_u8(kind_raw)
        .ok_or_else(|| CoreError::MalformedEnvelope(format!("invalid kind: {kind_raw}")))?;

    let mode_raw = as_u8(map_get(map, keys::ENCRYPTION), "missing encryption")?;
    let encryption = EncryptionMode::from_u8(mode_raw)
        .ok_or_else(|| CoreError::MalformedEnvelope(format!("invalid encryption: {mode_raw}")))?;

    let reply_to = match map_get(map, keys::REPLY_TO) {
        Some(Value::Null) | None => None,
        other => Some(EnvelopeId(as_32(other, "invalid reply_to")?)),
    };

    let context_refs = match map_get(map, keys::CONTEXT_REFS) {
        Some(Value::Array(arr)) => arr
            .iter()
            .map(cbor_value_to_context_ref)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
        _ => return Err(malformed("invalid context_refs")),
    };

    let grants = match map_get(map, keys::GRANTS) {
        Some(Value::Array(arr)) => arr
            .iter()
            .map(cbor_value_to_grant)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
        _ => return Err(malformed("invalid grants")),
    };

    let payload = match map_get(map, keys::PAYLOAD) {
        Some(Value::Bytes(b)) => Bytes::from(b.clone()),
        _ => return Err(malformed("invalid payload")),
    };

    let metadata = match map_get(map, keys::METADATA) {
        Some(Value::Map(entries)) => {
            let mut metadata = BTreeMap::new();
            for (k, v) in entries {
                match (k, v) {
                    (Value::Text(k), Value::Text(v)) => {
                        metadata.insert(k.clone(), v.clone());
                    }
                    _ => return Err(malformed("metadata must map text to text")),
                }
            }
            metadata
        }
        None => BTreeMap::new(),
        _ => return Err(malformed("invalid metadata")),
    };

    let descriptor = match map_get(map, keys::DESCRIPTOR) {
        Some(Value::Null) | None => None,
        Some(Value::Map(d)) => Some(ContentDescriptor {
            uri: as_text(map_get(d, keys::DESCRIPTOR_URI), "invalid descriptor uri")?,
            content_type: as_text(
                map_get(d, keys::DESCRIPTOR_CONTENT_TYPE),
                "invalid descriptor content_type",
            )?,
            content_length: as_uint(
                map_get(d, keys::DESCRIPTOR_LENGTH),
                "invalid descriptor length",
            )?,
            content_hash: ContentHash(as_32(
                map_get(d, keys::DESCRIPTOR_HASH),
                "invalid descriptor hash",
            )?),
        }),
        _ => return Err(malformed("invalid descriptor")),
    };

    Ok(Envelope {
        version,
        content_hash,
        kind,
        encryption,
        reply_to,
        context_refs,
        grants,
        payload,
        metadata,
        descriptor,
    })
}

fn cbor_value_to_context_ref(value: &Value) -> Result<ContextReference, CoreError> {
    match value {
        Value::Array(pair) if pair.len() == 2 => {
            let target = EnvelopeId(as_32(pair.first(), "invalid context target")?);
            let raw = as_u8(pair.get(1), "invalid context relation")?;
            let relation = ContextRelation::from_u8(raw).ok_or_else(|| {
                CoreError::MalformedEnvelope(format!("invalid context relation: {raw}"))
            })?;
            Ok(ContextReference { target, relation })
        }
        _ => Err(malformed("invalid context reference")),
    }
}

fn cbor_value_to_grant(value: &Value) -> Result<AccessGrant, CoreError> {
    let map = match value {
        Value::Map(m) => m,
        _ => return Err(malformed("grant must be a map")),
    };

    let raw = as_u8(map_get(map, keys::GRANT_KIND), "missing grant kind")?;
    let kind = GrantKind::from_u8(raw)
        .ok_or_else(|| CoreError::MalformedEnvelope(format!("invalid grant kind: {raw}")))?;

    let target = match map_get(map, keys::GRANT_TARGET) {
        Some(Value::Text(id)) => GrantTarget::Group(GroupId::new(id.clone())?),
        other => GrantTarget::Recipient(X25519PublicKey(as_32(other, "invalid grant target")?)),
    };

    let wrapped_key = match map_get(map, keys::GRANT_WRAPPED_KEY) {
        Some(Value::Bytes(b)) => b.clone(),
        _ => return Err(malformed("invalid wrapped key")),
    };

    Ok(AccessGrant {
        kind,
        target,
        wrapped_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{EnvelopeBuilder, PartPosition};
    use crate::types::MessageId;
    use proptest::prelude::*;

    fn full_envelope() -> Envelope {
        let message_id: MessageId = "0123456789abcdef0123456789abcdef".parse().unwrap();
        EnvelopeBuilder::new(ContentHash::hash(b"body"), EncryptionMode::PublicKey)
            .reply_to(Some(EnvelopeId::from_bytes([0x01; 32])))
            .context_ref(ContextReference::extends(EnvelopeId::from_bytes([0x02; 32])))
            .grants(vec![
                AccessGrant::new(
                    GrantTarget::Recipient(X25519PublicKey::from_bytes([0x03; 32])),
                    vec![0xaa; 40],
                ),
                AccessGrant::new(
                    GrantTarget::Group(GroupId::new("validators").unwrap()),
                    vec![0xbb; 40],
                ),
            ])
            .payload(vec![0x55; 300])
            .part_of(&message_id, PartPosition::new(0, 3).unwrap())
            .build()
    }

    #[test]
    fn test_canonical_encoding_deterministic() {
        let env = full_envelope();
        assert_eq!(canonical_bytes(&env), canonical_bytes(&env));
    }

    #[test]
    fn test_envelope_roundtrip() {
        let env = full_envelope();
        let decoded = decode_envelope(&canonical_bytes(&env)).unwrap();
        assert_eq!(env, decoded);
    }

    #[test]
    fn test_descriptor_roundtrip() {
        let env = EnvelopeBuilder::new(ContentHash::hash(b"x"), EncryptionMode::None)
            .descriptor(Some(ContentDescriptor {
                uri: "mem://abc".into(),
                content_type: "text/plain".into(),
                content_length: 70_000,
                content_hash: ContentHash::hash(b"x"),
            }))
            .build();
        assert_eq!(decode_envelope(&canonical_bytes(&env)).unwrap(), env);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = canonical_bytes(&full_envelope());
        bytes.push(0x00);
        assert!(decode_envelope(&bytes).is_err());
    }

    #[test]
    fn test_payload_length_accounting() {
        let base = EnvelopeBuilder::new(ContentHash::hash(b""), EncryptionMode::None).build();
        let empty_len = canonical_bytes(&base).len();

        for n in [0usize, 1, 23, 24, 255, 256, 65_535, 65_536] {
            let env = base.to_builder().payload(vec![0u8; n]).build();
            let expected = empty_len - 1 + cbor_header_len(n as u64) + n;
            assert_eq!(canonical_bytes(&env).len(), expected, "payload of {n} bytes");
        }
    }

    #[test]
    fn test_integer_encoding() {
        let mut buf = Vec::new();
        encode_uint(&mut buf, 0, 23);
        assert_eq!(buf, vec![0x17]);

        buf.clear();
        encode_uint(&mut buf, 0, 24);
        assert_eq!(buf, vec![0x18, 24]);

        buf.clear();
        encode_uint(&mut buf, 0, 256);
        assert_eq!(buf, vec![0x19, 0x01, 0x00]);
    }

    #[test]
    fn test_map_key_ordering() {
        let mut buf = Vec::new();
        let entries = vec![
            (Value::Integer(8.into()), Value::Integer(80.into())),
            (Value::Integer(0.into()), Value::Integer(0.into())),
            (Value::Integer(5.into()), Value::Integer(50.into())),
        ];
        encode_map_canonical(&mut buf, &entries);

        assert_eq!(buf[0], 0xa3);
        assert_eq!(buf[1], 0x00); // key 0
        assert_eq!(buf[3], 0x05); // key 5
        assert_eq!(buf[6], 0x08); // key 8
    }

    fn arb_envelope() -> impl Strategy<Value = Envelope> {
        (
            prop::collection::vec(any::<u8>(), 0..600),
            proptest::option::of(any::<[u8; 32]>()),
            prop::collection::vec((any::<[u8; 32]>(), any::<bool>()), 0..4),
            prop::collection::btree_map("x-[a-z]{1,6}", "[ -~]{0,12}", 0..3),
        )
            .prop_map(|(payload, reply_to, refs, metadata)| {
                let builder = refs.into_iter().fold(
                    EnvelopeBuilder::new(ContentHash::hash(&payload), EncryptionMode::None)
                        .reply_to(reply_to.map(EnvelopeId)),
                    |b, (target, responds)| {
                        b.context_ref(if responds {
                            ContextReference::responds_to(EnvelopeId(target))
                        } else {
                            ContextReference::extends(EnvelopeId(target))
                        })
                    },
                );
                metadata
                    .into_iter()
                    .fold(builder, |b, (k, v)| b.metadata(k, v))
                    .payload(payload)
                    .build()
            })
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_canonical_bytes(env in arb_envelope()) {
            let bytes = canonical_bytes(&env);
            let decoded = decode_envelope(&bytes).unwrap();
            prop_assert_eq!(canonical_bytes(&decoded), bytes);
            prop_assert_eq!(decoded, env);
        }

        #[test]
        fn prop_payload_cost_is_header_plus_bytes(len in 0usize..70_000) {
            let with = |n: usize| {
                EnvelopeBuilder::new(ContentHash::hash(b""), EncryptionMode::None)
                    .payload(vec![0u8; n])
                    .build()
            };
            let grown = canonical_bytes(&with(len)).len() - canonical_bytes(&with(0)).len();
            prop_assert_eq!(grown, cbor_header_len(len as u64) + len - 1);
        }
    }
}
