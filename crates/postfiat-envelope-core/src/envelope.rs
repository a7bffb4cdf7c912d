//! Envelope: the unit of encrypted, addressable content.
//!
//! An envelope is immutable. It is assembled once through [`EnvelopeBuilder`]
//! and afterwards only read, traversed, and decrypted.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_bytes, decode_envelope};
use crate::crypto::{Blake3Hash, ContentHash, X25519PublicKey};
use crate::error::CoreError;
use crate::types::{EnvelopeId, GroupId, MessageId};

/// The current envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// Metadata key holding the human-readable part position, e.g. `"2/5"`.
pub const META_MULTIPART: &str = "multipart";

/// Metadata key holding the chunk set correlation id.
pub const META_MESSAGE_ID: &str = "message_id";

/// Whether an envelope carries whole content or one part of a chunk set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EnvelopeKind {
    /// A self-contained envelope (inline or externally stored content).
    Core = 0,
    /// One part of a multipart chunk set.
    MultipartPart = 1,
}

impl EnvelopeKind {
    /// Convert to u8 for serialization.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Try to parse from u8.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Core),
            1 => Some(Self::MultipartPart),
            _ => None,
        }
    }
}

/// How the payload is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EncryptionMode {
    /// Plaintext passthrough. No grants.
    None = 0,
    /// Content key wrapped under a static sender/recipient shared secret.
    Protected = 1,
    /// Content key wrapped to the recipient public key with an ephemeral key.
    PublicKey = 2,
}

impl EncryptionMode {
    /// Convert to u8 for serialization.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Try to parse from u8.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Protected),
            2 => Some(Self::PublicKey),
            _ => None,
        }
    }

    /// Whether the payload is ciphertext.
    pub fn is_encrypted(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Relationship of an envelope to an envelope it references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ContextRelation {
    /// Continues or builds on the target.
    Extends = 0,
    /// Responds to the target.
    RespondsTo = 1,
}

impl ContextRelation {
    /// Convert to u8 for serialization.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Try to parse from u8.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Extends),
            1 => Some(Self::RespondsTo),
            _ => None,
        }
    }
}

/// A public, directed edge to a prior envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextReference {
    /// The referenced envelope.
    pub target: EnvelopeId,
    /// How this envelope relates to the target.
    pub relation: ContextRelation,
}

impl ContextReference {
    /// Reference an envelope this one extends.
    pub fn extends(target: EnvelopeId) -> Self {
        Self {
            target,
            relation: ContextRelation::Extends,
        }
    }

    /// Reference an envelope this one responds to.
    pub fn responds_to(target: EnvelopeId) -> Self {
        Self {
            target,
            relation: ContextRelation::RespondsTo,
        }
    }
}

/// Kind of an access grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum GrantKind {
    /// Content key wrapped for one recipient key.
    ContentKey = 0,
    /// Content key wrapped under a group secret.
    GroupKey = 1,
}

impl GrantKind {
    /// Convert to u8 for serialization.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Try to parse from u8.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::ContentKey),
            1 => Some(Self::GroupKey),
            _ => None,
        }
    }
}

/// Who a grant is for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GrantTarget {
    /// An individual recipient.
    Recipient(X25519PublicKey),
    /// Every holder of a group secret.
    Group(GroupId),
}

impl GrantTarget {
    /// The grant kind implied by this target.
    pub fn grant_kind(&self) -> GrantKind {
        match self {
            GrantTarget::Recipient(_) => GrantKind::ContentKey,
            GrantTarget::Group(_) => GrantKind::GroupKey,
        }
    }
}

/// One wrapped copy of an envelope's content key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    /// Grant kind.
    pub kind: GrantKind,
    /// The recipient or group able to unwrap.
    pub target: GrantTarget,
    /// Opaque wrapped key bytes, interpreted by the permissions crate.
    pub wrapped_key: Vec<u8>,
}

impl AccessGrant {
    /// Create a grant whose kind follows from its target.
    pub fn new(target: GrantTarget, wrapped_key: Vec<u8>) -> Self {
        Self {
            kind: target.grant_kind(),
            target,
            wrapped_key,
        }
    }
}

/// Describes content held by an external storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDescriptor {
    /// Dereferenceable location, `"<scheme>://<blob hash hex>"`.
    pub uri: String,
    /// MIME type of the plaintext.
    pub content_type: String,
    /// Length in bytes of the stored representation.
    pub content_length: u64,
    /// Hash of the original plaintext; equals the envelope content hash.
    pub content_hash: ContentHash,
}

impl ContentDescriptor {
    /// Build the URI for a blob under a storage scheme.
    pub fn blob_uri(scheme: &str, blob: &Blake3Hash) -> String {
        format!("{scheme}://{}", blob.to_hex())
    }

    /// Split the URI into scheme and blob hash.
    pub fn blob_location(&self) -> Option<(&str, Blake3Hash)> {
        let (scheme, rest) = self.uri.split_once("://")?;
        let blob = Blake3Hash::from_hex(rest).ok()?;
        Some((scheme, blob))
    }
}

/// Position of a part inside its chunk set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartPosition {
    /// Zero-based index.
    pub index: u32,
    /// Number of parts in the set.
    pub total: u32,
}

impl PartPosition {
    /// Create a position, rejecting `index >= total`.
    pub fn new(index: u32, total: u32) -> Result<Self, CoreError> {
        if total == 0 || index >= total {
            return Err(CoreError::InvalidMetadata(format!(
                "part index {index} out of range for total {total}"
            )));
        }
        Ok(Self { index, total })
    }
}

impl fmt::Display for PartPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index + 1, self.total)
    }
}

impl FromStr for PartPosition {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidMetadata(format!("invalid multipart value: {s:?}"));
        let (part, total) = s.split_once('/').ok_or_else(invalid)?;
        let part: u32 = part.parse().map_err(|_| invalid())?;
        let total: u32 = total.parse().map_err(|_| invalid())?;
        if part == 0 {
            return Err(invalid());
        }
        Self::new(part - 1, total)
    }
}

/// An encrypted, addressable unit of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub(crate) version: u8,
    pub(crate) content_hash: ContentHash,
    pub(crate) kind: EnvelopeKind,
    pub(crate) encryption: EncryptionMode,
    pub(crate) reply_to: Option<EnvelopeId>,
    pub(crate) context_refs: Vec<ContextReference>,
    pub(crate) grants: Vec<AccessGrant>,
    pub(crate) payload: Bytes,
    pub(crate) metadata: BTreeMap<String, String>,
    pub(crate) descriptor: Option<ContentDescriptor>,
}

impl Envelope {
    /// Format version.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Hash of the original plaintext.
    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    /// Envelope kind.
    pub fn kind(&self) -> EnvelopeKind {
        self.kind
    }

    /// Encryption mode of the payload.
    pub fn encryption(&self) -> EncryptionMode {
        self.encryption
    }

    /// Envelope this one replies to, if any.
    pub fn reply_to(&self) -> Option<&EnvelopeId> {
        self.reply_to.as_ref()
    }

    /// Ordered context references.
    pub fn context_refs(&self) -> &[ContextReference] {
        &self.context_refs
    }

    /// Access grants.
    pub fn grants(&self) -> &[AccessGrant] {
        &self.grants
    }

    /// Ciphertext payload (empty for externally stored content).
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// String metadata.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Descriptor of externally stored content.
    pub fn descriptor(&self) -> Option<&ContentDescriptor> {
        self.descriptor.as_ref()
    }

    /// Whether the content lives in external storage.
    pub fn is_external(&self) -> bool {
        self.descriptor.is_some()
    }

    /// The chunk set id, if the `message_id` key is present.
    pub fn message_id(&self) -> Option<Result<MessageId, CoreError>> {
        self.metadata.get(META_MESSAGE_ID).map(|v| v.parse())
    }

    /// The part position, if the `multipart` key is present.
    pub fn position(&self) -> Option<Result<PartPosition, CoreError>> {
        self.metadata.get(META_MULTIPART).map(|v| v.parse())
    }

    /// Every envelope this one points at: `reply_to` first, then context refs.
    pub fn references(&self) -> impl Iterator<Item = &EnvelopeId> + '_ {
        self.reply_to
            .iter()
            .chain(self.context_refs.iter().map(|r| &r.target))
    }

    /// Canonical CBOR bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        canonical_bytes(self)
    }

    /// Decode from canonical CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        decode_envelope(bytes)
    }

    /// Serialized size in bytes. This is the size compared against limits.
    pub fn encoded_len(&self) -> usize {
        self.to_bytes().len()
    }

    /// Compute the content-addressed envelope id.
    pub fn compute_id(&self) -> EnvelopeId {
        EnvelopeId(Blake3Hash::hash(&self.to_bytes()).0)
    }

    /// Start a builder pre-filled with this envelope's fields.
    pub fn to_builder(&self) -> EnvelopeBuilder {
        EnvelopeBuilder {
            envelope: self.clone(),
        }
    }
}

/// Builder for assembling envelopes.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    envelope: Envelope,
}

impl EnvelopeBuilder {
    /// Start a `Core` envelope with the current format version.
    pub fn new(content_hash: ContentHash, encryption: EncryptionMode) -> Self {
        Self {
            envelope: Envelope {
                version: ENVELOPE_VERSION,
                content_hash,
                kind: EnvelopeKind::Core,
                encryption,
                reply_to: None,
                context_refs: Vec::new(),
                grants: Vec::new(),
                payload: Bytes::new(),
                metadata: BTreeMap::new(),
                descriptor: None,
            },
        }
    }

    /// Set the format version.
    pub fn version(mut self, version: u8) -> Self {
        self.envelope.version = version;
        self
    }

    /// Set the envelope kind.
    pub fn kind(mut self, kind: EnvelopeKind) -> Self {
        self.envelope.kind = kind;
        self
    }

    /// Set the reply-to reference.
    pub fn reply_to(mut self, target: Option<EnvelopeId>) -> Self {
        self.envelope.reply_to = target;
        self
    }

    /// Append a context reference.
    pub fn context_ref(mut self, reference: ContextReference) -> Self {
        self.envelope.context_refs.push(reference);
        self
    }

    /// Replace all context references.
    pub fn context_refs(mut self, refs: Vec<ContextReference>) -> Self {
        self.envelope.context_refs = refs;
        self
    }

    /// Replace all access grants.
    pub fn grants(mut self, grants: Vec<AccessGrant>) -> Self {
        self.envelope.grants = grants;
        self
    }

    /// Set the payload.
    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.envelope.payload = payload.into();
        self
    }

    /// Insert a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envelope.metadata.insert(key.into(), value.into());
        self
    }

    /// Tag as a part of a chunk set.
    pub fn part_of(self, message_id: &MessageId, position: PartPosition) -> Self {
        self.kind(EnvelopeKind::MultipartPart)
            .metadata(META_MESSAGE_ID, message_id.as_str())
            .metadata(META_MULTIPART, position.to_string())
    }

    /// Attach an external content descriptor.
    pub fn descriptor(mut self, descriptor: Option<ContentDescriptor>) -> Self {
        self.envelope.descriptor = descriptor;
        self
    }

    /// Finish building.
    pub fn build(self) -> Envelope {
        self.envelope
    }
}
