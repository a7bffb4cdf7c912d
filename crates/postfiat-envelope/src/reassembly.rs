//! Recovering plaintext from envelopes.
//!
//! - [`open_envelope`] handles a single inline or external envelope.
//! - [`reconstruct_content_from_chunks`] handles a complete chunk set.
//! - [`ChunkCollector`] gathers parts that arrive one at a time, in any order.

use std::collections::{BTreeMap, HashMap};

use bytes::BytesMut;

use postfiat_envelope_core::{
    validate_envelope, AccessGrant, ContentHash, EncryptionMode, Envelope, EnvelopeKind,
    MessageId, PartPosition,
};
use postfiat_envelope_perms::{open_content, resolve_access, Keyring};
use postfiat_envelope_store::{ContentStorage, StoreError};

use crate::error::{EnvelopeError, Result};

/// Decrypt and verify the content of one envelope.
///
/// External content is fetched through `storage` and checked against the
/// descriptor before decryption. A multipart part is accepted only when it is
/// the sole part of its set.
pub async fn open_envelope(
    envelope: &Envelope,
    keyring: &Keyring,
    storage: Option<&dyn ContentStorage>,
) -> Result<Vec<u8>> {
    validate_envelope(envelope)?;

    if envelope.kind() == EnvelopeKind::MultipartPart {
        return reconstruct_content_from_chunks(std::slice::from_ref(envelope), keyring);
    }

    let sealed = match envelope.descriptor() {
        None => envelope.payload().clone(),
        Some(descriptor) => {
            let storage = storage.ok_or_else(|| StoreError::Unavailable {
                backend: "none".into(),
                reason: format!("no storage configured to fetch {}", descriptor.uri),
            })?;
            let bytes = storage.retrieve(descriptor).await?;
            if bytes.len() as u64 != descriptor.content_length {
                return Err(EnvelopeError::EnvelopeValidation(format!(
                    "descriptor declares {} bytes but storage returned {}",
                    descriptor.content_length,
                    bytes.len()
                )));
            }
            bytes
        }
    };

    unseal(
        &sealed,
        envelope.encryption(),
        envelope.grants(),
        envelope.content_hash(),
        keyring,
    )
}

/// Reassemble, decrypt, and verify a chunk set.
///
/// `parts` may be in any order and may contain identical duplicates. They
/// must all belong to one `message_id` and agree on part count, encryption
/// mode, and content hash.
pub fn reconstruct_content_from_chunks(parts: &[Envelope], keyring: &Keyring) -> Result<Vec<u8>> {
    let first = parts.first().ok_or_else(|| {
        EnvelopeError::EnvelopeValidation("no parts to reconstruct".into())
    })?;
    let (message_id, first_position) = part_identity(first)?;

    let mut by_index: BTreeMap<u32, &Envelope> = BTreeMap::new();
    for part in parts {
        let (id, position) = part_identity(part)?;
        if id != message_id {
            return Err(EnvelopeError::EnvelopeValidation(format!(
                "parts belong to different chunk sets: {message_id} and {id}"
            )));
        }
        check_consistent(first, first_position.total, part, position.total)?;

        if let Some(existing) = by_index.insert(position.index, part) {
            if existing != part {
                return Err(EnvelopeError::EnvelopeValidation(format!(
                    "conflicting copies of part {position} in chunk set {message_id}"
                )));
            }
        }
    }

    let total = first_position.total;
    let missing: Vec<u32> = (0..total).filter(|i| !by_index.contains_key(i)).collect();
    if !missing.is_empty() {
        return Err(EnvelopeError::ChunkMissing {
            message_id,
            missing,
            total,
        });
    }

    let mut sealed = BytesMut::with_capacity(by_index.values().map(|p| p.payload().len()).sum());
    for part in by_index.values() {
        sealed.extend_from_slice(part.payload());
    }

    unseal(
        &sealed,
        first.encryption(),
        first.grants(),
        first.content_hash(),
        keyring,
    )
}

/// Resolve the content key, decrypt, and verify the plaintext hash.
fn unseal(
    sealed: &[u8],
    mode: EncryptionMode,
    grants: &[AccessGrant],
    expected: &ContentHash,
    keyring: &Keyring,
) -> Result<Vec<u8>> {
    let key = if mode.is_encrypted() {
        Some(resolve_access(grants, mode, keyring).map_err(EnvelopeError::Access)?)
    } else {
        None
    };
    let plaintext = open_content(sealed, mode, key.as_ref())?;

    let actual = ContentHash::hash(&plaintext);
    if actual != *expected {
        return Err(EnvelopeError::Integrity {
            expected: *expected,
            actual,
        });
    }
    Ok(plaintext)
}

/// The chunk set id and position of a part.
fn part_identity(part: &Envelope) -> Result<(MessageId, PartPosition)> {
    if part.kind() != EnvelopeKind::MultipartPart {
        return Err(EnvelopeError::EnvelopeValidation(
            "expected a multipart part".into(),
        ));
    }
    validate_envelope(part)?;
    // Validation guarantees both keys are present and well formed.
    let id = part
        .message_id()
        .ok_or_else(|| EnvelopeError::EnvelopeValidation("part without message_id".into()))??;
    let position = part
        .position()
        .ok_or_else(|| EnvelopeError::EnvelopeValidation("part without position".into()))??;
    Ok((id, position))
}

fn check_consistent(first: &Envelope, total: u32, part: &Envelope, part_total: u32) -> Result<()> {
    if part_total != total {
        return Err(EnvelopeError::EnvelopeValidation(format!(
            "parts disagree on total: {total} and {part_total}"
        )));
    }
    if part.encryption() != first.encryption() {
        return Err(EnvelopeError::EnvelopeValidation(
            "parts disagree on encryption mode".into(),
        ));
    }
    if part.content_hash() != first.content_hash() {
        return Err(EnvelopeError::Integrity {
            expected: *first.content_hash(),
            actual: *part.content_hash(),
        });
    }
    Ok(())
}

/// Collects parts of many chunk sets as they arrive.
///
/// A set is handed back, ordered by index, as soon as its last part arrives.
/// Identical duplicates are ignored.
///
/// Incomplete sets are held until they complete or the caller drops them.
/// The collector has no timeout of its own: callers that receive from
/// untrusted peers evict through [`pending_ids`](Self::pending_ids) and
/// [`discard`](Self::discard), or bound memory with [`retain`](Self::retain).
#[derive(Debug, Default)]
pub struct ChunkCollector {
    pending: HashMap<MessageId, PendingSet>,
}

#[derive(Debug)]
struct PendingSet {
    total: u32,
    parts: BTreeMap<u32, Envelope>,
}

impl PendingSet {
    fn is_complete(&self) -> bool {
        self.parts.len() == self.total as usize
    }

    fn missing(&self) -> Vec<u32> {
        (0..self.total)
            .filter(|i| !self.parts.contains_key(i))
            .collect()
    }
}

impl ChunkCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a part.
    ///
    /// Returns the complete, ordered set once every part is present.
    pub fn add(&mut self, part: Envelope) -> Result<Option<Vec<Envelope>>> {
        let (message_id, position) = part_identity(&part)?;

        let set = self
            .pending
            .entry(message_id.clone())
            .or_insert_with(|| PendingSet {
                total: position.total,
                parts: BTreeMap::new(),
            });

        if set.total != position.total {
            return Err(EnvelopeError::EnvelopeValidation(format!(
                "part {position} disagrees with chunk set {message_id} of {} parts",
                set.total
            )));
        }
        if let Some(existing) = set.parts.get(&position.index) {
            if *existing != part {
                return Err(EnvelopeError::EnvelopeValidation(format!(
                    "conflicting copies of part {position} in chunk set {message_id}"
                )));
            }
            tracing::trace!(%message_id, %position, "duplicate part ignored");
            return Ok(None);
        }
        set.parts.insert(position.index, part);

        if !set.is_complete() {
            return Ok(None);
        }
        Ok(self
            .pending
            .remove(&message_id)
            .map(|set| set.parts.into_values().collect()))
    }

    /// Indices still missing from a pending set.
    pub fn missing(&self, message_id: &MessageId) -> Option<Vec<u32>> {
        self.pending.get(message_id).map(PendingSet::missing)
    }

    /// Number of incomplete sets.
    pub fn pending_sets(&self) -> usize {
        self.pending.len()
    }

    /// Ids of the incomplete sets, in no particular order.
    pub fn pending_ids(&self) -> impl Iterator<Item = &MessageId> + '_ {
        self.pending.keys()
    }

    /// Keep only the pending sets for which `keep(message_id, received, total)`
    /// returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&MessageId, usize, u32) -> bool) {
        self.pending.retain(|id, set| {
            let kept = keep(id, set.parts.len(), set.total);
            if !kept {
                tracing::debug!(message_id = %id, received = set.parts.len(), total = set.total, "pending chunk set evicted");
            }
            kept
        });
    }

    /// Drop a pending set, returning the parts collected so far.
    pub fn discard(&mut self, message_id: &MessageId) -> Option<Vec<Envelope>> {
        self.pending
            .remove(message_id)
            .map(|set| set.parts.into_values().collect())
    }
}
