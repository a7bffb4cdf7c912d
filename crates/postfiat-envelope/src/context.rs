//! Context DAG navigation.
//!
//! Envelopes point at earlier envelopes through `reply_to` and context
//! references. [`ContextGraph`] holds a set of envelopes and walks those edges
//! from a root back to its ancestors. Parts of a chunk set are treated as a
//! single node, so a reference to any one part pulls in the whole set.

use std::collections::{HashMap, HashSet};

use postfiat_envelope_core::{ContentHash, Envelope, EnvelopeId, EnvelopeKind, MessageId};
use postfiat_envelope_perms::Keyring;
use postfiat_envelope_store::ContentStorage;

use crate::error::{EnvelopeError, Result};
use crate::reassembly::{open_envelope, reconstruct_content_from_chunks};

/// One ancestor found by [`ContextGraph::ancestors`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ancestor {
    /// A single inline or external envelope.
    Envelope(EnvelopeId),
    /// Every known part of a chunk set, ordered by index.
    ChunkSet {
        message_id: MessageId,
        parts: Vec<EnvelopeId>,
    },
    /// A referenced envelope the graph does not hold.
    Missing(EnvelopeId),
    /// A reference back to an envelope still on the current path. The walk
    /// skips that edge and carries on with the remaining branches.
    Cycle(EnvelopeId),
}

/// The outcome of opening one ancestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextEntry {
    Resolved {
        id: EnvelopeId,
        content_hash: ContentHash,
        content: Vec<u8>,
    },
    /// The reader holds no key material for this ancestor.
    Inaccessible { id: EnvelopeId, reason: String },
    /// A chunk set with parts still outstanding.
    Incomplete {
        id: EnvelopeId,
        message_id: MessageId,
        missing: Vec<u32>,
        total: u32,
    },
    Missing { id: EnvelopeId },
    /// A reference that closes a loop; `id` is the envelope it points back to.
    Cyclic { id: EnvelopeId },
}

impl ContextEntry {
    /// The envelope id this entry is reported under.
    pub fn id(&self) -> &EnvelopeId {
        match self {
            ContextEntry::Resolved { id, .. }
            | ContextEntry::Inaccessible { id, .. }
            | ContextEntry::Incomplete { id, .. }
            | ContextEntry::Missing { id }
            | ContextEntry::Cyclic { id } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Node {
    Single(usize),
    Set(MessageId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnPath,
    Done,
}

struct Frame {
    node: Node,
    edges: Vec<EnvelopeId>,
    next: usize,
}

/// An arena of envelopes indexed by id.
#[derive(Debug, Default)]
pub struct ContextGraph {
    envelopes: Vec<Envelope>,
    ids: Vec<EnvelopeId>,
    index: HashMap<EnvelopeId, usize>,
    chunk_sets: HashMap<MessageId, Vec<usize>>,
}

impl ContextGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an envelope under its content-addressed id.
    pub fn insert(&mut self, envelope: Envelope) -> EnvelopeId {
        let id = envelope.compute_id();
        self.insert_as(id, envelope);
        id
    }

    /// Add an envelope under an id assigned elsewhere, such as a ledger
    /// transaction hash.
    ///
    /// Returns `false` and leaves the graph unchanged if `id` is taken.
    pub fn insert_as(&mut self, id: EnvelopeId, envelope: Envelope) -> bool {
        if self.index.contains_key(&id) {
            return false;
        }
        let slot = self.envelopes.len();
        if let Some(message_id) = chunk_set_of(&envelope) {
            self.chunk_sets.entry(message_id).or_default().push(slot);
        }
        self.envelopes.push(envelope);
        self.ids.push(id);
        self.index.insert(id, slot);
        true
    }

    pub fn get(&self, id: &EnvelopeId) -> Option<&Envelope> {
        self.index.get(id).map(|&slot| &self.envelopes[slot])
    }

    pub fn contains(&self, id: &EnvelopeId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    /// Known parts of a chunk set, ordered by index.
    pub fn chunk_set(&self, message_id: &MessageId) -> Vec<&Envelope> {
        self.chunk_set_slots(message_id)
            .into_iter()
            .map(|slot| &self.envelopes[slot])
            .collect()
    }

    /// Ancestors of `root` in post-order: every ancestor appears after all of
    /// its own ancestors. The root itself is not included.
    ///
    /// A reference leading back to an envelope still on the current path is
    /// reported as [`Ancestor::Cycle`] and not followed; the rest of the graph
    /// is still walked. Use [`check_acyclic`](Self::check_acyclic) to turn
    /// the first such reference into an error.
    pub fn ancestors(&self, root: &EnvelopeId) -> Result<Vec<Ancestor>> {
        let root_node = self
            .node(root)
            .ok_or(EnvelopeError::UnknownEnvelope(*root))?;

        let mut marks: HashMap<Node, Mark> = HashMap::new();
        let mut missing: HashSet<EnvelopeId> = HashSet::new();
        let mut looped: HashSet<EnvelopeId> = HashSet::new();
        let mut out = Vec::new();

        marks.insert(root_node.clone(), Mark::OnPath);
        let mut stack = vec![Frame {
            edges: self.edges(&root_node),
            node: root_node.clone(),
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let Some(target) = frame.edges.get(frame.next).copied() else {
                if let Some(done) = stack.pop() {
                    marks.insert(done.node.clone(), Mark::Done);
                    if done.node != root_node {
                        out.push(self.ancestor(&done.node));
                    }
                }
                continue;
            };
            frame.next += 1;

            let Some(node) = self.node(&target) else {
                if missing.insert(target) {
                    out.push(Ancestor::Missing(target));
                }
                continue;
            };

            match marks.get(&node) {
                Some(Mark::OnPath) => {
                    tracing::warn!(envelope = %target, "cyclic context reference, branch skipped");
                    if looped.insert(target) {
                        out.push(Ancestor::Cycle(target));
                    }
                }
                Some(Mark::Done) => {}
                None => {
                    marks.insert(node.clone(), Mark::OnPath);
                    stack.push(Frame {
                        edges: self.edges(&node),
                        node,
                        next: 0,
                    });
                }
            }
        }

        Ok(out)
    }

    /// Fails with [`EnvelopeError::CyclicContext`] naming the first envelope
    /// that a reference below `root` loops back to.
    pub fn check_acyclic(&self, root: &EnvelopeId) -> Result<()> {
        match self
            .ancestors(root)?
            .into_iter()
            .find_map(|a| match a {
                Ancestor::Cycle(envelope) => Some(envelope),
                _ => None,
            }) {
            Some(envelope) => Err(EnvelopeError::CyclicContext { envelope }),
            None => Ok(()),
        }
    }

    fn node(&self, id: &EnvelopeId) -> Option<Node> {
        let slot = *self.index.get(id)?;
        Some(match chunk_set_of(&self.envelopes[slot]) {
            Some(message_id) => Node::Set(message_id),
            None => Node::Single(slot),
        })
    }

    /// Outgoing references; a chunk set's edges are the union over its parts.
    fn edges(&self, node: &Node) -> Vec<EnvelopeId> {
        match node {
            Node::Single(slot) => self.envelopes[*slot].references().copied().collect(),
            Node::Set(message_id) => {
                let mut seen = HashSet::new();
                self.chunk_set_slots(message_id)
                    .into_iter()
                    .flat_map(|slot| self.envelopes[slot].references().copied())
                    .filter(|id| seen.insert(*id))
                    .collect()
            }
        }
    }

    fn ancestor(&self, node: &Node) -> Ancestor {
        match node {
            Node::Single(slot) => Ancestor::Envelope(self.ids[*slot]),
            Node::Set(message_id) => Ancestor::ChunkSet {
                message_id: message_id.clone(),
                parts: self
                    .chunk_set_slots(message_id)
                    .into_iter()
                    .map(|slot| self.ids[slot])
                    .collect(),
            },
        }
    }

    fn chunk_set_slots(&self, message_id: &MessageId) -> Vec<usize> {
        let mut slots = self.chunk_sets.get(message_id).cloned().unwrap_or_default();
        slots.sort_by_key(|&slot| part_index(&self.envelopes[slot]));
        slots
    }
}

impl Extend<Envelope> for ContextGraph {
    fn extend<I: IntoIterator<Item = Envelope>>(&mut self, iter: I) {
        for envelope in iter {
            self.insert(envelope);
        }
    }
}

fn chunk_set_of(envelope: &Envelope) -> Option<MessageId> {
    if envelope.kind() != EnvelopeKind::MultipartPart {
        return None;
    }
    envelope.message_id()?.ok()
}

fn part_index(envelope: &Envelope) -> u32 {
    envelope
        .position()
        .and_then(|p| p.ok())
        .map_or(u32::MAX, |p| p.index)
}

/// Open every ancestor of `root`, oldest first.
///
/// Ancestors whose grants the reader cannot resolve, chunk sets with missing
/// parts, and references that loop back are reported as entries rather than
/// failing the walk. Payload decryption, integrity, and storage failures on
/// content the reader does hold a key for are returned as errors.
pub async fn resolve_context(
    graph: &ContextGraph,
    root: &EnvelopeId,
    keyring: &Keyring,
    storage: Option<&dyn ContentStorage>,
) -> Result<Vec<ContextEntry>> {
    let ancestors = graph.ancestors(root)?;
    let mut entries = Vec::with_capacity(ancestors.len());

    for ancestor in ancestors {
        let entry = match ancestor {
            Ancestor::Missing(id) => ContextEntry::Missing { id },
            Ancestor::Cycle(id) => ContextEntry::Cyclic { id },
            Ancestor::Envelope(id) => {
                let envelope = graph.get(&id).ok_or(EnvelopeError::UnknownEnvelope(id))?;
                let opened = open_envelope(envelope, keyring, storage).await;
                classify(id, *envelope.content_hash(), opened)?
            }
            Ancestor::ChunkSet { message_id, parts } => {
                let envelopes: Vec<Envelope> = graph
                    .chunk_set(&message_id)
                    .into_iter()
                    .cloned()
                    .collect();
                let first = envelopes.first().ok_or_else(|| {
                    EnvelopeError::EnvelopeValidation(format!("empty chunk set {message_id}"))
                })?;
                let id = parts.first().copied().unwrap_or_else(|| first.compute_id());
                let content_hash = *first.content_hash();
                classify(
                    id,
                    content_hash,
                    reconstruct_content_from_chunks(&envelopes, keyring),
                )?
            }
        };
        entries.push(entry);
    }

    tracing::debug!(root = %root, entries = entries.len(), "context resolved");
    Ok(entries)
}

fn classify(
    id: EnvelopeId,
    content_hash: ContentHash,
    opened: Result<Vec<u8>>,
) -> Result<ContextEntry> {
    match opened {
        Ok(content) => Ok(ContextEntry::Resolved {
            id,
            content_hash,
            content,
        }),
        Err(e) if e.is_inaccessible() => {
            tracing::debug!(envelope = %id, error = %e, "ancestor inaccessible");
            Ok(ContextEntry::Inaccessible {
                id,
                reason: e.to_string(),
            })
        }
        Err(EnvelopeError::ChunkMissing {
            message_id,
            missing,
            total,
        }) => Ok(ContextEntry::Incomplete {
            id,
            message_id,
            missing,
            total,
        }),
        Err(e) => Err(e),
    }
}
