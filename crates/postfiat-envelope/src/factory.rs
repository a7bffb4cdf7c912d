//! The envelope factory: content in, envelopes out.
//!
//! The factory hashes and seals content, wraps the content key for every
//! target, and then picks the smallest representation that respects the
//! caller's byte limit:
//!
//! 1. a single inline envelope,
//! 2. an envelope pointing at externally stored content,
//! 3. a set of multipart envelopes.

use std::sync::Arc;

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use postfiat_envelope_core::{
    ContentDescriptor, ContentHash, ContextReference, EncryptionMode, Envelope, EnvelopeBuilder,
    EnvelopeId, MessageId, X25519PublicKey,
};
use postfiat_envelope_perms::{
    build_grants, derive_content_key, seal_content, AccessTarget, X25519StaticSecret,
};
use postfiat_envelope_store::{ContentStorage, StoreRequest};

use crate::chunking::{build_parts, plan_chunks};
use crate::error::{EnvelopeError, Result};

/// Configuration for the factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// Content type recorded when a request does not name one.
    pub default_content_type: String,
    /// Try external storage before chunking.
    pub prefer_external: bool,
    /// Upper bound on parts per chunk set.
    pub max_parts: Option<u32>,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            default_content_type: "text/plain".into(),
            prefer_external: true,
            max_parts: None,
        }
    }
}

/// Everything needed to turn one piece of content into envelopes.
#[derive(Debug, Clone)]
pub struct EnvelopeRequest<'a> {
    content: &'a [u8],
    mode: EncryptionMode,
    limit_bytes: usize,
    sender: Option<&'a X25519StaticSecret>,
    recipient: Option<X25519PublicKey>,
    targets: Vec<AccessTarget>,
    reply_to: Option<EnvelopeId>,
    context_refs: Vec<ContextReference>,
    content_type: Option<String>,
}

impl<'a> EnvelopeRequest<'a> {
    /// Start a request for `content` under `mode`, limited to `limit_bytes`
    /// of encoded envelope.
    pub fn new(content: &'a [u8], mode: EncryptionMode, limit_bytes: usize) -> Self {
        Self {
            content,
            mode,
            limit_bytes,
            sender: None,
            recipient: None,
            targets: Vec::new(),
            reply_to: None,
            context_refs: Vec::new(),
            content_type: None,
        }
    }

    /// Set the sender's secret (required for `Protected` mode).
    pub fn sender(mut self, secret: &'a X25519StaticSecret) -> Self {
        self.sender = Some(secret);
        self
    }

    /// Set the primary recipient.
    pub fn recipient(mut self, public_key: X25519PublicKey) -> Self {
        self.recipient = Some(public_key);
        self
    }

    /// Add an extra recipient or group.
    pub fn target(mut self, target: impl Into<AccessTarget>) -> Self {
        self.targets.push(target.into());
        self
    }

    /// Reply to an earlier envelope.
    pub fn reply_to(mut self, target: EnvelopeId) -> Self {
        self.reply_to = Some(target);
        self
    }

    /// Add a context reference.
    pub fn context_ref(mut self, reference: ContextReference) -> Self {
        self.context_refs.push(reference);
        self
    }

    /// Set the MIME type of the content.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    fn access_targets(&self) -> Vec<AccessTarget> {
        self.recipient
            .map(AccessTarget::Recipient)
            .into_iter()
            .chain(self.targets.iter().cloned())
            .collect()
    }
}

/// What the factory produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeOutput {
    /// Content fits inline.
    Single(Envelope),
    /// Content lives in external storage.
    External {
        envelope: Envelope,
        descriptor: ContentDescriptor,
    },
    /// Content is split across parts, in index order.
    Multipart(Vec<Envelope>),
}

impl EnvelopeOutput {
    /// The produced envelopes, in order.
    pub fn envelopes(&self) -> &[Envelope] {
        match self {
            EnvelopeOutput::Single(envelope) | EnvelopeOutput::External { envelope, .. } => {
                std::slice::from_ref(envelope)
            }
            EnvelopeOutput::Multipart(parts) => parts,
        }
    }

    /// Take the produced envelopes, in order.
    pub fn into_envelopes(self) -> Vec<Envelope> {
        match self {
            EnvelopeOutput::Single(envelope) | EnvelopeOutput::External { envelope, .. } => {
                vec![envelope]
            }
            EnvelopeOutput::Multipart(parts) => parts,
        }
    }

    /// Hash of the original content.
    pub fn content_hash(&self) -> Option<&ContentHash> {
        self.envelopes().first().map(Envelope::content_hash)
    }

    /// Whether the content was chunked.
    pub fn is_multipart(&self) -> bool {
        matches!(self, EnvelopeOutput::Multipart(_))
    }
}

/// Creates envelopes.
///
/// Holds an immutable configuration and an optional storage backend;
/// `create_envelope` may run concurrently from many tasks.
#[derive(Clone, Default)]
pub struct EnvelopeFactory {
    config: FactoryConfig,
    storage: Option<Arc<dyn ContentStorage>>,
}

impl EnvelopeFactory {
    /// Create a factory without external storage.
    pub fn new(config: FactoryConfig) -> Self {
        Self {
            config,
            storage: None,
        }
    }

    /// Attach a storage backend for oversized content.
    pub fn with_storage(mut self, storage: Arc<dyn ContentStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// The configuration.
    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// The storage backend, if any.
    pub fn storage(&self) -> Option<&Arc<dyn ContentStorage>> {
        self.storage.as_ref()
    }

    /// Turn content into one or more envelopes.
    ///
    /// Performs at most one storage write.
    pub async fn create_envelope<R: RngCore + CryptoRng>(
        &self,
        request: EnvelopeRequest<'_>,
        rng: &mut R,
    ) -> Result<EnvelopeOutput> {
        let mode = request.mode;
        let limit = request.limit_bytes;
        let targets = request.access_targets();

        if mode.is_encrypted() && targets.is_empty() {
            return Err(EnvelopeError::EnvelopeValidation(format!(
                "{mode:?} mode requires a recipient or group"
            )));
        }
        if mode == EncryptionMode::Protected && request.sender.is_none() {
            return Err(EnvelopeError::EnvelopeValidation(
                "protected mode requires the sender's secret key".into(),
            ));
        }

        // 1-2. Hash, seal, and wrap. All randomness is drawn up front.
        let content_hash = ContentHash::hash(request.content);
        let content_key = mode.is_encrypted().then(|| derive_content_key(rng));
        let sealed = seal_content(request.content, mode, content_key.as_ref(), rng)?;
        let grants = match &content_key {
            Some(key) => build_grants(key, mode, request.sender, &targets, rng)?,
            None => Vec::new(),
        };
        let message_id = MessageId::generate(rng);

        let template = EnvelopeBuilder::new(content_hash, mode)
            .reply_to(request.reply_to)
            .context_refs(request.context_refs.clone())
            .grants(grants);

        // 3. Inline.
        let inline = template.clone().payload(sealed.clone()).build();
        let inline_len = inline.encoded_len();
        if inline_len <= limit {
            tracing::debug!(size = inline_len, limit, "envelope fits inline");
            return Ok(EnvelopeOutput::Single(inline));
        }

        // 4. External storage.
        let content_type = request
            .content_type
            .as_deref()
            .unwrap_or(&self.config.default_content_type);
        if let Some(storage) = self.external_candidate(&template, &sealed, content_type, limit) {
            let descriptor = storage
                .store(StoreRequest::new(content_hash, content_type, &sealed))
                .await?;
            let envelope = template
                .clone()
                .descriptor(Some(descriptor.clone()))
                .build();

            let size = envelope.encoded_len();
            if size <= limit {
                tracing::debug!(
                    size,
                    limit,
                    stored = sealed.len(),
                    backend = storage.name(),
                    uri = %descriptor.uri,
                    "content stored externally"
                );
                return Ok(EnvelopeOutput::External {
                    envelope,
                    descriptor,
                });
            }
            tracing::warn!(
                size,
                limit,
                uri = %descriptor.uri,
                "descriptor envelope exceeds limit, falling back to chunking"
            );
        }

        // 5-6. Chunking.
        let plan = plan_chunks(
            &template,
            &message_id,
            sealed.len(),
            limit,
            self.config.max_parts,
        )?;
        let parts = build_parts(&template, &message_id, &sealed, plan, limit)?;
        tracing::debug!(
            parts = parts.len(),
            capacity = plan.capacity,
            sealed = sealed.len(),
            limit,
            message_id = %message_id,
            "content split into multipart envelopes"
        );
        Ok(EnvelopeOutput::Multipart(parts))
    }

    /// The storage backend to try, if external storage is enabled, can take
    /// the content, and the limit leaves room for more than the bare envelope.
    fn external_candidate(
        &self,
        template: &EnvelopeBuilder,
        sealed: &[u8],
        content_type: &str,
        limit: usize,
    ) -> Option<&Arc<dyn ContentStorage>> {
        if !self.config.prefer_external {
            return None;
        }
        let storage = self.storage.as_ref()?;
        if !storage.can_handle(sealed.len() as u64, content_type) {
            tracing::debug!(
                backend = storage.name(),
                size = sealed.len(),
                "storage backend declined content"
            );
            return None;
        }
        let bare = template.clone().build().encoded_len();
        (bare < limit).then_some(storage)
    }
}
