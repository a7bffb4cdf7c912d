//! Proptest generators for property-based testing.

use proptest::prelude::*;

use postfiat_envelope_core::{
    ContentHash, ContextReference, EncryptionMode, Envelope, EnvelopeBuilder, EnvelopeId,
};

/// Generate a random EnvelopeId.
pub fn envelope_id() -> impl Strategy<Value = EnvelopeId> {
    any::<[u8; 32]>().prop_map(EnvelopeId)
}

/// Generate a random ContentHash.
pub fn content_hash() -> impl Strategy<Value = ContentHash> {
    any::<[u8; 32]>().prop_map(ContentHash)
}

/// Generate an encryption mode.
pub fn encryption_mode() -> impl Strategy<Value = EncryptionMode> {
    prop_oneof![
        Just(EncryptionMode::None),
        Just(EncryptionMode::Protected),
        Just(EncryptionMode::PublicKey),
    ]
}

/// Generate an encrypting mode (everything but `None`).
pub fn encrypted_mode() -> impl Strategy<Value = EncryptionMode> {
    prop_oneof![Just(EncryptionMode::Protected), Just(EncryptionMode::PublicKey)]
}

/// Generate content bytes of at most `max_len`.
pub fn content(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a byte limit large enough for a part carrying a few payload bytes.
pub fn limit() -> impl Strategy<Value = usize> {
    700usize..=4096
}

/// Generate a content type.
pub fn content_type() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("text/plain".to_string()),
        Just("application/json".to_string()),
        "[a-z]{1,8}/[a-z0-9.+-]{1,16}",
    ]
}

/// Parameters for an unencrypted, structurally valid envelope.
#[derive(Debug, Clone)]
pub struct EnvelopeParams {
    pub content: Vec<u8>,
    pub content_type: String,
    pub reply_to: Option<EnvelopeId>,
    pub context: Vec<EnvelopeId>,
}

impl Arbitrary for EnvelopeParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            content(512),
            content_type(),
            proptest::option::of(envelope_id()),
            prop::collection::vec(envelope_id(), 0..4),
        )
            .prop_map(|(content, content_type, reply_to, context)| EnvelopeParams {
                content,
                content_type,
                reply_to,
                context,
            })
            .boxed()
    }
}

/// Build an envelope from parameters.
pub fn envelope_from_params(params: &EnvelopeParams) -> Envelope {
    params
        .context
        .iter()
        .fold(
            EnvelopeBuilder::new(ContentHash::hash(&params.content), EncryptionMode::None),
            |builder, id| builder.context_ref(ContextReference::extends(*id)),
        )
        .reply_to(params.reply_to)
        .metadata("content_type", params.content_type.clone())
        .payload(params.content.clone())
        .build()
}

/// Parameters for a factory request.
#[derive(Debug, Clone)]
pub struct RequestParams {
    pub content: Vec<u8>,
    pub mode: EncryptionMode,
    pub limit: usize,
    pub seed: u64,
}

impl Arbitrary for RequestParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (content(6000), encryption_mode(), limit(), any::<u64>())
            .prop_map(|(content, mode, limit, seed)| RequestParams {
                content,
                mode,
                limit,
                seed,
            })
            .boxed()
    }
}
