//! Envelope validation: structural checks independent of key material.

use crate::envelope::{
    EncryptionMode, Envelope, EnvelopeKind, ENVELOPE_VERSION, META_MESSAGE_ID, META_MULTIPART,
};
use crate::error::ValidationError;

/// Validate an envelope's structure.
///
/// This performs:
/// - Version check
/// - Chunk metadata rules for each envelope kind
/// - Descriptor/content hash agreement and empty inline payload for external content
/// - Grant presence rules per encryption mode
/// - Grant kind / target agreement
pub fn validate_envelope(envelope: &Envelope) -> Result<(), ValidationError> {
    // 1. Version
    if envelope.version() != ENVELOPE_VERSION {
        return Err(ValidationError::UnsupportedVersion(envelope.version()));
    }

    // 2. Chunk metadata
    match envelope.kind() {
        EnvelopeKind::MultipartPart => {
            envelope
                .message_id()
                .ok_or(ValidationError::MissingMetadata(META_MESSAGE_ID))??;
            envelope
                .position()
                .ok_or(ValidationError::MissingMetadata(META_MULTIPART))??;
            if envelope.is_external() {
                return Err(ValidationError::StructuralError(
                    "multipart part cannot reference external content".into(),
                ));
            }
        }
        EnvelopeKind::Core => {
            let meta = envelope.metadata();
            if meta.contains_key(META_MESSAGE_ID) || meta.contains_key(META_MULTIPART) {
                return Err(ValidationError::UnexpectedChunkMetadata);
            }
        }
    }

    // 3. External content
    if let Some(descriptor) = envelope.descriptor() {
        if descriptor.content_hash != *envelope.content_hash() {
            return Err(ValidationError::DescriptorHashMismatch {
                envelope: *envelope.content_hash(),
                descriptor: descriptor.content_hash,
            });
        }
        if !envelope.payload().is_empty() {
            return Err(ValidationError::ExternalWithPayload);
        }
    }

    // 4. Grants vs mode
    match envelope.encryption() {
        EncryptionMode::None if !envelope.grants().is_empty() => {
            return Err(ValidationError::GrantsOnPlaintext(envelope.grants().len()));
        }
        EncryptionMode::Protected | EncryptionMode::PublicKey if envelope.grants().is_empty() => {
            return Err(ValidationError::MissingGrants);
        }
        _ => {}
    }

    // 5. Grant kinds
    if envelope
        .grants()
        .iter()
        .any(|g| g.kind != g.target.grant_kind())
    {
        return Err(ValidationError::GrantKindMismatch);
    }

    Ok(())
}
