//! Splitting sealed content into multipart envelopes.
//!
//! Every part carries the same grants, content hash, and references as the
//! single envelope it replaces, plus `message_id` and `multipart` metadata.
//! Only the payload slice differs. That makes the per-part overhead a fixed
//! quantity, measured once on a template part whose position text is as wide
//! as any real position can be.

use postfiat_envelope_core::{cbor_header_len, Envelope, EnvelopeBuilder, MessageId, PartPosition};

use crate::error::{EnvelopeError, Result};

/// How sealed content is divided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Maximum payload bytes per part.
    pub capacity: usize,
    /// Number of parts.
    pub total: u32,
}

/// Work out the per-part capacity and part count.
///
/// `template` is the builder every part is derived from (grants, hash,
/// references already set, payload not yet set). Fails with
/// [`EnvelopeError::EnvelopeValidation`] when the fixed overhead leaves no
/// room for even one payload byte, or when more than `max_parts` parts would
/// be needed.
pub fn plan_chunks(
    template: &EnvelopeBuilder,
    message_id: &MessageId,
    content_len: usize,
    limit: usize,
    max_parts: Option<u32>,
) -> Result<ChunkPlan> {
    // Position text width is bounded by the digit count of `total`; grow the
    // assumed width until the resulting part count fits in it.
    let mut digits: u32 = 1;
    loop {
        let widest = widest_total(digits);
        let capacity = part_capacity(template, message_id, widest, limit)?;
        let total = content_len.div_ceil(capacity).max(1);

        if total <= widest as usize {
            // `total <= widest <= u32::MAX`, so the cast is lossless.
            let total = total as u32;
            if let Some(max) = max_parts {
                if total > max {
                    return Err(EnvelopeError::EnvelopeValidation(format!(
                        "content of {content_len} bytes needs {total} parts, more than the configured maximum of {max}"
                    )));
                }
            }
            return Ok(ChunkPlan { capacity, total });
        }

        if widest == u32::MAX {
            return Err(EnvelopeError::EnvelopeValidation(format!(
                "content of {content_len} bytes needs more than {} parts",
                u32::MAX
            )));
        }
        digits += 1;
    }
}

/// Build the parts for a plan.
///
/// Every part is checked against `limit` after encoding.
pub fn build_parts(
    template: &EnvelopeBuilder,
    message_id: &MessageId,
    sealed: &[u8],
    plan: ChunkPlan,
    limit: usize,
) -> Result<Vec<Envelope>> {
    let mut parts = Vec::with_capacity(plan.total as usize);
    let slices: Vec<&[u8]> = if sealed.is_empty() {
        vec![sealed]
    } else {
        sealed.chunks(plan.capacity).collect()
    };

    for (index, slice) in (0u32..).zip(slices) {
        let position = PartPosition::new(index, plan.total)?;
        let part = template
            .clone()
            .part_of(message_id, position)
            .payload(slice.to_vec())
            .build();

        let size = part.encoded_len();
        if size > limit {
            return Err(EnvelopeError::EnvelopeValidation(format!(
                "part {position} encodes to {size} bytes, over the limit of {limit}"
            )));
        }
        parts.push(part);
    }

    Ok(parts)
}

/// Largest total with the given number of decimal digits, capped at `u32::MAX`.
fn widest_total(digits: u32) -> u32 {
    10u64
        .checked_pow(digits)
        .map(|n| n - 1)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(u32::MAX)
}

/// Payload bytes that fit next to the overhead of a part whose position text
/// is `widest/widest`.
fn part_capacity(
    template: &EnvelopeBuilder,
    message_id: &MessageId,
    widest: u32,
    limit: usize,
) -> Result<usize> {
    let position = PartPosition::new(widest - 1, widest)?;
    let empty = template
        .clone()
        .part_of(message_id, position)
        .payload(Vec::new())
        .build();

    // An empty byte string encodes as a single header byte.
    let overhead = empty.encoded_len() - 1;
    let budget = limit.saturating_sub(overhead);
    let capacity = budget.saturating_sub(cbor_header_len(budget as u64));

    if capacity == 0 {
        return Err(EnvelopeError::EnvelopeValidation(format!(
            "envelope overhead of {overhead} bytes leaves no room for payload within a limit of {limit} bytes"
        )));
    }
    Ok(capacity)
}
