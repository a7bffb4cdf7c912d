//! Deterministic test vectors.
//!
//! Each vector fixes the content, encryption mode, limit, and RNG seed, so
//! the factory produces byte-identical envelopes on every run. Expected
//! values left empty are reported rather than checked.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use postfiat_envelope::{EnvelopeFactory, EnvelopeOutput, EnvelopeRequest, Result};
use postfiat_envelope_core::{ContentHash, EncryptionMode};
use postfiat_envelope_perms::X25519StaticSecret;

/// Secret of the recipient every encrypted vector is addressed to.
pub const RECIPIENT_SEED: [u8; 32] = [0x42; 32];

/// Secret of the sender used for `Protected` vectors.
pub const SENDER_SEED: [u8; 32] = [0x17; 32];

/// A deterministic test vector.
#[derive(Debug, Clone)]
pub struct EnvelopeVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Plaintext content.
    pub content: &'static [u8],
    /// Encryption mode.
    pub mode: EncryptionMode,
    /// Byte limit.
    pub limit: usize,
    /// Seed for the factory's RNG.
    pub rng_seed: u64,
    /// Expected number of envelopes, if pinned.
    pub expected_envelopes: Option<usize>,
    /// Expected plaintext hash (hex).
    pub expected_content_hash: &'static str,
}

static LONG_TEXT: [u8; 3000] = [b'x'; 3000];

/// Get all test vectors.
pub fn all_vectors() -> Vec<EnvelopeVector> {
    vec![
        EnvelopeVector {
            name: "empty plaintext inline",
            content: b"",
            mode: EncryptionMode::None,
            limit: 1000,
            rng_seed: 1,
            expected_envelopes: Some(1),
            expected_content_hash:
                "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262",
        },
        EnvelopeVector {
            name: "short text for one recipient",
            content: b"hello bob",
            mode: EncryptionMode::PublicKey,
            limit: 1000,
            rng_seed: 2,
            expected_envelopes: Some(1),
            expected_content_hash: "",
        },
        EnvelopeVector {
            name: "protected text between two parties",
            content: b"the meeting moved to thursday",
            mode: EncryptionMode::Protected,
            limit: 1000,
            rng_seed: 3,
            expected_envelopes: Some(1),
            expected_content_hash: "",
        },
        EnvelopeVector {
            name: "long text split into parts",
            content: &LONG_TEXT,
            mode: EncryptionMode::PublicKey,
            limit: 1000,
            rng_seed: 4,
            expected_envelopes: None,
            expected_content_hash: "",
        },
    ]
}

/// Run the factory (no external storage) for a vector.
pub async fn generate_from_vector(vector: &EnvelopeVector) -> Result<EnvelopeOutput> {
    let recipient = X25519StaticSecret::from_bytes(RECIPIENT_SEED).public_key();
    let sender = X25519StaticSecret::from_bytes(SENDER_SEED);

    let mut request = EnvelopeRequest::new(vector.content, vector.mode, vector.limit);
    if vector.mode.is_encrypted() {
        request = request.recipient(recipient);
    }
    if vector.mode == EncryptionMode::Protected {
        request = request.sender(&sender);
    }

    let mut rng = StdRng::seed_from_u64(vector.rng_seed);
    EnvelopeFactory::default()
        .create_envelope(request, &mut rng)
        .await
}

/// Check every vector's envelope count and content hash.
///
/// Returns `(name, matches, content hash hex)` per vector.
pub async fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let mut results = Vec::new();
    for vector in all_vectors() {
        let hex = ContentHash::hash(vector.content).to_hex();
        let matches = match generate_from_vector(&vector).await {
            Ok(output) => {
                vector
                    .expected_envelopes
                    .map_or(true, |n| output.envelopes().len() == n)
                    && (vector.expected_content_hash.is_empty()
                        || hex == vector.expected_content_hash)
            }
            Err(_) => false,
        };
        results.push((vector.name.to_string(), matches, hex));
    }
    results
}

/// The observable outputs of one vector, for cross-implementation checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorReport {
    pub name: String,
    pub content: String,      // hex
    pub content_hash: String, // hex
    pub encoded_len: Vec<usize>,
    pub envelope_ids: Vec<String>, // hex, in part order
}

/// Run every vector and collect its report.
pub async fn vector_reports() -> Result<Vec<VectorReport>> {
    let mut reports = Vec::new();
    for vector in all_vectors() {
        let output = generate_from_vector(&vector).await?;
        reports.push(VectorReport {
            name: vector.name.to_string(),
            content: hex::encode(vector.content),
            content_hash: ContentHash::hash(vector.content).to_hex(),
            encoded_len: output.envelopes().iter().map(|e| e.encoded_len()).collect(),
            envelope_ids: output
                .envelopes()
                .iter()
                .map(|e| hex::encode(e.compute_id().0))
                .collect(),
        });
    }
    Ok(reports)
}

/// Reports for every vector as pretty-printed JSON.
pub async fn export_vectors_json() -> Result<String> {
    let reports = vector_reports().await?;
    serde_json::to_string_pretty(&reports)
        .map_err(|e| postfiat_envelope::EnvelopeError::EnvelopeValidation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use postfiat_envelope::reconstruct_content_from_chunks;
    use postfiat_envelope_perms::Keyring;

    #[tokio::test]
    async fn test_vectors_are_deterministic() {
        // Generate each vector twice, verify identical results
        for vector in all_vectors() {
            let first = generate_from_vector(&vector).await.unwrap();
            let second = generate_from_vector(&vector).await.unwrap();

            let ids = |o: &EnvelopeOutput| {
                o.envelopes()
                    .iter()
                    .map(|e| e.compute_id())
                    .collect::<Vec<_>>()
            };
            assert_eq!(
                ids(&first),
                ids(&second),
                "Vector '{}' produced different ids on regeneration",
                vector.name
            );
        }
    }

    #[tokio::test]
    async fn test_all_vectors_verify() {
        for (name, matches, hex) in verify_all_vectors().await {
            assert!(matches, "Vector '{name}' failed (content hash {hex})");
        }
    }

    #[tokio::test]
    async fn test_different_seeds_different_ids() {
        let mut vector = all_vectors().remove(1);
        let first = generate_from_vector(&vector).await.unwrap();
        vector.rng_seed += 1;
        let second = generate_from_vector(&vector).await.unwrap();

        assert_ne!(
            first.envelopes()[0].compute_id(),
            second.envelopes()[0].compute_id()
        );
        assert_eq!(first.content_hash(), second.content_hash());
    }

    #[tokio::test]
    async fn test_exported_json_parses_back() {
        let json = export_vectors_json().await.unwrap();
        let reports: Vec<VectorReport> = serde_json::from_str(&json).unwrap();

        assert_eq!(reports.len(), all_vectors().len());
        assert_eq!(reports, vector_reports().await.unwrap());
        assert_eq!(reports[0].content, "");
        for report in &reports {
            assert_eq!(report.encoded_len.len(), report.envelope_ids.len());
        }
    }

    #[tokio::test]
    async fn test_long_vector_reassembles() {
        let vector = all_vectors().remove(3);
        let output = generate_from_vector(&vector).await.unwrap();
        assert!(output.is_multipart());

        let keyring = Keyring::new().with_secret(X25519StaticSecret::from_bytes(RECIPIENT_SEED));
        let content = reconstruct_content_from_chunks(output.envelopes(), &keyring).unwrap();
        assert_eq!(content, vector.content);
    }
}
