//! Worked scenarios across the factory, storage backends, and readers.

use std::sync::{Arc, Once};

use rand::seq::SliceRandom;

use postfiat_envelope::core::ContextReference;
use postfiat_envelope::store::{
    CompositeStorage, ContentStorage, MemoryStorage, SqliteStorage,
};
use postfiat_envelope::{
    open_envelope, reconstruct_content_from_chunks, resolve_context, ChunkCollector,
    ContextEntry, ContextGraph, EncryptionMode, EnvelopeError, EnvelopeFactory, EnvelopeKind,
    EnvelopeOutput, EnvelopeRequest, FactoryConfig,
};
use postfiat_envelope_testkit::{patterned_content, TestFixture};

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

#[tokio::test]
async fn test_short_text_fits_inline() {
    init_tracing();
    let mut fixture = TestFixture::new();
    let request = EnvelopeRequest::new(b"Hello, Bob", EncryptionMode::PublicKey, 1000)
        .recipient(fixture.bob.public_key());

    let output = fixture
        .factory
        .create_envelope(request, &mut fixture.rng)
        .await
        .unwrap();
    let EnvelopeOutput::Single(envelope) = output else {
        panic!("expected inline envelope");
    };

    assert_eq!(envelope.kind(), EnvelopeKind::Core);
    assert_eq!(envelope.grants().len(), 1);
    assert!(envelope.encoded_len() <= 1000);
    assert_eq!(fixture.storage.write_count(), 0);
    assert_eq!(
        open_envelope(&envelope, &fixture.bob.keyring(), None)
            .await
            .unwrap(),
        b"Hello, Bob"
    );
}

#[tokio::test]
async fn test_zero_limit_is_rejected() {
    let mut fixture = TestFixture::new();
    let request = EnvelopeRequest::new(b"anything", EncryptionMode::PublicKey, 0)
        .recipient(fixture.bob.public_key());

    let err = fixture
        .factory
        .create_envelope(request, &mut fixture.rng)
        .await
        .unwrap_err();
    assert!(matches!(err, EnvelopeError::EnvelopeValidation(_)));
    assert_eq!(fixture.storage.write_count(), 0);
}

#[tokio::test]
async fn test_ten_kilobytes_chunked_at_one_thousand() {
    init_tracing();
    let mut fixture = TestFixture::new();
    let content = patterned_content(10 * 1024);
    let request = EnvelopeRequest::new(&content, EncryptionMode::PublicKey, 1000)
        .recipient(fixture.bob.public_key());

    let mut parts = fixture
        .chunking_factory()
        .create_envelope(request, &mut fixture.rng)
        .await
        .unwrap()
        .into_envelopes();
    assert!(parts.len() > 1);

    let message_id = parts[0].message_id().unwrap().unwrap();
    let total = parts.len() as u32;
    for part in &parts {
        assert!(part.encoded_len() <= 1000);
        assert_eq!(part.kind(), EnvelopeKind::MultipartPart);
        assert_eq!(part.message_id().unwrap().unwrap(), message_id);
        assert_eq!(part.position().unwrap().unwrap().total, total);
        assert_eq!(part.grants(), parts[0].grants());
    }
    assert_eq!(
        parts[0].metadata().get("multipart").map(String::as_str),
        Some(format!("1/{total}").as_str())
    );

    parts.shuffle(&mut fixture.rng);
    let content_back = reconstruct_content_from_chunks(&parts, &fixture.bob.keyring()).unwrap();
    assert_eq!(content_back, content);
}

#[tokio::test]
async fn test_collector_with_any_arrival_order() {
    let mut fixture = TestFixture::new();
    let factory = fixture.chunking_factory();
    let mut arrivals = Vec::new();
    let mut originals = Vec::new();

    for size in [3_000, 4_500, 6_000] {
        let content = patterned_content(size);
        let request = EnvelopeRequest::new(&content, EncryptionMode::PublicKey, 1000)
            .recipient(fixture.bob.public_key());
        let parts = factory
            .create_envelope(request, &mut fixture.rng)
            .await
            .unwrap()
            .into_envelopes();
        arrivals.extend(parts);
        originals.push(content);
    }
    arrivals.shuffle(&mut fixture.rng);

    let mut collector = ChunkCollector::new();
    let mut completed = Vec::new();
    for part in arrivals {
        if let Some(set) = collector.add(part).unwrap() {
            completed.push(reconstruct_content_from_chunks(&set, &fixture.bob.keyring()).unwrap());
        }
    }

    assert_eq!(collector.pending_sets(), 0);
    completed.sort_by_key(Vec::len);
    assert_eq!(completed, originals);
}

#[tokio::test]
async fn test_identical_content_deduplicates() {
    let mut fixture = TestFixture::new();
    let content = patterned_content(12_000);

    let mut outputs = Vec::new();
    for _ in 0..2 {
        let request = EnvelopeRequest::new(&content, EncryptionMode::None, 1000);
        outputs.push(
            fixture
                .factory
                .create_envelope(request, &mut fixture.rng)
                .await
                .unwrap(),
        );
    }

    let descriptors: Vec<_> = outputs
        .iter()
        .map(|o| match o {
            EnvelopeOutput::External { descriptor, .. } => descriptor.clone(),
            other => panic!("expected external envelope, got {other:?}"),
        })
        .collect();
    assert_eq!(outputs[0].content_hash(), outputs[1].content_hash());
    assert_eq!(descriptors[0], descriptors[1]);
    assert_eq!(fixture.storage.len(), 1);
}

#[tokio::test]
async fn test_encrypted_content_hash_matches_across_keys() {
    let mut fixture = TestFixture::new();
    let content = patterned_content(12_000);

    let mut outputs = Vec::new();
    for _ in 0..2 {
        let request = EnvelopeRequest::new(&content, EncryptionMode::PublicKey, 1000)
            .recipient(fixture.bob.public_key());
        outputs.push(
            fixture
                .factory
                .create_envelope(request, &mut fixture.rng)
                .await
                .unwrap(),
        );
    }

    // Fresh content keys give different ciphertext, so two blobs are stored,
    // but the plaintext identity is the same.
    assert_eq!(outputs[0].content_hash(), outputs[1].content_hash());
    assert_eq!(fixture.storage.len(), 2);
}

#[tokio::test]
async fn test_sqlite_backed_factory_persists() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("content.db");
    let mut fixture = TestFixture::new();
    let content = patterned_content(30_000);

    let envelope = {
        let storage = Arc::new(SqliteStorage::open(&path)?);
        let factory = EnvelopeFactory::default().with_storage(storage);
        let request = EnvelopeRequest::new(&content, EncryptionMode::PublicKey, 1000)
            .recipient(fixture.bob.public_key())
            .content_type("application/octet-stream");
        match factory.create_envelope(request, &mut fixture.rng).await? {
            EnvelopeOutput::External { envelope, descriptor } => {
                assert!(descriptor.uri.starts_with("sqlite://"));
                assert_eq!(descriptor.content_type, "application/octet-stream");
                envelope
            }
            other => panic!("expected external envelope, got {other:?}"),
        }
    };

    let reopened = SqliteStorage::open(&path)?;
    let opened = open_envelope(&envelope, &fixture.bob.keyring(), Some(&reopened)).await?;
    assert_eq!(opened, content);
    Ok(())
}

#[tokio::test]
async fn test_composite_falls_back_to_second_backend() -> anyhow::Result<()> {
    init_tracing();
    let mut fixture = TestFixture::new();
    let flaky = Arc::new(MemoryStorage::new());
    flaky.set_available(false);
    let durable = Arc::new(SqliteStorage::open_memory()?);
    let composite: Arc<dyn ContentStorage> = Arc::new(CompositeStorage::new(vec![
        flaky.clone() as Arc<dyn ContentStorage>,
        durable.clone(),
    ]));

    let factory = EnvelopeFactory::default().with_storage(composite.clone());
    let content = patterned_content(9_000);
    let output = factory
        .create_envelope(
            EnvelopeRequest::new(&content, EncryptionMode::None, 1000),
            &mut fixture.rng,
        )
        .await?;

    let EnvelopeOutput::External { envelope, .. } = output else {
        panic!("expected external envelope");
    };
    assert_eq!(flaky.write_count(), 0);
    assert_eq!(durable.blob_count().await?, 1);

    let opened = open_envelope(&envelope, &fixture.bob.keyring(), Some(composite.as_ref())).await?;
    assert_eq!(opened, content);
    Ok(())
}

#[tokio::test]
async fn test_composite_reports_owning_backend_outage() -> anyhow::Result<()> {
    let mut fixture = TestFixture::new();
    let memory = Arc::new(MemoryStorage::new());
    let composite: Arc<dyn ContentStorage> = Arc::new(CompositeStorage::new(vec![
        memory.clone() as Arc<dyn ContentStorage>,
        Arc::new(SqliteStorage::open_memory()?),
    ]));

    let factory = EnvelopeFactory::default().with_storage(composite.clone());
    let output = factory
        .create_envelope(
            EnvelopeRequest::new(&patterned_content(9_000), EncryptionMode::None, 1000),
            &mut fixture.rng,
        )
        .await?;
    let EnvelopeOutput::External { envelope, .. } = output else {
        panic!("expected external envelope");
    };

    memory.set_available(false);
    let err = open_envelope(&envelope, &fixture.bob.keyring(), Some(composite.as_ref()))
        .await
        .unwrap_err();
    assert!(
        matches!(err, EnvelopeError::Storage(ref e) if e.is_unavailable()),
        "{err}"
    );
    Ok(())
}

#[tokio::test]
async fn test_unavailable_storage_falls_back_to_chunking() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set_available(false);
    let mut fixture = TestFixture::new();
    let factory = EnvelopeFactory::default().with_storage(storage.clone());
    let content = patterned_content(4_000);

    let output = factory
        .create_envelope(
            EnvelopeRequest::new(&content, EncryptionMode::None, 1000),
            &mut fixture.rng,
        )
        .await
        .unwrap();
    assert!(output.is_multipart());
    assert_eq!(storage.write_count(), 0);
}

#[tokio::test]
async fn test_max_parts_enforced() {
    let mut fixture = TestFixture::with_config(FactoryConfig {
        max_parts: Some(2),
        prefer_external: false,
        ..FactoryConfig::default()
    });
    let content = patterned_content(10_000);

    let err = fixture
        .factory
        .create_envelope(
            EnvelopeRequest::new(&content, EncryptionMode::None, 1000),
            &mut fixture.rng,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EnvelopeError::EnvelopeValidation(_)));
}

#[tokio::test]
async fn test_conversation_context_with_partial_access() {
    init_tracing();
    let mut fixture = TestFixture::new();
    let factory = fixture.chunking_factory();
    let mut graph = ContextGraph::new();

    // Alice asks everyone, privately tells Bob, then Bob replies to both.
    let question = factory
        .create_envelope(
            EnvelopeRequest::new(b"what time works?", EncryptionMode::None, 1000),
            &mut fixture.rng,
        )
        .await
        .unwrap()
        .into_envelopes();
    let question_id = graph.insert(question[0].clone());

    let private_content = patterned_content(3_000);
    let private = factory
        .create_envelope(
            EnvelopeRequest::new(&private_content, EncryptionMode::Protected, 1000)
                .sender(&fixture.alice.secret)
                .recipient(fixture.bob.public_key())
                .context_ref(ContextReference::extends(question_id)),
            &mut fixture.rng,
        )
        .await
        .unwrap()
        .into_envelopes();
    assert!(private.len() > 1);
    let private_ids: Vec<_> = private.iter().map(|p| graph.insert(p.clone())).collect();

    let reply = factory
        .create_envelope(
            EnvelopeRequest::new(b"thursday", EncryptionMode::None, 1000)
                .reply_to(question_id)
                .context_ref(ContextReference::responds_to(private_ids[0])),
            &mut fixture.rng,
        )
        .await
        .unwrap()
        .into_envelopes();
    let reply_id = graph.insert(reply[0].clone());

    let as_bob = resolve_context(&graph, &reply_id, &fixture.bob.keyring(), None)
        .await
        .unwrap();
    assert_eq!(as_bob.len(), 2);
    assert!(matches!(&as_bob[0], ContextEntry::Resolved { id, .. } if *id == question_id));
    assert!(matches!(&as_bob[1], ContextEntry::Resolved { content, .. } if *content == private_content));

    let as_eve = resolve_context(&graph, &reply_id, &fixture.eve.keyring(), None)
        .await
        .unwrap();
    assert!(matches!(&as_eve[0], ContextEntry::Resolved { .. }));
    assert!(matches!(&as_eve[1], ContextEntry::Inaccessible { id, .. } if *id == private_ids[0]));
}
