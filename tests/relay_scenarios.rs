//! End-to-end signing flows through the relay service

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use signer_relay::clock::ManualClock;
use signer_relay::protocol::{
    CreateSession, SignerReply, SignerRequest, SigningRelay, RelayConfig, StructuredBody,
    Submission, SubmissionOutcome,
};
use signer_relay::retention::{RetentionPolicy, RetentionSweeper};
use signer_relay::session::{SessionKind, SessionRegistry, SessionStatus};
use signer_relay::store::{
    DocumentStore, FileDocumentStore, MemoryDocumentStore, OriginalDocument,
};
use signer_relay::RelayError;

struct Harness {
    clock: Arc<ManualClock>,
    relay: SigningRelay,
    sweeper: RetentionSweeper,
}

fn harness_with(store: Arc<dyn DocumentStore>) -> Harness {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let registry = Arc::new(SessionRegistry::new(clock.clone()));
    let relay = SigningRelay::new(registry.clone(), store.clone(), RelayConfig::default());
    let sweeper = RetentionSweeper::new(registry, store, clock.clone(), RetentionPolicy::default());
    Harness {
        clock,
        relay,
        sweeper,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(MemoryDocumentStore::new(1024 * 1024)))
}

async fn create_invoice(relay: &SigningRelay) -> String {
    relay
        .create_session(CreateSession {
            id: None,
            file_name: "invoice.pdf".to_string(),
            document: Some(Bytes::from_static(b"%PDF-1.4\n%")),
            kind: SessionKind::Standard,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_invoice_signing_flow() {
    let h = harness();
    let id = create_invoice(&h.relay).await;

    let original = h.relay.fetch_original(&id).await.unwrap();
    assert_eq!(original.bytes.len(), 10);
    assert_eq!(&original.bytes[..], b"%PDF-1.4\n%");

    h.relay
        .submit(&id, &Submission::RawBase64("AQID".to_string()))
        .await
        .unwrap();

    let view = h.relay.status(&id);
    assert_eq!(view.status, SessionStatus::Completed);
    assert!(view.has_signed_data);
    assert!(view.error.is_none());

    let signed = h.relay.download(&id).await.unwrap();
    assert_eq!(&signed.bytes[..], &[1, 2, 3]);
    assert_eq!(signed.file_name, "invoice_firmado.pdf");
}

#[tokio::test]
async fn test_signer_cancel_is_reported_through_status() {
    let h = harness();
    let id = create_invoice(&h.relay).await;

    let outcome = h
        .relay
        .submit(&id, &Submission::RawBase64("SAF_03_ERROR_CANCEL".to_string()))
        .await
        .unwrap();
    assert!(matches!(outcome, SubmissionOutcome::SignerError(_)));

    let view = h.relay.status(&id);
    assert_eq!(view.status, SessionStatus::Error);
    assert_eq!(view.error.as_deref(), Some("SAF_03_ERROR_CANCEL"));
    assert!(!view.has_signed_data);

    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["hasSignedData"], false);
}

#[tokio::test]
async fn test_unknown_session_status_is_not_found() {
    let h = harness();
    let view = h.relay.status("sess_does_not_exist");
    assert_eq!(view.status, SessionStatus::NotFound);

    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["status"], "not_found");
}

#[tokio::test]
async fn test_all_write_conventions_agree() {
    let conventions = vec![
        Submission::RawBase64("AQID".to_string()),
        Submission::FormEncoded("op=put&dat=AQID".to_string()),
        Submission::Structured(StructuredBody {
            dat: None,
            data: Some("AQID".to_string()),
        }),
        Submission::Query("op=put&id=ignored&dat=AQID".to_string()),
    ];

    for submission in conventions {
        let h = harness();
        let id = create_invoice(&h.relay).await;
        h.relay.submit(&id, &submission).await.unwrap();

        let view = h.relay.status(&id);
        assert_eq!(view.status, SessionStatus::Completed, "{}", submission.convention());
        assert!(view.has_signed_data);
        assert!(view.error.is_none());
        let signed = h.relay.retrieve_signed(&id).await.unwrap();
        assert_eq!(signed, "AQID", "{}", submission.convention());
    }
}

#[tokio::test]
async fn test_error_prefix_wins_in_every_convention() {
    let conventions = vec![
        Submission::RawBase64("SAF_03_ERROR_CANCEL".to_string()),
        Submission::FormEncoded("op=put&dat=SAF_03_ERROR_CANCEL".to_string()),
        Submission::Structured(StructuredBody {
            dat: Some("SAF_03_ERROR_CANCEL".to_string()),
            data: None,
        }),
        Submission::Query("op=put&dat=SAF_03_ERROR_CANCEL".to_string()),
    ];

    for submission in conventions {
        let h = harness();
        let id = create_invoice(&h.relay).await;
        h.relay.submit(&id, &submission).await.unwrap();

        let view = h.relay.status(&id);
        assert_eq!(view.status, SessionStatus::Error);
        assert!(!view.has_signed_data);
        assert!(h.relay.store().get_signed(&id).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_download_before_completion_returns_nothing() {
    let h = harness();
    let id = create_invoice(&h.relay).await;

    assert!(matches!(
        h.relay.download(&id).await,
        Err(RelayError::NotReady { .. })
    ));
    assert!(matches!(
        h.relay.retrieve_signed(&id).await,
        Err(RelayError::NotReady { .. })
    ));
}

#[tokio::test]
async fn test_grace_window_then_gone() {
    let h = harness();
    let id = create_invoice(&h.relay).await;
    h.relay
        .submit(&id, &Submission::RawBase64("AQID".to_string()))
        .await
        .unwrap();

    let first = h.relay.download(&id).await.unwrap();

    h.clock.advance(Duration::from_secs(3));
    h.sweeper.sweep_once().await;
    let second = h.relay.download(&id).await.unwrap();
    assert_eq!(first, second);

    h.clock.advance(Duration::from_secs(10));
    h.sweeper.sweep_once().await;
    assert_eq!(h.relay.status(&id).status, SessionStatus::NotFound);
    assert!(matches!(
        h.relay.download(&id).await,
        Err(RelayError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn test_stale_session_swept_regardless_of_status() {
    let h = harness();
    let pending = create_invoice(&h.relay).await;
    let failed = create_invoice(&h.relay).await;
    h.relay
        .submit(&failed, &Submission::RawBase64("SAF_01".to_string()))
        .await
        .unwrap();
    let completed = create_invoice(&h.relay).await;
    h.relay
        .submit(&completed, &Submission::RawBase64("AQID".to_string()))
        .await
        .unwrap();

    h.clock.advance(Duration::from_secs(3601));
    let report = h.sweeper.sweep_once().await;
    assert_eq!(report.removed, 3);
    for id in [&pending, &failed, &completed] {
        assert_eq!(h.relay.status(id).status, SessionStatus::NotFound);
    }
    assert_eq!(h.relay.active_sessions(), 0);
}

#[tokio::test]
async fn test_multiplexed_flow_with_caller_id() {
    let h = harness();
    h.relay
        .create_session(CreateSession {
            id: Some("servlet_1712345678".to_string()),
            file_name: "contrato.pdf".to_string(),
            document: Some(Bytes::from_static(b"%PDF-1.7")),
            kind: SessionKind::Standard,
        })
        .await
        .unwrap();

    let get = SignerRequest::from_parts(Some("op=get&id=servlet_1712345678"), None, b"").unwrap();
    match h.relay.handle(get).await.unwrap() {
        SignerReply::Original(doc) => assert_eq!(doc.file_name, "contrato.pdf"),
        other => panic!("unexpected reply {:?}", other),
    }

    let put = SignerRequest::from_parts(
        None,
        Some("application/x-www-form-urlencoded"),
        b"op=put&id=servlet_1712345678&dat=AQID",
    )
    .unwrap();
    h.relay.handle(put).await.unwrap();

    let download = SignerRequest::from_parts(Some("op=download&id=servlet_1712345678"), None, b"").unwrap();
    match h.relay.handle(download).await.unwrap() {
        SignerReply::Download(doc) => {
            assert_eq!(doc.file_name, "contrato_firmado.pdf");
            assert_eq!(&doc.bytes[..], &[1, 2, 3]);
        }
        other => panic!("unexpected reply {:?}", other),
    }
}

#[tokio::test]
async fn test_prestaged_session_expires_early() {
    let h = harness();
    let id = h
        .relay
        .create_session(CreateSession {
            id: Some("pre_1".to_string()),
            file_name: "large.pdf".to_string(),
            document: Some(Bytes::from(vec![7u8; 4096])),
            kind: SessionKind::Prestaged,
        })
        .await
        .unwrap();

    h.clock.advance(Duration::from_secs(1801));
    assert_eq!(h.sweeper.sweep_once().await.removed, 0);
    assert_eq!(h.sweeper.sweep_prestaged().await.removed, 1);
    assert_eq!(h.relay.status(&id).status, SessionStatus::NotFound);
}

#[tokio::test]
async fn test_file_backed_flow() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileDocumentStore::new(dir.path(), 1024 * 1024).await.unwrap();
    let h = harness_with(Arc::new(store));

    let id = create_invoice(&h.relay).await;
    h.relay
        .submit(&id, &Submission::RawBase64("AQID".to_string()))
        .await
        .unwrap();
    assert!(dir.path().join(format!("{}.original", id)).exists());
    assert!(dir.path().join(format!("{}.signed", id)).exists());

    let signed = h.relay.download(&id).await.unwrap();
    assert_eq!(&signed.bytes[..], &[1, 2, 3]);

    h.clock.advance(Duration::from_secs(11));
    h.sweeper.reap_consumed().await;
    assert!(!dir.path().join(format!("{}.original", id)).exists());
    assert!(!dir.path().join(format!("{}.signed", id)).exists());
}

#[tokio::test]
async fn test_concurrent_sessions_are_independent() {
    let h = Arc::new(harness());
    let mut handles = Vec::new();
    for i in 0..16u8 {
        let h = Arc::clone(&h);
        handles.push(tokio::spawn(async move {
            let id = create_invoice(&h.relay).await;
            let payload = base64_of(&[i, i, i]);
            h.relay
                .submit(&id, &Submission::RawBase64(payload))
                .await
                .unwrap();
            (id, i)
        }));
    }

    for handle in handles {
        let (id, i) = handle.await.unwrap();
        let doc = h.relay.download(&id).await.unwrap();
        assert_eq!(&doc.bytes[..], &[i, i, i]);
    }
}

/// Memory store with a pause after every signed-document write or delete,
/// widening the gap before the matching status transition.
struct DelayedStore {
    inner: MemoryDocumentStore,
    delay: Duration,
}

#[async_trait]
impl DocumentStore for DelayedStore {
    async fn put(&self, id: &str, bytes: Bytes, file_name: &str) -> signer_relay::Result<()> {
        self.inner.put(id, bytes, file_name).await
    }
    async fn get_original(&self, id: &str) -> signer_relay::Result<Option<OriginalDocument>> {
        self.inner.get_original(id).await
    }
    async fn put_signed(&self, id: &str, bytes: Bytes) -> signer_relay::Result<()> {
        self.inner.put_signed(id, bytes).await?;
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
    async fn get_signed(&self, id: &str) -> signer_relay::Result<Option<Bytes>> {
        self.inner.get_signed(id).await
    }
    async fn remove_signed(&self, id: &str) -> signer_relay::Result<()> {
        self.inner.remove_signed(id).await?;
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
    async fn remove(&self, id: &str) -> signer_relay::Result<()> {
        self.inner.remove(id).await
    }
    fn backend(&self) -> &'static str {
        "delayed"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_writers_and_readers_stay_consistent() {
    let h = Arc::new(harness_with(Arc::new(DelayedStore {
        inner: MemoryDocumentStore::new(1024 * 1024),
        delay: Duration::from_millis(5),
    })));
    let id = create_invoice(&h.relay).await;

    let mut writers = Vec::new();
    for i in 0..12u8 {
        let h = Arc::clone(&h);
        let id = id.clone();
        writers.push(tokio::spawn(async move {
            let submission = if i % 3 == 2 {
                Submission::RawBase64(format!("SAF_0{}_ERROR", i % 10))
            } else {
                Submission::RawBase64(base64_of(&[i, i, i]))
            };
            h.relay.submit(&id, &submission).await.unwrap()
        }));
    }

    let mut readers = Vec::new();
    for _ in 0..4 {
        let h = Arc::clone(&h);
        let id = id.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..20 {
                match h.relay.download(&id).await {
                    Ok(doc) => {
                        assert_eq!(doc.bytes.len(), 3);
                        assert!(doc.bytes.iter().all(|b| *b == doc.bytes[0]));
                    }
                    Err(RelayError::NotReady { status, .. }) => {
                        // A completed session always has its bytes
                        assert_ne!(status, SessionStatus::Completed);
                    }
                    Err(e) => panic!("unexpected download error: {:?}", e),
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }));
    }

    for writer in writers {
        let outcome = writer.await.unwrap();
        assert!(matches!(
            outcome,
            SubmissionOutcome::Completed { size: 3 } | SubmissionOutcome::SignerError(_)
        ));
    }
    for reader in readers {
        reader.await.unwrap();
    }

    let view = h.relay.status(&id);
    let stored = h.relay.store().get_signed(&id).await.unwrap();
    match view.status {
        SessionStatus::Completed => {
            assert!(view.has_signed_data);
            assert!(view.error.is_none());
            assert_eq!(stored.map(|b| b.len()), Some(3));
        }
        SessionStatus::Error => {
            assert!(!view.has_signed_data);
            assert!(view.error.is_some());
            assert!(stored.is_none());
        }
        other => panic!("unexpected final status {:?}", other),
    }
}

fn base64_of(bytes: &[u8]) -> String {
    signer_relay::protocol::encode_document(bytes)
}
