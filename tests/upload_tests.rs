// Integration tests for the two-phase upload pipeline
//
// A scripted transport stands in for the server so every verification
// branch is reachable: persistence confirmation, checksum contradiction,
// trust-based fallback, token refresh, retry policy, and queue visibility.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use meeting_recorder::integrity;
use meeting_recorder::store::{FsStorageAdapter, StorageAdapter};
use meeting_recorder::upload::{
    safe_delete_after_upload, FileLocks, QueueItemStatus, StatusProbe, TokenRefresh, UploadConfig,
    UploadError, UploadMetadata, UploadOutcome, UploadQueue, UploadTransport, UploadVerifier,
};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn fast_config() -> UploadConfig {
    UploadConfig {
        max_retries: 3,
        initial_retry_delay: Duration::from_millis(1),
        max_retry_delay: Duration::from_millis(4),
        poll_attempts: 3,
        poll_interval: Duration::from_millis(1),
    }
}

fn metadata(record_id: &str) -> UploadMetadata {
    UploadMetadata {
        record_id: record_id.to_string(),
        user_id: Some("user-1".to_string()),
        duration_secs: 120,
        created_at: Utc::now(),
        checksum: None,
    }
}

fn write_artifact(dir: &TempDir, bytes: &[u8]) -> Result<PathBuf> {
    let path = dir.path().join("audio.bin");
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Transport whose responses are scripted per call.
#[derive(Default)]
struct ScriptedTransport {
    transmits: Mutex<VecDeque<Result<String, UploadError>>>,
    probes: Mutex<VecDeque<Result<StatusProbe, UploadError>>>,
    transmit_calls: AtomicU32,
    tokens_seen: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn push_transmit(&self, result: Result<String, UploadError>) {
        self.transmits.lock().unwrap().push_back(result);
    }

    fn push_probe(&self, result: Result<StatusProbe, UploadError>) {
        self.probes.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl UploadTransport for ScriptedTransport {
    async fn transmit(
        &self,
        _artifact: &Path,
        _metadata: &UploadMetadata,
        token: &str,
    ) -> Result<String, UploadError> {
        self.transmit_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen.lock().unwrap().push(token.to_string());
        self.transmits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("af-1".to_string()))
    }

    async fn probe_status(&self, _audio_file_id: &str) -> Result<StatusProbe, UploadError> {
        self.probes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(StatusProbe::Processing))
    }
}

struct FixedRefresh(String);

#[async_trait]
impl TokenRefresh for FixedRefresh {
    async fn refresh(&self) -> Result<String, UploadError> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn test_verified_upload_allows_deletion() -> Result<()> {
    let dir = TempDir::new()?;
    let artifact = write_artifact(&dir, b"meeting audio bytes")?;

    let transport = Arc::new(ScriptedTransport::default());
    transport.push_probe(Ok(StatusProbe::Persisted {
        checksum: Some(integrity::upload_checksum(b"meeting audio bytes")),
    }));

    let verifier = UploadVerifier::new(transport, fast_config());
    let outcome = verifier
        .upload_with_verification(&artifact, &metadata("rec-1"), "token-a")
        .await;

    assert!(outcome.success);
    assert!(outcome.verified);
    assert!(outcome.can_delete);
    assert!(!outcome.fallback);
    assert_eq!(outcome.audio_file_id.as_deref(), Some("af-1"));
    Ok(())
}

#[tokio::test]
async fn test_checksum_contradiction_blocks_deletion() -> Result<()> {
    let dir = TempDir::new()?;
    let artifact = write_artifact(&dir, b"meeting audio bytes")?;

    let transport = Arc::new(ScriptedTransport::default());
    transport.push_probe(Ok(StatusProbe::Persisted {
        checksum: Some(integrity::upload_checksum(b"different bytes")),
    }));

    let verifier = UploadVerifier::new(Arc::clone(&transport) as Arc<dyn UploadTransport>, fast_config());
    let outcome = verifier
        .upload_with_retry(&artifact, &metadata("rec-1"), "token-a")
        .await;

    assert!(!outcome.success);
    assert!(!outcome.can_delete);
    assert!(outcome
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("checksums do not match"));
    // A contradiction will never heal; the retry loop must not re-attempt.
    assert_eq!(transport.transmit_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_unconfirmable_server_degrades_to_trust() -> Result<()> {
    let dir = TempDir::new()?;
    let artifact = write_artifact(&dir, b"meeting audio bytes")?;

    let transport = Arc::new(ScriptedTransport::default());
    transport.push_probe(Ok(StatusProbe::Unsupported));

    let verifier = UploadVerifier::new(transport, fast_config());
    let outcome = verifier
        .upload_with_verification(&artifact, &metadata("rec-1"), "token-a")
        .await;

    assert!(outcome.success);
    assert!(!outcome.verified);
    assert!(outcome.fallback);
    assert!(outcome.can_delete);
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_refreshes_token_exactly_once() -> Result<()> {
    let dir = TempDir::new()?;
    let artifact = write_artifact(&dir, b"meeting audio bytes")?;

    let transport = Arc::new(ScriptedTransport::default());
    transport.push_transmit(Err(UploadError::Unauthorized));
    transport.push_transmit(Ok("af-2".to_string()));
    transport.push_probe(Ok(StatusProbe::Persisted { checksum: None }));

    let verifier = UploadVerifier::new(
        Arc::clone(&transport) as Arc<dyn UploadTransport>,
        fast_config(),
    )
    .with_token_refresh(Arc::new(FixedRefresh("token-fresh".to_string())));

    let outcome = verifier
        .upload_with_verification(&artifact, &metadata("rec-1"), "token-stale")
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.audio_file_id.as_deref(), Some("af-2"));
    assert_eq!(
        *transport.tokens_seen.lock().unwrap(),
        vec!["token-stale".to_string(), "token-fresh".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn test_second_unauthorized_fails_without_another_refresh() -> Result<()> {
    let dir = TempDir::new()?;
    let artifact = write_artifact(&dir, b"meeting audio bytes")?;

    let transport = Arc::new(ScriptedTransport::default());
    transport.push_transmit(Err(UploadError::Unauthorized));
    transport.push_transmit(Err(UploadError::Unauthorized));

    let verifier = UploadVerifier::new(
        Arc::clone(&transport) as Arc<dyn UploadTransport>,
        fast_config(),
    )
    .with_token_refresh(Arc::new(FixedRefresh("token-fresh".to_string())));

    let outcome = verifier
        .upload_with_retry(&artifact, &metadata("rec-1"), "token-stale")
        .await;

    assert!(!outcome.success);
    assert!(!outcome.can_delete);
    // One original attempt plus one refreshed attempt; auth failure is not
    // retryable so the backoff loop stops there.
    assert_eq!(transport.transmit_calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_poll_budget_exhaustion_is_a_timeout() -> Result<()> {
    let dir = TempDir::new()?;
    let artifact = write_artifact(&dir, b"meeting audio bytes")?;

    // Default probe response is Processing, so the budget just runs out.
    let transport = Arc::new(ScriptedTransport::default());
    let verifier = UploadVerifier::new(transport, fast_config());
    let outcome = verifier
        .upload_with_verification(&artifact, &metadata("rec-1"), "token-a")
        .await;

    assert!(!outcome.success);
    assert!(!outcome.can_delete);
    assert!(outcome
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("Server confirmation timeout"));
    Ok(())
}

#[tokio::test]
async fn test_transport_failure_is_retried_with_backoff() -> Result<()> {
    let dir = TempDir::new()?;
    let artifact = write_artifact(&dir, b"meeting audio bytes")?;

    let transport = Arc::new(ScriptedTransport::default());
    transport.push_transmit(Err(UploadError::Transport("connection reset".to_string())));
    transport.push_transmit(Ok("af-3".to_string()));
    transport.push_probe(Ok(StatusProbe::Persisted { checksum: None }));

    let verifier = UploadVerifier::new(
        Arc::clone(&transport) as Arc<dyn UploadTransport>,
        fast_config(),
    );
    let outcome = verifier
        .upload_with_retry(&artifact, &metadata("rec-1"), "token-a")
        .await;

    assert!(outcome.success);
    assert_eq!(transport.transmit_calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_missing_artifact_degrades_checksum_but_still_uploads() -> Result<()> {
    let dir = TempDir::new()?;
    let artifact = dir.path().join("gone.bin");

    let transport = Arc::new(ScriptedTransport::default());
    // Transmit still fails because the scripted transport ignores the file,
    // so drive it to a clean persisted outcome.
    transport.push_probe(Ok(StatusProbe::Persisted {
        checksum: Some(integrity::upload_checksum(b"whatever")),
    }));

    let verifier = UploadVerifier::new(transport, fast_config());
    let outcome = verifier
        .upload_with_verification(&artifact, &metadata("rec-1"), "token-a")
        .await;

    // With no local checksum the server value cannot contradict anything.
    assert!(outcome.success);
    assert!(outcome.verified);
    Ok(())
}

#[tokio::test]
async fn test_locked_session_survives_safe_delete() -> Result<()> {
    let dir = TempDir::new()?;
    let store = FsStorageAdapter::new(dir.path().join("recordings"))?;
    store.save_chunk("rec-1", 0, b"audio").await?;

    let locks = FileLocks::new();
    locks.lock("rec-1");

    let outcome = UploadOutcome {
        success: true,
        audio_file_id: Some("af-1".to_string()),
        can_delete: true,
        verified: true,
        fallback: false,
        error: None,
    };
    let deleted = safe_delete_after_upload(&store, &locks, "rec-1", &outcome).await?;
    assert!(!deleted);
    assert_eq!(store.list_chunks("rec-1").await?, vec![0]);

    locks.unlock("rec-1");
    let deleted = safe_delete_after_upload(&store, &locks, "rec-1", &outcome).await?;
    assert!(deleted);
    assert!(store.list_chunks("rec-1").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unverified_outcome_never_deletes() -> Result<()> {
    let dir = TempDir::new()?;
    let store = FsStorageAdapter::new(dir.path().join("recordings"))?;
    store.save_chunk("rec-1", 0, b"audio").await?;

    let outcome = UploadOutcome {
        success: false,
        audio_file_id: Some("af-1".to_string()),
        can_delete: false,
        verified: false,
        fallback: false,
        error: Some("File verification failed - checksums do not match".to_string()),
    };
    let deleted =
        safe_delete_after_upload(&store, &FileLocks::new(), "rec-1", &outcome).await?;
    assert!(!deleted);
    assert_eq!(store.list_chunks("rec-1").await?, vec![0]);
    Ok(())
}

async fn wait_for_status(
    queue: &UploadQueue,
    record_id: &str,
    status: QueueItemStatus,
) -> Result<()> {
    for _ in 0..200 {
        let items = queue.queue_status().await;
        if items
            .iter()
            .any(|i| i.record_id == record_id && i.status == status)
        {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    anyhow::bail!("queue item {record_id} never reached {status:?}");
}

#[tokio::test]
async fn test_queue_failed_item_stays_visible_and_retries() -> Result<()> {
    let dir = TempDir::new()?;
    let store = Arc::new(FsStorageAdapter::new(dir.path().join("recordings"))?);
    let artifact = write_artifact(&dir, b"queued audio")?;

    let transport = Arc::new(ScriptedTransport::default());
    // First pass fails on transport for every backoff attempt; the retried
    // pass is allowed through.
    let attempts = fast_config().max_retries + 1;
    for _ in 0..attempts {
        transport.push_transmit(Err(UploadError::Transport("offline".to_string())));
    }
    transport.push_transmit(Ok("af-9".to_string()));
    for _ in 0..attempts {
        // One persisted probe would be enough, but keep the script simple.
        transport.push_probe(Ok(StatusProbe::Persisted { checksum: None }));
    }

    let verifier = UploadVerifier::new(
        Arc::clone(&transport) as Arc<dyn UploadTransport>,
        fast_config(),
    );
    let queue = UploadQueue::new(
        verifier,
        FileLocks::new(),
        store.clone() as Arc<dyn StorageAdapter>,
    );
    queue.start().await;

    queue
        .enqueue("rec-1", artifact, metadata("rec-1"), "token-a")
        .await;

    wait_for_status(&queue, "rec-1", QueueItemStatus::Failed).await?;
    let items = queue.queue_status().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].attempts, 1);
    assert!(items[0].error.is_some());

    assert!(queue.retry("rec-1").await);
    wait_for_status(&queue, "rec-1", QueueItemStatus::Complete).await?;
    let items = queue.queue_status().await;
    assert_eq!(items[0].attempts, 2);
    assert!(items[0].error.is_none());

    queue.clear_completed().await;
    assert!(queue.queue_status().await.is_empty());
    queue.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_queue_cancel_of_pending_item() -> Result<()> {
    let dir = TempDir::new()?;
    let store = Arc::new(FsStorageAdapter::new(dir.path().join("recordings"))?);
    let artifact = write_artifact(&dir, b"queued audio")?;

    let transport = Arc::new(ScriptedTransport::default());
    let verifier = UploadVerifier::new(transport, fast_config());
    let queue = UploadQueue::new(
        verifier,
        FileLocks::new(),
        store as Arc<dyn StorageAdapter>,
    );
    // Worker not started: the item stays pending and can be cancelled.
    queue
        .enqueue("rec-1", artifact, metadata("rec-1"), "token-a")
        .await;
    queue.cancel("rec-1").await;

    let items = queue.queue_status().await;
    assert_eq!(items[0].status, QueueItemStatus::Failed);
    assert_eq!(items[0].error.as_deref(), Some("Upload cancelled"));

    // Cancelled items remain retryable.
    assert!(queue.retry("rec-1").await);
    assert_eq!(queue.queue_status().await[0].status, QueueItemStatus::Pending);
    Ok(())
}
