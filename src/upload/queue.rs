use super::locks::{safe_delete_after_upload, FileLocks};
use super::transport::UploadMetadata;
use super::verifier::UploadVerifier;
use crate::store::StorageAdapter;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueItemStatus {
    Pending,
    Uploading,
    Complete,
    Failed,
}

/// Queue bookkeeping visible to status queries. Failed items stay listed so
/// the user can see them and trigger a retry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub record_id: String,
    pub artifact: PathBuf,
    pub status: QueueItemStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_file_id: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

struct QueueEntry {
    item: QueueItem,
    metadata: UploadMetadata,
    token: String,
}

struct QueueInner {
    verifier: UploadVerifier,
    locks: FileLocks,
    store: Arc<dyn StorageAdapter>,
    entries: Mutex<Vec<QueueEntry>>,
    notify: Notify,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    cancelled: std::sync::Mutex<HashSet<String>>,
    cancel_tick: watch::Sender<u64>,
}

/// Serial background upload queue.
///
/// One artifact uploads at a time; the session lock is held for the duration
/// of each transfer so nothing deletes the bytes mid-flight. Cancellation
/// aborts an in-flight transfer by record id.
#[derive(Clone)]
pub struct UploadQueue {
    inner: Arc<QueueInner>,
}

impl UploadQueue {
    pub fn new(
        verifier: UploadVerifier,
        locks: FileLocks,
        store: Arc<dyn StorageAdapter>,
    ) -> Self {
        let (cancel_tick, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(QueueInner {
                verifier,
                locks,
                store,
                entries: Mutex::new(Vec::new()),
                notify: Notify::new(),
                running: AtomicBool::new(false),
                worker: Mutex::new(None),
                cancelled: std::sync::Mutex::new(HashSet::new()),
                cancel_tick,
            }),
        }
    }

    pub fn locks(&self) -> &FileLocks {
        &self.inner.locks
    }

    /// Start the background worker. Idempotent.
    pub async fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let queue = self.clone();
        let handle = tokio::spawn(async move { queue.worker_loop().await });
        *self.inner.worker.lock().await = Some(handle);
        info!("Upload queue started");
    }

    pub async fn shutdown(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.notify.notify_one();
        if let Some(handle) = self.inner.worker.lock().await.take() {
            handle.abort();
        }
        info!("Upload queue stopped");
    }

    pub async fn enqueue(
        &self,
        record_id: impl Into<String>,
        artifact: PathBuf,
        metadata: UploadMetadata,
        token: impl Into<String>,
    ) {
        let record_id = record_id.into();
        info!("Queued upload for recording {record_id}");
        self.inner.entries.lock().await.push(QueueEntry {
            item: QueueItem {
                record_id,
                artifact,
                status: QueueItemStatus::Pending,
                attempts: 0,
                error: None,
                audio_file_id: None,
                enqueued_at: Utc::now(),
            },
            metadata,
            token: token.into(),
        });
        self.inner.notify.notify_one();
    }

    pub async fn queue_status(&self) -> Vec<QueueItem> {
        self.inner
            .entries
            .lock()
            .await
            .iter()
            .map(|e| e.item.clone())
            .collect()
    }

    /// Re-queue a failed item. Returns false when no failed item matches.
    pub async fn retry(&self, record_id: &str) -> bool {
        let retried = {
            let mut entries = self.inner.entries.lock().await;
            match entries.iter_mut().find(|e| {
                e.item.record_id == record_id && e.item.status == QueueItemStatus::Failed
            }) {
                Some(entry) => {
                    entry.item.status = QueueItemStatus::Pending;
                    entry.item.error = None;
                    true
                }
                None => false,
            }
        };
        if retried {
            self.clear_cancelled(record_id);
            info!("Retrying upload for recording {record_id}");
            self.inner.notify.notify_one();
        }
        retried
    }

    /// Cancel a pending or in-flight upload.
    pub async fn cancel(&self, record_id: &str) {
        {
            let mut entries = self.inner.entries.lock().await;
            if let Some(entry) = entries.iter_mut().find(|e| {
                e.item.record_id == record_id && e.item.status == QueueItemStatus::Pending
            }) {
                entry.item.status = QueueItemStatus::Failed;
                entry.item.error = Some("Upload cancelled".to_string());
                info!("Cancelled queued upload for recording {record_id}");
                return;
            }
        }
        self.cancelled_set().insert(record_id.to_string());
        self.inner.cancel_tick.send_modify(|tick| *tick += 1);
        info!("Cancellation requested for in-flight upload {record_id}");
    }

    pub async fn clear_completed(&self) {
        self.inner
            .entries
            .lock()
            .await
            .retain(|e| e.item.status != QueueItemStatus::Complete);
    }

    fn cancelled_set(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.inner.cancelled.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_cancelled(&self, record_id: &str) -> bool {
        self.cancelled_set().contains(record_id)
    }

    fn clear_cancelled(&self, record_id: &str) {
        self.cancelled_set().remove(record_id);
    }

    async fn worker_loop(self) {
        while self.inner.running.load(Ordering::SeqCst) {
            let next = {
                let mut entries = self.inner.entries.lock().await;
                match entries
                    .iter_mut()
                    .find(|e| e.item.status == QueueItemStatus::Pending)
                {
                    Some(entry) => {
                        entry.item.status = QueueItemStatus::Uploading;
                        entry.item.attempts += 1;
                        Some((
                            entry.item.record_id.clone(),
                            entry.item.artifact.clone(),
                            entry.metadata.clone(),
                            entry.token.clone(),
                        ))
                    }
                    None => None,
                }
            };

            let Some((record_id, artifact, metadata, token)) = next else {
                self.inner.notify.notified().await;
                continue;
            };
            self.process(&record_id, &artifact, &metadata, &token).await;
        }
    }

    async fn process(
        &self,
        record_id: &str,
        artifact: &std::path::Path,
        metadata: &UploadMetadata,
        token: &str,
    ) {
        if self.is_cancelled(record_id) {
            self.clear_cancelled(record_id);
            self.finish(record_id, QueueItemStatus::Failed, Some("Upload cancelled".into()), None)
                .await;
            return;
        }

        self.inner.locks.lock(record_id);
        let mut cancel_rx = self.inner.cancel_tick.subscribe();
        let outcome = tokio::select! {
            outcome = self.inner.verifier.upload_with_retry(artifact, metadata, token) => {
                Some(outcome)
            }
            _ = self.wait_cancelled(&mut cancel_rx, record_id) => None,
        };
        self.inner.locks.unlock(record_id);

        match outcome {
            None => {
                self.clear_cancelled(record_id);
                info!("Upload for recording {record_id} aborted");
                self.finish(
                    record_id,
                    QueueItemStatus::Failed,
                    Some("Upload cancelled".into()),
                    None,
                )
                .await;
            }
            Some(outcome) if outcome.success => {
                info!("Upload for recording {record_id} complete");
                self.finish(
                    record_id,
                    QueueItemStatus::Complete,
                    None,
                    outcome.audio_file_id.clone(),
                )
                .await;
                match safe_delete_after_upload(
                    self.inner.store.as_ref(),
                    &self.inner.locks,
                    record_id,
                    &outcome,
                )
                .await
                {
                    Ok(true) => {}
                    Ok(false) => debug!("Keeping local data for recording {record_id}"),
                    Err(e) => warn!("Could not delete local data for {record_id}: {e}"),
                }
            }
            Some(outcome) => {
                warn!(
                    "Upload for recording {record_id} failed: {}",
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
                self.finish(
                    record_id,
                    QueueItemStatus::Failed,
                    outcome.error,
                    outcome.audio_file_id,
                )
                .await;
            }
        }
    }

    async fn wait_cancelled(&self, rx: &mut watch::Receiver<u64>, record_id: &str) {
        loop {
            if self.is_cancelled(record_id) {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender lives as long as the queue; park if it is ever gone.
                std::future::pending::<()>().await;
            }
        }
    }

    async fn finish(
        &self,
        record_id: &str,
        status: QueueItemStatus,
        error: Option<String>,
        audio_file_id: Option<String>,
    ) {
        let mut entries = self.inner.entries.lock().await;
        if let Some(entry) = entries
            .iter_mut()
            .find(|e| e.item.record_id == record_id)
        {
            entry.item.status = status;
            entry.item.error = error;
            if audio_file_id.is_some() {
                entry.item.audio_file_id = audio_file_id;
            }
        }
    }
}
