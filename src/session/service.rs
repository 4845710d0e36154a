use super::config::RecorderConfig;
use super::state::{
    InterruptionReason, InterruptionRecord, RecorderEvent, RecordingRecord, RecordingStatus,
    SaveChunkOutcome, SessionMetadata, SessionSnapshot, StopOutcome,
};
use crate::capture::CaptureStatus;
use crate::combine::{self, CombineConfig};
use crate::integrity::{ChunkRecord, RecordingManifest};
use crate::storage::{check_storage, StorageEvent, StorageMonitor, StorageStatus};
use crate::store::StorageAdapter;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Mutable view of the one session the service manages at a time.
#[derive(Debug)]
struct SessionState {
    record_id: Option<String>,
    user_id: Option<String>,
    status: RecordingStatus,
    started_at: Option<DateTime<Utc>>,
    duration_secs: u64,
    chunk_index: u64,
    last_chunk_at: Option<DateTime<Utc>>,
    manifest: Option<RecordingManifest>,
    storage_status: StorageStatus,
    interruption: Option<InterruptionRecord>,
    /// Set when the host reports a resumable interruption (phone call, OS
    /// suspend). Cleared on resume; a death once the grace window elapses.
    pending_interruption_at: Option<DateTime<Utc>>,
    error: Option<String>,
    /// Auto-splits triggered so far; drives the next split threshold.
    splits_triggered: u32,
}

impl SessionState {
    fn idle() -> Self {
        Self {
            record_id: None,
            user_id: None,
            status: RecordingStatus::Idle,
            started_at: None,
            duration_secs: 0,
            chunk_index: 0,
            last_chunk_at: None,
            manifest: None,
            storage_status: StorageStatus::Ok,
            interruption: None,
            pending_interruption_at: None,
            error: None,
            splits_triggered: 0,
        }
    }

    fn is_active(&self) -> bool {
        matches!(
            self.status,
            RecordingStatus::Recording | RecordingStatus::Paused
        )
    }
}

struct Inner {
    config: RecorderConfig,
    store: Arc<dyn StorageAdapter>,
    state: Mutex<SessionState>,
    /// Death handling is latched: concurrent detectors (capture poll, stale
    /// chunks, grace expiry) collapse into one interruption record.
    death_handled: AtomicBool,
    auto_splitting: AtomicBool,
    events: broadcast::Sender<RecorderEvent>,
    monitor: StorageMonitor,
}

/// Recording session service.
///
/// Owns the lifecycle state machine, chunk persistence with retry, death
/// detection, auto-split and recovery. Cheap to clone; all clones share the
/// same session.
#[derive(Clone)]
pub struct RecorderService {
    inner: Arc<Inner>,
}

impl RecorderService {
    pub fn new(config: RecorderConfig, store: Arc<dyn StorageAdapter>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                state: Mutex::new(SessionState::idle()),
                death_handled: AtomicBool::new(false),
                auto_splitting: AtomicBool::new(false),
                events,
                monitor: StorageMonitor::new(),
            }),
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn StorageAdapter> {
        &self.inner.store
    }

    /// Subscribe to service events. Slow consumers lose old events rather
    /// than backpressuring the recorder.
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: RecorderEvent) {
        // No receivers is fine; events are advisory.
        let _ = self.inner.events.send(event);
    }

    fn combine_config(&self) -> CombineConfig {
        CombineConfig {
            gap_warn_limit: self.inner.config.gap_warn_limit,
            min_artifact_bytes: self.inner.config.min_artifact_bytes,
        }
    }

    fn metadata_of(&self, state: &SessionState) -> Option<SessionMetadata> {
        let id = state.record_id.clone()?;
        let integrity = state.manifest.clone()?;
        Some(SessionMetadata {
            id,
            user_id: state.user_id.clone(),
            started_at: state.started_at.unwrap_or_else(Utc::now),
            status: state.status,
            chunk_count: state.chunk_index,
            duration_secs: state.duration_secs,
            integrity,
            interruption: state.interruption.clone(),
            platform: self.inner.config.platform.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            last_updated: Utc::now(),
        })
    }

    async fn persist_metadata(&self) {
        let metadata = {
            let state = self.inner.state.lock().await;
            self.metadata_of(&state)
        };
        if let Some(metadata) = metadata {
            if let Err(e) = self.inner.store.save_metadata(&metadata.id, &metadata).await {
                warn!("Could not persist session metadata: {e}");
            }
        }
    }

    /// Start a new recording session.
    ///
    /// Fails when a session is already active or free space is critical.
    /// Persists initial metadata before any chunk arrives so a crash right
    /// after start is still visible to recovery.
    pub async fn start_recording(&self, user_id: Option<String>) -> Result<String> {
        {
            let state = self.inner.state.lock().await;
            if state.is_active() {
                bail!("A recording is already in progress");
            }
        }

        let check = check_storage(
            self.inner.store.as_ref(),
            self.inner.config.storage_thresholds,
        )
        .await;
        if !check.can_start {
            let message = check
                .message
                .unwrap_or_else(|| "Insufficient storage to start recording".to_string());
            bail!("{message}");
        }
        if let Some(message) = &check.message {
            warn!("{message}");
        }

        let id = Uuid::new_v4().to_string();
        let metadata = {
            let mut state = self.inner.state.lock().await;
            *state = SessionState::idle();
            state.record_id = Some(id.clone());
            state.user_id = user_id;
            state.status = RecordingStatus::Recording;
            state.started_at = Some(Utc::now());
            state.storage_status = check.status;
            state.manifest = Some(RecordingManifest::new(&id));
            self.metadata_of(&state)
        };
        self.inner.death_handled.store(false, Ordering::SeqCst);
        self.inner.auto_splitting.store(false, Ordering::SeqCst);

        if let Some(metadata) = metadata {
            self.inner
                .store
                .save_metadata(&id, &metadata)
                .await
                .context("Failed to persist initial session metadata")?;
        }

        self.start_storage_monitor().await;

        info!("Recording started: session {id}");
        self.emit(RecorderEvent::StateChanged {
            status: RecordingStatus::Recording,
        });
        self.emit(RecorderEvent::SessionActive { active: true });
        Ok(id)
    }

    async fn start_storage_monitor(&self) {
        let (tx, mut rx) = mpsc::channel(8);
        let service = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                service.on_storage_event(event).await;
            }
        });

        let initial = self
            .inner
            .monitor
            .start(
                Arc::clone(&self.inner.store),
                self.inner.config.storage_thresholds,
                self.inner.config.storage_poll_interval,
                tx,
            )
            .await;
        if initial.free_mb >= 0 {
            let mut state = self.inner.state.lock().await;
            state.storage_status = initial.status;
        }
    }

    async fn on_storage_event(&self, event: StorageEvent) {
        match event {
            StorageEvent::Critical { free_mb } => {
                self.update_storage_status(StorageStatus::Critical, free_mb)
                    .await;
                self.emergency_stop(InterruptionReason::StorageCritical).await;
            }
            StorageEvent::Low { free_mb } => {
                self.update_storage_status(StorageStatus::Low, free_mb).await
            }
            StorageEvent::Recovered { free_mb } => {
                self.update_storage_status(StorageStatus::Ok, free_mb).await
            }
        }
    }

    async fn update_storage_status(&self, status: StorageStatus, free_mb: u64) {
        {
            let mut state = self.inner.state.lock().await;
            state.storage_status = status;
        }
        self.emit(RecorderEvent::StorageStatusChanged { status, free_mb });
    }

    /// Persist one capture chunk at the current index.
    ///
    /// The integrity record is built from the bytes before the first write
    /// attempt. Saves are retried on the configured delay schedule; once the
    /// schedule is exhausted the outcome reports `retries_exhausted` and the
    /// index does NOT advance, so the next chunk overwrites the hole instead
    /// of widening it.
    pub async fn save_chunk(&self, data: &[u8]) -> Result<SaveChunkOutcome> {
        let (session_id, index) = {
            let state = self.inner.state.lock().await;
            if !state.is_active() {
                bail!("No active recording session");
            }
            let id = state
                .record_id
                .clone()
                .context("Active session has no id")?;
            (id, state.chunk_index)
        };

        let record = ChunkRecord::new(index, data);
        let delays = &self.inner.config.save_retry_delays;
        let mut last_error = None;
        let mut saved = false;
        for attempt in 0..=delays.len() {
            match self.inner.store.save_chunk(&session_id, index, data).await {
                Ok(()) => {
                    saved = true;
                    break;
                }
                Err(e) => {
                    if attempt < delays.len() {
                        warn!(
                            "Chunk {index} save failed (attempt {}), retrying in {:?}: {e}",
                            attempt + 1,
                            delays[attempt]
                        );
                        last_error = Some(e.to_string());
                        tokio::time::sleep(delays[attempt]).await;
                    } else {
                        error!(
                            "Chunk {index} save failed after {} attempts: {e}",
                            delays.len() + 1
                        );
                        last_error = Some(e.to_string());
                    }
                }
            }
        }

        if !saved {
            return Ok(SaveChunkOutcome {
                success: false,
                index,
                retries_exhausted: true,
                error: last_error,
            });
        }

        let size = data.len() as u64;
        let metadata = {
            let mut state = self.inner.state.lock().await;
            // The session may have stopped or split while the save was in
            // flight; only advance if this chunk still belongs to it.
            if state.record_id.as_deref() == Some(session_id.as_str())
                && state.chunk_index == index
            {
                state.manifest = state.manifest.as_ref().map(|m| m.with_chunk(record));
                state.chunk_index = index + 1;
                state.last_chunk_at = Some(Utc::now());
                self.metadata_of(&state)
            } else {
                None
            }
        };
        if let Some(metadata) = metadata {
            if let Err(e) = self.inner.store.save_metadata(&session_id, &metadata).await {
                warn!("Could not refresh session metadata after chunk {index}: {e}");
            }
        }

        debug!("Chunk {index} saved ({size} bytes)");
        self.emit(RecorderEvent::ChunkSaved { index, size });
        Ok(SaveChunkOutcome {
            success: true,
            index,
            retries_exhausted: false,
            error: None,
        })
    }

    /// `recording -> paused`. Any other state is a no-op.
    pub async fn pause_recording(&self) {
        let changed = {
            let mut state = self.inner.state.lock().await;
            if state.status == RecordingStatus::Recording {
                state.status = RecordingStatus::Paused;
                true
            } else {
                false
            }
        };
        if changed {
            info!("Recording paused");
            self.persist_metadata().await;
            self.emit(RecorderEvent::StateChanged {
                status: RecordingStatus::Paused,
            });
        }
    }

    /// `paused -> recording`. Any other state is a no-op.
    pub async fn resume_recording(&self) {
        let changed = {
            let mut state = self.inner.state.lock().await;
            if state.status == RecordingStatus::Paused {
                state.status = RecordingStatus::Recording;
                true
            } else {
                false
            }
        };
        if changed {
            info!("Recording resumed");
            self.persist_metadata().await;
            self.emit(RecorderEvent::StateChanged {
                status: RecordingStatus::Recording,
            });
        }
    }

    /// Caller-driven duration tick. Regressions are ignored; crossing the
    /// split ceiling fires the auto-split exactly once per crossing.
    pub async fn update_duration(&self, seconds: u64) {
        let split_due = {
            let mut state = self.inner.state.lock().await;
            if !state.is_active() || seconds <= state.duration_secs {
                return;
            }
            state.duration_secs = seconds;

            let ceiling = self.inner.config.max_session_secs;
            let due = ceiling > 0
                && state.status == RecordingStatus::Recording
                && seconds >= ceiling * (u64::from(state.splits_triggered) + 1);
            if due {
                state.splits_triggered += 1;
            }
            due
        };

        self.emit(RecorderEvent::DurationUpdated { seconds });
        if split_due {
            self.split_session().await;
        }
    }

    /// Materialize the current chunk set as a numbered sub-session artifact
    /// and reset the chunk index for the next one. The final stop concatenates
    /// all sub-sessions in split order.
    async fn split_session(&self) {
        if self
            .inner
            .auto_splitting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Auto-split already in progress");
            return;
        }
        let result = self.split_session_inner().await;
        self.inner.auto_splitting.store(false, Ordering::SeqCst);
        if let Err(e) = result {
            warn!("Auto-split failed, recording continues on the current chunk set: {e}");
        }
    }

    async fn split_session_inner(&self) -> Result<()> {
        let session_id = {
            let state = self.inner.state.lock().await;
            state.record_id.clone().context("No active session")?
        };

        // Sub-session numbering follows what is already on disk, so a failed
        // earlier split never leaves a gap in the artifact sequence.
        let seq =
            combine::list_subsessions(self.inner.store.as_ref(), &session_id).await?.len() as u32;
        info!("Session {session_id} reached the split ceiling, materializing sub-session {seq}");

        let outcome = combine::build_subsession(
            self.inner.store.as_ref(),
            &session_id,
            seq,
            &self.combine_config(),
        )
        .await?;

        {
            let mut state = self.inner.state.lock().await;
            if state.record_id.as_deref() == Some(session_id.as_str()) {
                state.chunk_index = 0;
                state.manifest = Some(RecordingManifest::new(&session_id));
            }
        }
        self.persist_metadata().await;
        self.emit(RecorderEvent::SplitCompleted {
            artifact: outcome.file_path,
        });
        Ok(())
    }

    /// Stop the session and combine its chunks into the final artifact.
    ///
    /// Combination failure leaves the chunks on disk and reports
    /// `partial_recovery` when any exist, so the caller can offer chunk-level
    /// recovery instead of writing the session off.
    pub async fn stop_recording(&self) -> StopOutcome {
        let (session_id, chunk_count) = {
            let mut state = self.inner.state.lock().await;
            if !state.is_active() {
                return StopOutcome {
                    success: false,
                    file_path: None,
                    warning: None,
                    error: Some("No active recording session".to_string()),
                    partial_recovery: false,
                    chunk_count: 0,
                    record_id: state.record_id.clone(),
                };
            }
            state.status = RecordingStatus::Stopped;
            let id = match state.record_id.clone() {
                Some(id) => id,
                None => {
                    state.status = RecordingStatus::Error;
                    return StopOutcome {
                        success: false,
                        file_path: None,
                        warning: None,
                        error: Some("Active session has no id".to_string()),
                        partial_recovery: false,
                        chunk_count: 0,
                        record_id: None,
                    };
                }
            };
            (id, state.chunk_index)
        };

        self.inner.monitor.stop().await;
        self.emit(RecorderEvent::StateChanged {
            status: RecordingStatus::Stopped,
        });
        self.emit(RecorderEvent::SessionActive { active: false });

        match combine::combine_session(
            self.inner.store.as_ref(),
            &session_id,
            &self.combine_config(),
        )
        .await
        {
            Ok(outcome) => {
                let record = {
                    let mut state = self.inner.state.lock().await;
                    state.manifest = state.manifest.as_ref().map(|m| {
                        m.finalized(
                            outcome.combined_crc32.clone(),
                            outcome.combined_sha256.clone(),
                        )
                    });
                    RecordingRecord {
                        id: session_id.clone(),
                        user_id: state.user_id.clone(),
                        created_at: state.started_at.unwrap_or_else(Utc::now),
                        duration_secs: state.duration_secs,
                        file_size: outcome.total_bytes,
                        file_path: outcome.file_path.clone(),
                        upload_status: "pending".to_string(),
                        recovered: false,
                    }
                };
                self.persist_metadata().await;
                info!(
                    "Recording stopped: {:?} ({} bytes)",
                    outcome.file_path, outcome.total_bytes
                );
                self.emit(RecorderEvent::RecordingFinished {
                    record: record.clone(),
                });
                StopOutcome {
                    success: true,
                    file_path: Some(outcome.file_path),
                    warning: outcome.warning,
                    error: None,
                    partial_recovery: false,
                    chunk_count,
                    record_id: Some(session_id),
                }
            }
            Err(e) => {
                error!("Failed to combine session {session_id}: {e}");
                {
                    let mut state = self.inner.state.lock().await;
                    state.status = RecordingStatus::Error;
                    state.error = Some(e.to_string());
                }
                self.persist_metadata().await;
                self.emit(RecorderEvent::StateChanged {
                    status: RecordingStatus::Error,
                });
                StopOutcome {
                    success: false,
                    file_path: None,
                    warning: None,
                    error: Some(e.to_string()),
                    partial_recovery: chunk_count > 0,
                    chunk_count,
                    record_id: Some(session_id),
                }
            }
        }
    }

    /// Record that the capture primitive died mid-session.
    ///
    /// Idempotent: concurrent detectors produce exactly one interruption
    /// record. The session is NOT forced to stopped; the saved chunks stay
    /// recoverable and the UI decides what to present.
    pub async fn handle_recording_death(
        &self,
        reason: InterruptionReason,
        chunk_count: u64,
        last_chunk_at: Option<DateTime<Utc>>,
    ) {
        if self.inner.death_handled.swap(true, Ordering::SeqCst) {
            debug!("Recording death already handled");
            return;
        }
        warn!("Recording death detected: {reason:?} ({chunk_count} chunks saved)");
        let record = InterruptionRecord {
            reason,
            chunk_count,
            last_chunk_at,
            detected_at: Utc::now(),
        };
        {
            let mut state = self.inner.state.lock().await;
            state.interruption = Some(record.clone());
        }
        self.persist_metadata().await;
        self.emit(RecorderEvent::Interrupted { record });
    }

    /// Cross-check the capture primitive against the session state machine.
    ///
    /// Detects three silent-death shapes: capture inactive while the service
    /// believes a session is live, no chunk arriving for longer than the
    /// stale threshold, and a host interruption that never resumed within the
    /// grace window. All three funnel into `handle_recording_death`.
    pub async fn verify_capture_state(&self, capture: CaptureStatus) {
        let now = Utc::now();
        let finding = {
            let state = self.inner.state.lock().await;
            if !state.is_active() {
                None
            } else if capture == CaptureStatus::Inactive {
                Some((
                    InterruptionReason::RecorderDead,
                    state.chunk_index,
                    state.last_chunk_at,
                ))
            } else if state.status == RecordingStatus::Recording
                && state
                    .last_chunk_at
                    .or(state.started_at)
                    .map(|t| {
                        (now - t).num_milliseconds()
                            > self.inner.config.stale_chunk_threshold.as_millis() as i64
                    })
                    .unwrap_or(false)
            {
                Some((
                    InterruptionReason::StaleChunks,
                    state.chunk_index,
                    state.last_chunk_at,
                ))
            } else if state
                .pending_interruption_at
                .map(|t| {
                    (now - t).num_milliseconds()
                        > self.inner.config.interruption_grace.as_millis() as i64
                })
                .unwrap_or(false)
            {
                Some((
                    InterruptionReason::InterruptionNotResumed,
                    state.chunk_index,
                    state.last_chunk_at,
                ))
            } else {
                None
            }
        };

        if let Some((reason, chunks, last)) = finding {
            self.handle_recording_death(reason, chunks, last).await;
        }
    }

    /// The host reported a resumable interruption; start the grace window.
    pub async fn note_interruption(&self) {
        let mut state = self.inner.state.lock().await;
        if state.is_active() && state.pending_interruption_at.is_none() {
            state.pending_interruption_at = Some(Utc::now());
            info!("Interruption reported, grace window started");
        }
    }

    /// The interruption resolved in time; clear the grace window.
    pub async fn note_interruption_resolved(&self) {
        let mut state = self.inner.state.lock().await;
        if state.pending_interruption_at.take().is_some() {
            info!("Interruption resolved within grace window");
        }
    }

    /// Deliberate shutdown for conditions that make continuing harmful
    /// (critical storage, critical battery). Unlike death handling this DOES
    /// force the session to stopped, after flushing metadata so the chunks
    /// saved so far are recoverable.
    pub async fn emergency_stop(&self, reason: InterruptionReason) {
        let message = match reason {
            InterruptionReason::StorageCritical => {
                "Recording stopped: device storage is critically low. \
                 Your audio so far has been saved."
                    .to_string()
            }
            InterruptionReason::BatteryCritical => {
                "Recording stopped: battery is critically low. \
                 Your audio so far has been saved."
                    .to_string()
            }
            other => format!("Recording stopped: {other:?}"),
        };

        let acted = {
            let mut state = self.inner.state.lock().await;
            if !state.is_active() {
                false
            } else {
                state.interruption = Some(InterruptionRecord {
                    reason,
                    chunk_count: state.chunk_index,
                    last_chunk_at: state.last_chunk_at,
                    detected_at: Utc::now(),
                });
                state.status = RecordingStatus::Stopped;
                state.error = Some(message.clone());
                true
            }
        };
        if !acted {
            return;
        }

        error!("Emergency stop: {message}");
        self.persist_metadata().await;
        self.inner.monitor.stop().await;
        self.emit(RecorderEvent::StateChanged {
            status: RecordingStatus::Stopped,
        });
        self.emit(RecorderEvent::SessionActive { active: false });
        self.emit(RecorderEvent::EmergencyStopped { reason, message });
    }

    /// Scan the store for sessions a previous process left behind and
    /// recover the ones that hold audio.
    ///
    /// A session is orphaned when it is not the active one and its metadata
    /// says recording/paused or carries an interruption. Orphans with chunks
    /// or sub-session artifacts are combined and returned as recovered
    /// history records; empty orphans are deleted.
    pub async fn check_recovery_state(&self) -> Result<Vec<RecordingRecord>> {
        let active = { self.inner.state.lock().await.record_id.clone() };
        let sessions = self
            .inner
            .store
            .list_sessions()
            .await
            .context("Failed to scan sessions for recovery")?;

        let mut recovered = Vec::new();
        for session_id in sessions {
            if active.as_deref() == Some(session_id.as_str()) {
                continue;
            }
            let mut metadata = match self.inner.store.load_metadata(&session_id).await {
                Ok(Some(metadata)) => metadata,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping session {session_id} during recovery scan: {e}");
                    continue;
                }
            };
            let orphaned = matches!(
                metadata.status,
                RecordingStatus::Recording | RecordingStatus::Paused
            ) || metadata.interruption.is_some();
            if !orphaned {
                continue;
            }

            let has_chunks = !self
                .inner
                .store
                .list_chunks(&session_id)
                .await
                .unwrap_or_default()
                .is_empty();
            let has_subsessions =
                !combine::list_subsessions(self.inner.store.as_ref(), &session_id)
                    .await
                    .unwrap_or_default()
                    .is_empty();
            if !has_chunks && !has_subsessions {
                info!("Abandoning empty orphaned session {session_id}");
                if let Err(e) = self.inner.store.delete_session(&session_id).await {
                    warn!("Could not delete abandoned session {session_id}: {e}");
                }
                continue;
            }

            match combine::combine_session(
                self.inner.store.as_ref(),
                &session_id,
                &self.combine_config(),
            )
            .await
            {
                Ok(outcome) => {
                    metadata.status = RecordingStatus::Recovered;
                    metadata.integrity = metadata
                        .integrity
                        .finalized(outcome.combined_crc32.clone(), outcome.combined_sha256.clone());
                    metadata.last_updated = Utc::now();
                    if let Err(e) = self.inner.store.save_metadata(&session_id, &metadata).await {
                        warn!("Could not persist recovered metadata for {session_id}: {e}");
                    }
                    info!("Recovered session {session_id}: {:?}", outcome.file_path);
                    let record = RecordingRecord {
                        id: session_id.clone(),
                        user_id: metadata.user_id.clone(),
                        created_at: metadata.started_at,
                        duration_secs: metadata.duration_secs,
                        file_size: outcome.total_bytes,
                        file_path: outcome.file_path,
                        upload_status: "pending".to_string(),
                        recovered: true,
                    };
                    self.emit(RecorderEvent::RecordingFinished {
                        record: record.clone(),
                    });
                    recovered.push(record);
                }
                Err(e) => warn!("Could not recover session {session_id}: {e}"),
            }
        }
        Ok(recovered)
    }

    /// Mark the finished session as uploading (queue picked it up).
    pub async fn mark_uploading(&self) {
        let mut state = self.inner.state.lock().await;
        if matches!(
            state.status,
            RecordingStatus::Stopped | RecordingStatus::Recovered
        ) {
            state.status = RecordingStatus::Uploading;
            drop(state);
            self.emit(RecorderEvent::StateChanged {
                status: RecordingStatus::Uploading,
            });
        }
    }

    /// Mark the finished session as uploaded (verification passed).
    pub async fn mark_uploaded(&self) {
        let mut state = self.inner.state.lock().await;
        if state.status == RecordingStatus::Uploading {
            state.status = RecordingStatus::Uploaded;
            drop(state);
            self.emit(RecorderEvent::StateChanged {
                status: RecordingStatus::Uploaded,
            });
        }
    }

    /// Clear all session state (logout, explicit discard).
    pub async fn reset(&self) {
        self.inner.monitor.stop().await;
        {
            let mut state = self.inner.state.lock().await;
            *state = SessionState::idle();
        }
        self.inner.death_handled.store(false, Ordering::SeqCst);
        self.inner.auto_splitting.store(false, Ordering::SeqCst);
        info!("Recorder state reset");
        self.emit(RecorderEvent::StateChanged {
            status: RecordingStatus::Idle,
        });
        self.emit(RecorderEvent::SessionActive { active: false });
    }

    /// Point-in-time view for status queries.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.lock().await;
        SessionSnapshot {
            record_id: state.record_id.clone(),
            status: state.status,
            duration_secs: state.duration_secs,
            chunk_index: state.chunk_index,
            storage_status: state.storage_status,
            interruption: state.interruption.clone(),
            error: state.error.clone(),
        }
    }

    /// Release background resources. Safe to call more than once.
    pub async fn dispose(&self) {
        self.inner.monitor.stop().await;
    }
}
