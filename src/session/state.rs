use crate::integrity::RecordingManifest;
use crate::storage::StorageStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Recording lifecycle states.
///
/// The interrupted condition is orthogonal: a session can be `Recording` in
/// the store while the capture primitive is dead, and the UI should be able
/// to show "was recording, now dead" rather than a silent flip to stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Idle,
    Recording,
    Paused,
    Stopped,
    Uploading,
    Uploaded,
    Recovered,
    Error,
}

/// Why a recording was flagged as interrupted or force-stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterruptionReason {
    RecorderDead,
    StaleChunks,
    InterruptionNotResumed,
    TrackEnded,
    BackgroundDeath,
    StorageCritical,
    BatteryCritical,
}

/// Snapshot taken when an interruption is detected. Once set, the session
/// must not silently resume; only stop+recover or emergency stop resolve it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptionRecord {
    pub reason: InterruptionReason,
    pub chunk_count: u64,
    pub last_chunk_at: Option<DateTime<Utc>>,
    pub detected_at: DateTime<Utc>,
}

/// Session metadata persisted alongside chunks so a crashed or backgrounded
/// process can be recovered on relaunch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub id: String,
    pub user_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub status: RecordingStatus,
    pub chunk_count: u64,
    pub duration_secs: u64,
    pub integrity: RecordingManifest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interruption: Option<InterruptionRecord>,
    pub platform: String,
    pub version: String,
    pub last_updated: DateTime<Utc>,
}

/// History handoff record emitted on stop or recovery for the surrounding
/// application to persist and display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingRecord {
    pub id: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub duration_secs: u64,
    pub file_size: u64,
    pub file_path: PathBuf,
    pub upload_status: String,
    #[serde(default)]
    pub recovered: bool,
}

/// Outcome of a single chunk save, including its retry history.
#[derive(Debug, Clone)]
pub struct SaveChunkOutcome {
    pub success: bool,
    pub index: u64,
    pub retries_exhausted: bool,
    pub error: Option<String>,
}

/// Outcome of stopping a recording.
///
/// `partial_recovery` tells the caller that chunks exist even though
/// combination failed, so chunk-level recovery beats writing off the session.
#[derive(Debug, Clone)]
pub struct StopOutcome {
    pub success: bool,
    pub file_path: Option<PathBuf>,
    pub warning: Option<String>,
    pub error: Option<String>,
    pub partial_recovery: bool,
    pub chunk_count: u64,
    pub record_id: Option<String>,
}

/// Point-in-time view of the session service, for status queries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub record_id: Option<String>,
    pub status: RecordingStatus,
    pub duration_secs: u64,
    pub chunk_index: u64,
    pub storage_status: StorageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interruption: Option<InterruptionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Typed events emitted by the recorder service.
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    StateChanged { status: RecordingStatus },
    /// Host collaborators (window-close guard, foreground service) key off
    /// whether a session is active.
    SessionActive { active: bool },
    ChunkSaved { index: u64, size: u64 },
    DurationUpdated { seconds: u64 },
    StorageStatusChanged { status: StorageStatus, free_mb: u64 },
    Interrupted { record: InterruptionRecord },
    SplitCompleted { artifact: PathBuf },
    EmergencyStopped { reason: InterruptionReason, message: String },
    RecordingFinished { record: RecordingRecord },
}
