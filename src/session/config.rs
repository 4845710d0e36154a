use crate::storage::StorageThresholds;
use std::time::Duration;

/// Runtime knobs for the recorder service.
///
/// The ceilings and schedules here are deployment tuning, not protocol
/// constants; defaults match the shipped client behavior.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Auto-split ceiling. 4h55m stays safely under common container/codec
    /// duration limits.
    pub max_session_secs: u64,

    /// Delays between chunk-save retries. Length bounds the retry count.
    pub save_retry_delays: Vec<Duration>,

    /// No new chunk for this long while recording means the capture
    /// primitive has silently died.
    pub stale_chunk_threshold: Duration,

    /// How long an interruption (phone call, OS suspend) may stay
    /// unresolved before it counts as a death.
    pub interruption_grace: Duration,

    /// Free-space tiers for the storage monitor.
    pub storage_thresholds: StorageThresholds,

    /// Storage monitor poll interval.
    pub storage_poll_interval: Duration,

    /// How many missing indices a gap warning names before truncating.
    pub gap_warn_limit: usize,

    /// Combined artifacts smaller than this are rejected as empty.
    pub min_artifact_bytes: u64,

    /// Host platform tag persisted in session metadata.
    pub platform: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_session_secs: 4 * 3600 + 55 * 60, // 17,700s = 4h55m
            save_retry_delays: vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
            ],
            stale_chunk_threshold: Duration::from_secs(15),
            interruption_grace: Duration::from_secs(5),
            storage_thresholds: StorageThresholds::default(),
            storage_poll_interval: Duration::from_secs(30),
            gap_warn_limit: 5,
            min_artifact_bytes: 1024,
            platform: std::env::consts::OS.to_string(),
        }
    }
}
