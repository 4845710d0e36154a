use crate::session::RecorderConfig;
use crate::storage::StorageThresholds;
use crate::upload::UploadConfig;
use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub recording: RecordingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub upload: UploadSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct RecordingConfig {
    pub root_path: String,
    #[serde(default = "defaults::chunk_interval_secs")]
    pub chunk_interval_secs: u64,
    #[serde(default = "defaults::max_session_secs")]
    pub max_session_secs: u64,
    #[serde(default = "defaults::save_retry_delays_ms")]
    pub save_retry_delays_ms: Vec<u64>,
    #[serde(default = "defaults::stale_chunk_secs")]
    pub stale_chunk_secs: u64,
    #[serde(default = "defaults::interruption_grace_secs")]
    pub interruption_grace_secs: u64,
    #[serde(default = "defaults::gap_warn_limit")]
    pub gap_warn_limit: usize,
    #[serde(default = "defaults::min_artifact_bytes")]
    pub min_artifact_bytes: u64,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "defaults::low_mb")]
    pub low_mb: u64,
    #[serde(default = "defaults::critical_mb")]
    pub critical_mb: u64,
    #[serde(default = "defaults::poll_secs")]
    pub poll_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            low_mb: defaults::low_mb(),
            critical_mb: defaults::critical_mb(),
            poll_secs: defaults::poll_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadSettings {
    pub api_url: String,
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,
    #[serde(default = "defaults::initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "defaults::max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "defaults::poll_attempts")]
    pub poll_attempts: u32,
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,
}

mod defaults {
    pub fn chunk_interval_secs() -> u64 {
        5
    }
    pub fn max_session_secs() -> u64 {
        17_700
    }
    pub fn save_retry_delays_ms() -> Vec<u64> {
        vec![1000, 2000, 4000]
    }
    pub fn stale_chunk_secs() -> u64 {
        15
    }
    pub fn interruption_grace_secs() -> u64 {
        5
    }
    pub fn gap_warn_limit() -> usize {
        5
    }
    pub fn min_artifact_bytes() -> u64 {
        1024
    }
    pub fn low_mb() -> u64 {
        500
    }
    pub fn critical_mb() -> u64 {
        100
    }
    pub fn poll_secs() -> u64 {
        30
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn initial_retry_delay_ms() -> u64 {
        1000
    }
    pub fn max_retry_delay_ms() -> u64 {
        30_000
    }
    pub fn poll_attempts() -> u32 {
        15
    }
    pub fn poll_interval_ms() -> u64 {
        2000
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            max_session_secs: self.recording.max_session_secs,
            save_retry_delays: self
                .recording
                .save_retry_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            stale_chunk_threshold: Duration::from_secs(self.recording.stale_chunk_secs),
            interruption_grace: Duration::from_secs(self.recording.interruption_grace_secs),
            storage_thresholds: StorageThresholds {
                low_mb: self.storage.low_mb,
                critical_mb: self.storage.critical_mb,
            },
            storage_poll_interval: Duration::from_secs(self.storage.poll_secs),
            gap_warn_limit: self.recording.gap_warn_limit,
            min_artifact_bytes: self.recording.min_artifact_bytes,
            platform: std::env::consts::OS.to_string(),
        }
    }

    pub fn upload_config(&self) -> UploadConfig {
        UploadConfig {
            max_retries: self.upload.max_retries,
            initial_retry_delay: Duration::from_millis(self.upload.initial_retry_delay_ms),
            max_retry_delay: Duration::from_millis(self.upload.max_retry_delay_ms),
            poll_attempts: self.upload.poll_attempts,
            poll_interval: Duration::from_millis(self.upload.poll_interval_ms),
        }
    }
}
