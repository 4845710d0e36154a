//! Disk-space checks and runtime storage monitoring.
//!
//! A pre-recording check gates session start; a background poll watches free
//! space during recording and reports status transitions so the session
//! service can warn or emergency-stop.

use crate::store::StorageAdapter;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Storage status tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageStatus {
    Ok,
    Low,
    Critical,
}

/// Free-space thresholds, in megabytes.
#[derive(Debug, Clone, Copy)]
pub struct StorageThresholds {
    /// Below this, recording start is still allowed but warned about.
    pub low_mb: u64,
    /// Below this, recording must not start and an active one is force-stopped.
    pub critical_mb: u64,
}

impl Default for StorageThresholds {
    fn default() -> Self {
        Self {
            low_mb: 500,
            critical_mb: 100,
        }
    }
}

impl StorageThresholds {
    pub fn classify(&self, free_mb: u64) -> StorageStatus {
        if free_mb < self.critical_mb {
            StorageStatus::Critical
        } else if free_mb < self.low_mb {
            StorageStatus::Low
        } else {
            StorageStatus::Ok
        }
    }
}

/// Result of a pre-recording storage check.
#[derive(Debug, Clone)]
pub struct StorageCheck {
    pub can_start: bool,
    pub status: StorageStatus,
    pub free_mb: i64,
    pub message: Option<String>,
}

/// Check whether there is enough space to start recording.
///
/// An unanswerable query degrades to allow-with-warning rather than blocking
/// the user on hosts that cannot report free space.
pub async fn check_storage(
    store: &dyn StorageAdapter,
    thresholds: StorageThresholds,
) -> StorageCheck {
    let free_mb = match store.free_space_bytes().await {
        Ok(bytes) => bytes / (1024 * 1024),
        Err(e) => {
            warn!("Could not verify available storage: {e}");
            return StorageCheck {
                can_start: true,
                status: StorageStatus::Ok,
                free_mb: -1,
                message: Some(
                    "Could not verify available storage. Recording may fail if storage is full."
                        .to_string(),
                ),
            };
        }
    };

    match thresholds.classify(free_mb) {
        StorageStatus::Critical => StorageCheck {
            can_start: false,
            status: StorageStatus::Critical,
            free_mb: free_mb as i64,
            message: Some(format!(
                "Cannot start recording. Only {free_mb}MB of storage remaining. \
                 Please free up at least {}MB to continue.",
                thresholds.low_mb
            )),
        },
        StorageStatus::Low => StorageCheck {
            can_start: true,
            status: StorageStatus::Low,
            free_mb: free_mb as i64,
            message: Some(format!(
                "Low storage warning: Only {free_mb}MB remaining. \
                 Recording may be interrupted if storage runs out."
            )),
        },
        StorageStatus::Ok => StorageCheck {
            can_start: true,
            status: StorageStatus::Ok,
            free_mb: free_mb as i64,
            message: None,
        },
    }
}

/// Status-transition events emitted by the monitor.
#[derive(Debug, Clone, Copy)]
pub enum StorageEvent {
    Low { free_mb: u64 },
    Critical { free_mb: u64 },
    Recovered { free_mb: u64 },
}

/// Background free-space poller.
///
/// Emits an event only when the status tier changes, so the consumer sees
/// transitions rather than a heartbeat.
pub struct StorageMonitor {
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Default for StorageMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageMonitor {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start polling. Returns the initial check so the caller can refuse to
    /// start recording on critical storage without waiting a poll interval.
    pub async fn start(
        &self,
        store: Arc<dyn StorageAdapter>,
        thresholds: StorageThresholds,
        poll_interval: Duration,
        events: mpsc::Sender<StorageEvent>,
    ) -> StorageCheck {
        let initial = check_storage(store.as_ref(), thresholds).await;

        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Storage monitor already running");
            return initial;
        }

        info!("Storage monitor started ({}MB free)", initial.free_mb);

        let running = Arc::clone(&self.running);
        let mut previous = initial.status;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick fires immediately

            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let check = check_storage(store.as_ref(), thresholds).await;
                if check.free_mb < 0 {
                    continue;
                }
                let free_mb = check.free_mb as u64;

                if check.status != previous {
                    let event = match check.status {
                        StorageStatus::Critical => {
                            warn!("Storage critical: only {free_mb}MB remaining");
                            Some(StorageEvent::Critical { free_mb })
                        }
                        StorageStatus::Low => {
                            warn!("Storage low: only {free_mb}MB remaining");
                            Some(StorageEvent::Low { free_mb })
                        }
                        StorageStatus::Ok => {
                            info!("Storage recovered: {free_mb}MB available");
                            Some(StorageEvent::Recovered { free_mb })
                        }
                    };
                    if let Some(event) = event {
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                    previous = check.status;
                }
            }
        });

        *self.handle.lock().await = Some(task);
        initial
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.handle.lock().await.take() {
            task.abort();
        }
        info!("Storage monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_classify_tiers() {
        let t = StorageThresholds::default();
        assert_eq!(t.classify(10_000), StorageStatus::Ok);
        assert_eq!(t.classify(499), StorageStatus::Low);
        assert_eq!(t.classify(99), StorageStatus::Critical);
        assert_eq!(t.classify(500), StorageStatus::Ok);
        assert_eq!(t.classify(100), StorageStatus::Low);
    }
}
