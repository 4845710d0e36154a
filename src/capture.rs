//! Capture collaborator interface.
//!
//! The host platform owns the actual audio capture primitive (media recorder,
//! foreground service, system tap). The core only needs a liveness view of it:
//! chunk delivery is the host pushing bytes into `RecorderService::save_chunk`.

use async_trait::async_trait;

/// What the capture primitive reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Inactive,
    Recording,
    Paused,
}

/// Liveness query over the host capture primitive.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    async fn status(&self) -> CaptureStatus;
}
