//! Recording session management
//!
//! This module provides the `RecorderService` abstraction that manages:
//! - Session lifecycle (start, pause, resume, stop)
//! - Durable chunk persistence with retry
//! - Death detection and interruption tracking
//! - Auto-split of long recordings
//! - Crash recovery on relaunch

mod config;
mod service;
mod state;

pub use config::RecorderConfig;
pub use service::RecorderService;
pub use state::{
    InterruptionReason, InterruptionRecord, RecorderEvent, RecordingRecord, RecordingStatus,
    SaveChunkOutcome, SessionMetadata, SessionSnapshot, StopOutcome,
};
