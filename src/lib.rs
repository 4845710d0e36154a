pub mod capture;
pub mod combine;
pub mod config;
pub mod http;
pub mod integrity;
pub mod session;
pub mod storage;
pub mod store;
pub mod upload;

pub use capture::{CaptureSource, CaptureStatus};
pub use combine::{CombineConfig, CombineOutcome};
pub use config::Config;
pub use http::{create_router, AppState};
pub use integrity::{ChunkRecord, RecordingManifest};
pub use session::{
    RecorderConfig, RecorderEvent, RecorderService, RecordingRecord, RecordingStatus,
};
pub use storage::{StorageMonitor, StorageStatus, StorageThresholds};
pub use store::{FsStorageAdapter, StorageAdapter};
pub use upload::{
    FileLocks, HttpUploadTransport, UploadConfig, UploadQueue, UploadTransport, UploadVerifier,
};
