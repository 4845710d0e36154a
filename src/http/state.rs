use crate::session::RecorderService;
use crate::upload::UploadQueue;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The one recorder service this process runs
    pub recorder: RecorderService,
    /// Background upload queue
    pub uploads: UploadQueue,
}

impl AppState {
    pub fn new(recorder: RecorderService, uploads: UploadQueue) -> Self {
        Self { recorder, uploads }
    }
}
