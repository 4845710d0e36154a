//! Two-phase upload pipeline.
//!
//! Local deletion is gated on server-side confirmation: transmit, then poll
//! until the server says the artifact is durably stored. Servers without a
//! status endpoint degrade to trust-based acceptance, which still allows
//! deletion but is reported as unverified.

mod error;
mod locks;
mod queue;
mod transport;
mod verifier;

pub use error::{is_retryable_error, UploadError};
pub use locks::{safe_delete_after_upload, FileLocks};
pub use queue::{QueueItem, QueueItemStatus, UploadQueue};
pub use transport::{HttpUploadTransport, StatusProbe, UploadMetadata, UploadTransport};
pub use verifier::{TokenRefresh, UploadConfig, UploadOutcome, UploadVerifier};
