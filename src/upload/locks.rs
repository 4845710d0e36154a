use super::verifier::UploadOutcome;
use crate::store::StorageAdapter;
use anyhow::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// In-process lock set keyed by session id.
///
/// Locks gate local deletion, not access: the queue locks a session while its
/// artifact is being uploaded so nothing removes the bytes out from under the
/// transfer.
#[derive(Clone, Default)]
pub struct FileLocks {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns false if the session was already locked.
    pub fn lock(&self, session_id: &str) -> bool {
        self.set().insert(session_id.to_string())
    }

    pub fn unlock(&self, session_id: &str) {
        self.set().remove(session_id);
    }

    pub fn is_locked(&self, session_id: &str) -> bool {
        self.set().contains(session_id)
    }

    pub fn can_delete(&self, session_id: &str) -> bool {
        !self.is_locked(session_id)
    }
}

/// Delete a session's local data after a successful, deletion-cleared upload.
///
/// Refuses while the session is locked, regardless of what the upload outcome
/// says. Returns whether deletion actually happened.
pub async fn safe_delete_after_upload(
    store: &dyn StorageAdapter,
    locks: &FileLocks,
    session_id: &str,
    outcome: &UploadOutcome,
) -> Result<bool> {
    if !outcome.success || !outcome.can_delete {
        return Ok(false);
    }
    if locks.is_locked(session_id) {
        warn!("Session {session_id} is locked, keeping local data");
        return Ok(false);
    }
    store.delete_session(session_id).await?;
    info!("Deleted local data for uploaded session {session_id}");
    Ok(true)
}
