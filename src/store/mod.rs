//! Durable chunk and metadata persistence behind a single platform seam.
//!
//! Core logic never branches on host identity; each host environment supplies
//! one `StorageAdapter` implementation. The bundled `FsStorageAdapter` covers
//! desktop-style local filesystems.

mod fs;

pub use fs::{FreeSpaceProbe, FsStorageAdapter};

use crate::session::SessionMetadata;
use anyhow::Result;
use std::path::PathBuf;

/// Platform seam for chunk, artifact and metadata persistence.
///
/// `save_chunk` must be an idempotent overwrite by index: the state machine
/// retries failed saves, and a retry after a partially applied write has to be
/// safe. All operations report failures explicitly so callers can drive
/// retry/backoff.
#[async_trait::async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Persist one chunk, overwriting any previous write at the same index.
    async fn save_chunk(&self, session_id: &str, index: u64, data: &[u8]) -> Result<()>;

    /// Read one chunk back.
    async fn read_chunk(&self, session_id: &str, index: u64) -> Result<Vec<u8>>;

    /// List chunk indices present for a session, sorted ascending.
    async fn list_chunks(&self, session_id: &str) -> Result<Vec<u64>>;

    /// Delete one chunk.
    async fn delete_chunk(&self, session_id: &str, index: u64) -> Result<()>;

    /// Delete everything stored for a session.
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Write a named artifact (combined audio, sub-session files) and return
    /// its path.
    async fn write_artifact(&self, session_id: &str, name: &str, data: &[u8]) -> Result<PathBuf>;

    /// Read a named artifact back.
    async fn read_artifact(&self, session_id: &str, name: &str) -> Result<Vec<u8>>;

    /// List artifact names for a session, sorted ascending.
    async fn list_artifacts(&self, session_id: &str) -> Result<Vec<String>>;

    /// Delete a named artifact.
    async fn delete_artifact(&self, session_id: &str, name: &str) -> Result<()>;

    /// Persist session metadata JSON.
    async fn save_metadata(&self, session_id: &str, metadata: &SessionMetadata) -> Result<()>;

    /// Load session metadata, `None` if never written.
    async fn load_metadata(&self, session_id: &str) -> Result<Option<SessionMetadata>>;

    /// List session ids known to this store.
    async fn list_sessions(&self) -> Result<Vec<String>>;

    /// Free bytes available to the recording root.
    async fn free_space_bytes(&self) -> Result<u64>;
}
