use super::StorageAdapter;
use crate::session::SessionMetadata;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// Host-supplied free-space query for the recording root.
pub type FreeSpaceProbe = Arc<dyn Fn(&Path) -> Result<u64> + Send + Sync>;

/// Free space assumed when no probe is installed. Hosts that cannot report
/// disk space get the monitor's degrade-to-allow behavior instead of a
/// spurious emergency stop.
const DEFAULT_FREE_SPACE_BYTES: u64 = 10 * 1024 * 1024 * 1024;

const CHUNK_PREFIX: &str = "chunk_";
const CHUNK_EXT: &str = ".bin";
const METADATA_FILE: &str = "metadata.json";

/// Local-filesystem storage adapter.
///
/// Layout: `<root>/<session_id>/chunks/chunk_NNNNNN.bin` for chunk payloads,
/// `<root>/<session_id>/metadata.json` for session metadata, and artifacts
/// directly under `<root>/<session_id>/`.
pub struct FsStorageAdapter {
    root: PathBuf,
    free_space_probe: Option<FreeSpaceProbe>,
}

impl FsStorageAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).context("Failed to create recordings root directory")?;
        info!("Filesystem storage adapter initialized at {:?}", root);
        Ok(Self {
            root,
            free_space_probe: None,
        })
    }

    /// Install a host-specific free-space query.
    pub fn with_free_space_probe(mut self, probe: FreeSpaceProbe) -> Self {
        self.free_space_probe = Some(probe);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }

    fn chunks_dir(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("chunks")
    }

    fn chunk_path(&self, session_id: &str, index: u64) -> PathBuf {
        self.chunks_dir(session_id)
            .join(format!("{CHUNK_PREFIX}{index:06}{CHUNK_EXT}"))
    }

    fn parse_chunk_index(file_name: &str) -> Option<u64> {
        file_name
            .strip_prefix(CHUNK_PREFIX)?
            .strip_suffix(CHUNK_EXT)?
            .parse()
            .ok()
    }
}

#[async_trait::async_trait]
impl StorageAdapter for FsStorageAdapter {
    async fn save_chunk(&self, session_id: &str, index: u64, data: &[u8]) -> Result<()> {
        let dir = self.chunks_dir(session_id);
        fs::create_dir_all(&dir)
            .await
            .context("Failed to create chunks directory")?;

        let path = self.chunk_path(session_id, index);
        fs::write(&path, data)
            .await
            .with_context(|| format!("Failed to write chunk {index} for session {session_id}"))?;

        debug!("Chunk {} saved ({} bytes): {:?}", index, data.len(), path);
        Ok(())
    }

    async fn read_chunk(&self, session_id: &str, index: u64) -> Result<Vec<u8>> {
        let path = self.chunk_path(session_id, index);
        fs::read(&path)
            .await
            .with_context(|| format!("Failed to read chunk {index} for session {session_id}"))
    }

    async fn list_chunks(&self, session_id: &str) -> Result<Vec<u64>> {
        let dir = self.chunks_dir(session_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut indices = Vec::new();
        let mut entries = fs::read_dir(&dir)
            .await
            .context("Failed to list chunks directory")?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(index) = Self::parse_chunk_index(&name.to_string_lossy()) {
                indices.push(index);
            }
        }

        indices.sort_unstable();
        Ok(indices)
    }

    async fn delete_chunk(&self, session_id: &str, index: u64) -> Result<()> {
        let path = self.chunk_path(session_id, index);
        fs::remove_file(&path)
            .await
            .with_context(|| format!("Failed to delete chunk {index} for session {session_id}"))
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let dir = self.session_dir(session_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to delete session {session_id}"))?;
        }
        Ok(())
    }

    async fn write_artifact(&self, session_id: &str, name: &str, data: &[u8]) -> Result<PathBuf> {
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir)
            .await
            .context("Failed to create session directory")?;

        let path = dir.join(name);
        fs::write(&path, data)
            .await
            .with_context(|| format!("Failed to write artifact {name} for session {session_id}"))?;
        Ok(path)
    }

    async fn read_artifact(&self, session_id: &str, name: &str) -> Result<Vec<u8>> {
        let path = self.session_dir(session_id).join(name);
        fs::read(&path)
            .await
            .with_context(|| format!("Failed to read artifact {name} for session {session_id}"))
    }

    async fn list_artifacts(&self, session_id: &str) -> Result<Vec<String>> {
        let dir = self.session_dir(session_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut entries = fs::read_dir(&dir)
            .await
            .context("Failed to list session directory")?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name != METADATA_FILE {
                    names.push(name);
                }
            }
        }

        names.sort();
        Ok(names)
    }

    async fn delete_artifact(&self, session_id: &str, name: &str) -> Result<()> {
        let path = self.session_dir(session_id).join(name);
        fs::remove_file(&path)
            .await
            .with_context(|| format!("Failed to delete artifact {name} for session {session_id}"))
    }

    async fn save_metadata(&self, session_id: &str, metadata: &SessionMetadata) -> Result<()> {
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir)
            .await
            .context("Failed to create session directory")?;

        let json = serde_json::to_vec_pretty(metadata).context("Failed to encode metadata")?;
        fs::write(dir.join(METADATA_FILE), json)
            .await
            .with_context(|| format!("Failed to write metadata for session {session_id}"))
    }

    async fn load_metadata(&self, session_id: &str) -> Result<Option<SessionMetadata>> {
        let path = self.session_dir(session_id).join(METADATA_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path)
            .await
            .with_context(|| format!("Failed to read metadata for session {session_id}"))?;
        let metadata = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse metadata for session {session_id}"))?;
        Ok(Some(metadata))
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let mut sessions = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .context("Failed to list recordings root")?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                sessions.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        sessions.sort();
        Ok(sessions)
    }

    async fn free_space_bytes(&self) -> Result<u64> {
        match &self.free_space_probe {
            Some(probe) => probe(&self.root),
            None => Ok(DEFAULT_FREE_SPACE_BYTES),
        }
    }
}
