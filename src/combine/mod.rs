//! Chunk reassembly.
//!
//! Chunks are concatenated byte-exact in index order, with no re-encoding.
//! Missing indices are surfaced as a warning, never as a failure: a degraded
//! recording is strictly better than none for a meeting-transcription client.
//! Auto-split materializes numbered sub-session artifacts mid-recording; the
//! final combination stacks sub-sessions first, then any trailing chunks.

use crate::integrity;
use crate::store::StorageAdapter;
use anyhow::{bail, Result};
use std::path::PathBuf;
use tracing::{info, warn};

const SUBSESSION_PREFIX: &str = "session_";
const SUBSESSION_EXT: &str = ".bin";
const COMBINED_ARTIFACT: &str = "audio.bin";

#[derive(Debug, Clone)]
pub struct CombineConfig {
    /// How many missing indices the warning names before truncating.
    pub gap_warn_limit: usize,
    /// Artifacts smaller than this are rejected as empty.
    pub min_artifact_bytes: u64,
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            gap_warn_limit: 5,
            min_artifact_bytes: 1024,
        }
    }
}

/// Result of materializing one sub-session from the current chunk set.
#[derive(Debug, Clone)]
pub struct SubsessionOutcome {
    pub name: String,
    pub file_path: PathBuf,
    pub bytes_written: u64,
    pub chunks_processed: usize,
    pub missing_indices: Vec<u64>,
    pub warning: Option<String>,
}

/// Result of the final combination.
#[derive(Debug, Clone)]
pub struct CombineOutcome {
    pub file_path: PathBuf,
    pub total_bytes: u64,
    pub chunks_processed: usize,
    pub missing_indices: Vec<u64>,
    pub warning: Option<String>,
    pub combined_crc32: String,
    pub combined_sha256: String,
}

/// Indices absent from the contiguous `0..=max` range.
pub fn detect_gaps(indices: &[u64]) -> Vec<u64> {
    let Some(&max) = indices.iter().max() else {
        return Vec::new();
    };
    (0..=max).filter(|i| !indices.contains(i)).collect()
}

/// Human-readable gap report, truncated past `limit` indices.
pub fn gap_warning(missing: &[u64], limit: usize) -> Option<String> {
    if missing.is_empty() {
        return None;
    }
    let shown: Vec<String> = missing.iter().take(limit).map(u64::to_string).collect();
    let ellipsis = if missing.len() > limit { "..." } else { "" };
    Some(format!(
        "Missing chunks detected (indices: {}{}). Audio may have gaps.",
        shown.join(", "),
        ellipsis
    ))
}

fn subsession_name(seq: u32) -> String {
    format!("{SUBSESSION_PREFIX}{seq:03}{SUBSESSION_EXT}")
}

/// Sub-session artifacts currently stacked for a session, in split order.
pub async fn list_subsessions(store: &dyn StorageAdapter, session_id: &str) -> Result<Vec<String>> {
    let names = store.list_artifacts(session_id).await?;
    Ok(names
        .into_iter()
        .filter(|n| n.starts_with(SUBSESSION_PREFIX) && n.ends_with(SUBSESSION_EXT))
        .collect())
}

/// Concatenate the session's current chunks into one sub-session artifact
/// and delete the source chunks.
///
/// Unreadable chunks are logged and skipped; only a fully unreadable set is
/// fatal. Gaps produce a warning in the outcome.
pub async fn build_subsession(
    store: &dyn StorageAdapter,
    session_id: &str,
    seq: u32,
    config: &CombineConfig,
) -> Result<SubsessionOutcome> {
    let indices = store.list_chunks(session_id).await?;
    if indices.is_empty() {
        bail!("No audio chunks found");
    }

    let missing = detect_gaps(&indices);
    let warning = gap_warning(&missing, config.gap_warn_limit);
    if let Some(w) = &warning {
        warn!("Session {session_id}: {w}");
    }

    let mut buffer = Vec::new();
    let mut processed = 0usize;
    for &index in &indices {
        match store.read_chunk(session_id, index).await {
            Ok(data) => {
                buffer.extend_from_slice(&data);
                processed += 1;
            }
            Err(e) => {
                warn!("Session {session_id}: skipping unreadable chunk {index}: {e}");
            }
        }
    }

    if processed == 0 {
        bail!("No audio chunks could be read");
    }
    if (buffer.len() as u64) < config.min_artifact_bytes {
        bail!("Recording too short or empty");
    }

    let name = subsession_name(seq);
    let file_path = store.write_artifact(session_id, &name, &buffer).await?;
    info!(
        "Combined {processed} chunks into sub-session {name} ({} bytes)",
        buffer.len()
    );

    // Chunks are only removed once the sub-session artifact is durably written.
    for &index in &indices {
        if let Err(e) = store.delete_chunk(session_id, index).await {
            warn!("Session {session_id}: could not delete chunk {index} after combine: {e}");
        }
    }

    Ok(SubsessionOutcome {
        name,
        file_path,
        bytes_written: buffer.len() as u64,
        chunks_processed: processed,
        missing_indices: missing,
        warning,
    })
}

/// Final combination: stack any trailing chunks into a last sub-session,
/// then concatenate all sub-sessions in split order into one artifact.
pub async fn combine_session(
    store: &dyn StorageAdapter,
    session_id: &str,
    config: &CombineConfig,
) -> Result<CombineOutcome> {
    let mut chunks_processed = 0usize;
    let mut missing_indices = Vec::new();
    let mut warning = None;

    let trailing = store.list_chunks(session_id).await?;
    if !trailing.is_empty() {
        let seq = list_subsessions(store, session_id).await?.len() as u32;
        match build_subsession(store, session_id, seq, config).await {
            Ok(outcome) => {
                chunks_processed = outcome.chunks_processed;
                missing_indices = outcome.missing_indices;
                warning = outcome.warning;
            }
            Err(e) => {
                // Sub-sessions from earlier auto-splits may still be usable.
                warn!("Session {session_id}: could not build sub-session from chunks: {e}");
            }
        }
    }

    let subsessions = list_subsessions(store, session_id).await?;
    if subsessions.is_empty() {
        bail!("No audio chunks found");
    }

    let mut combined = Vec::new();
    let mut readable = 0usize;
    for name in &subsessions {
        match store.read_artifact(session_id, name).await {
            Ok(data) => {
                combined.extend_from_slice(&data);
                readable += 1;
            }
            Err(e) => {
                warn!("Session {session_id}: skipping unreadable sub-session {name}: {e}");
            }
        }
    }

    if readable == 0 {
        bail!("No audio chunks could be read");
    }
    if (combined.len() as u64) < config.min_artifact_bytes {
        bail!("Recording too short or empty");
    }

    let combined_crc32 = integrity::fast_checksum(&combined);
    let combined_sha256 = integrity::secure_hash(&combined);

    let file_path = store
        .write_artifact(session_id, COMBINED_ARTIFACT, &combined)
        .await?;
    info!(
        "Session {session_id}: combined {} sub-session(s) into {:?} ({} bytes)",
        readable,
        file_path,
        combined.len()
    );

    for name in &subsessions {
        if let Err(e) = store.delete_artifact(session_id, name).await {
            warn!("Session {session_id}: could not delete sub-session {name}: {e}");
        }
    }

    Ok(CombineOutcome {
        file_path,
        total_bytes: combined.len() as u64,
        chunks_processed,
        missing_indices,
        warning,
        combined_crc32,
        combined_sha256,
    })
}
