//! Chunk and recording integrity verification.
//!
//! Two tiers of checksums: CRC32C for cheap per-chunk verification (collision
//! risk acceptable, speed matters at a 5-second save cadence) and SHA-256 for
//! whole-file verification before trusting server persistence.

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Fast order-sensitive checksum as a fixed-length lowercase hex token.
pub fn fast_checksum(data: &[u8]) -> String {
    format!("{:08x}", crc32c::crc32c(data))
}

/// Cryptographic digest for whole-file verification, lowercase hex.
pub fn secure_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Integrity record for a single persisted chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub index: u64,
    pub size: u64,
    pub checksum: String,
    pub timestamp: DateTime<Utc>,
}

impl ChunkRecord {
    /// Build the record for a chunk before it is handed to storage.
    pub fn new(index: u64, data: &[u8]) -> Self {
        Self {
            index,
            size: data.len() as u64,
            checksum: fast_checksum(data),
            timestamp: Utc::now(),
        }
    }
}

/// Result of verifying one chunk against its record.
#[derive(Debug, Clone, Default)]
pub struct ChunkVerification {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Check a chunk's bytes against its integrity record.
///
/// Size and checksum are reported independently so diagnostics can tell
/// truncation apart from corruption.
pub fn verify_chunk(data: &[u8], record: &ChunkRecord) -> ChunkVerification {
    let mut errors = Vec::new();

    if data.len() as u64 != record.size {
        errors.push(format!(
            "Size mismatch: expected {}, got {}",
            record.size,
            data.len()
        ));
    }

    let actual = fast_checksum(data);
    if actual != record.checksum {
        errors.push(format!(
            "Checksum mismatch: expected {}, got {}",
            record.checksum, actual
        ));
    }

    ChunkVerification {
        valid: errors.is_empty(),
        errors,
    }
}

/// Per-session integrity manifest, built incrementally as chunks are saved
/// and finalized once combination completes.
///
/// Updates construct a new value rather than mutating in place, so a caller
/// holding an earlier manifest still sees a consistent snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingManifest {
    pub session_id: String,
    pub chunks: Vec<ChunkRecord>,
    pub total_size: u64,
    pub combined_crc32: Option<String>,
    pub combined_sha256: Option<String>,
}

impl RecordingManifest {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            chunks: Vec::new(),
            total_size: 0,
            combined_crc32: None,
            combined_sha256: None,
        }
    }

    /// Return a new manifest with `record` appended.
    pub fn with_chunk(&self, record: ChunkRecord) -> Self {
        let mut chunks = self.chunks.clone();
        let total_size = self.total_size + record.size;
        chunks.push(record);
        Self {
            chunks,
            total_size,
            ..self.clone()
        }
    }

    /// Return a new manifest carrying the whole-file checksums computed at
    /// combine time.
    pub fn finalized(&self, combined_crc32: String, combined_sha256: String) -> Self {
        Self {
            combined_crc32: Some(combined_crc32),
            combined_sha256: Some(combined_sha256),
            ..self.clone()
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

/// Outcome of verifying every chunk listed in a manifest.
#[derive(Debug, Clone, Default)]
pub struct RecordingVerification {
    pub valid: bool,
    pub invalid_indices: Vec<u64>,
    pub errors: Vec<String>,
}

/// Async chunk reader injected by the caller, keyed by chunk index.
pub type ChunkReader<'a> = Box<dyn Fn(u64) -> BoxFuture<'a, Result<Vec<u8>>> + Send + Sync + 'a>;

/// Verify every chunk in the manifest through an injected reader.
///
/// Failures are accumulated rather than aborting on the first one: a partial
/// corruption report is more useful than a first-failure abort.
pub async fn verify_recording(
    read_chunk: ChunkReader<'_>,
    manifest: &RecordingManifest,
) -> RecordingVerification {
    let mut invalid_indices = Vec::new();
    let mut errors = Vec::new();

    for record in &manifest.chunks {
        match read_chunk(record.index).await {
            Ok(data) => {
                let result = verify_chunk(&data, record);
                if !result.valid {
                    invalid_indices.push(record.index);
                    errors.push(format!("Chunk {}: {}", record.index, result.errors.join(", ")));
                }
            }
            Err(e) => {
                invalid_indices.push(record.index);
                errors.push(format!("Chunk {}: failed to read - {}", record.index, e));
            }
        }
    }

    RecordingVerification {
        valid: invalid_indices.is_empty(),
        invalid_indices,
        errors,
    }
}

/// Algorithm tag used for upload checksums.
const UPLOAD_CHECKSUM_ALGORITHM: &str = "sha256";

/// Checksum sent alongside an upload, in self-describing
/// `"<algorithm>:<hexdigest>"` form.
pub fn upload_checksum(data: &[u8]) -> String {
    format!("{}:{}", UPLOAD_CHECKSUM_ALGORITHM, secure_hash(data))
}

/// Verify a server-reported checksum against local bytes.
///
/// A missing or foreign algorithm tag fails verification rather than being
/// guessed at.
pub fn verify_upload_checksum(data: &[u8], server_checksum: &str) -> bool {
    let prefix = format!("{}:", UPLOAD_CHECKSUM_ALGORITHM);
    let Some(expected) = server_checksum.strip_prefix(&prefix) else {
        tracing::warn!("Invalid or missing server checksum format: {server_checksum:?}");
        return false;
    };
    secure_hash(data) == expected.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_checksum_is_deterministic_hex() {
        let a = fast_checksum(b"hello");
        let b = fast_checksum(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(fast_checksum(b"hello"), fast_checksum(b"hellp"));
    }

    #[test]
    fn secure_hash_is_64_hex() {
        let h = secure_hash(b"payload");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn chunk_round_trip_verifies() {
        let data = b"some chunk bytes";
        let record = ChunkRecord::new(3, data);
        let result = verify_chunk(data, &record);
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn mutated_byte_fails_checksum_only() {
        let data = b"some chunk bytes".to_vec();
        let record = ChunkRecord::new(0, &data);

        let mut mutated = data.clone();
        mutated[4] ^= 0xff;
        let result = verify_chunk(&mutated, &record);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("Checksum mismatch"));
    }

    #[test]
    fn truncation_reports_both_errors() {
        let data = b"some chunk bytes".to_vec();
        let record = ChunkRecord::new(0, &data);

        let result = verify_chunk(&data[..8], &record);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].contains("Size mismatch"));
        assert!(result.errors[1].contains("Checksum mismatch"));
    }

    #[test]
    fn manifest_updates_are_immutable() {
        let manifest = RecordingManifest::new("rec-1");
        let grown = manifest.with_chunk(ChunkRecord::new(0, b"abc"));

        assert_eq!(manifest.chunk_count(), 0);
        assert_eq!(manifest.total_size, 0);
        assert_eq!(grown.chunk_count(), 1);
        assert_eq!(grown.total_size, 3);
    }

    #[test]
    fn upload_checksum_round_trip() {
        let data = b"final artifact";
        let checksum = upload_checksum(data);
        assert!(checksum.starts_with("sha256:"));
        assert!(verify_upload_checksum(data, &checksum));

        let mut mutated = data.to_vec();
        mutated[0] ^= 1;
        assert!(!verify_upload_checksum(&mutated, &checksum));
    }

    #[test]
    fn foreign_algorithm_tag_fails_verification() {
        assert!(!verify_upload_checksum(b"data", "md5:abcdef"));
        assert!(!verify_upload_checksum(b"data", "deadbeef"));
    }
}
