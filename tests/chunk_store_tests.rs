// Integration tests for the filesystem storage adapter
//
// These tests verify the on-disk layout, chunk indexing, metadata
// persistence, and session enumeration behavior.

use anyhow::Result;
use chrono::Utc;
use meeting_recorder::integrity::RecordingManifest;
use meeting_recorder::session::{RecordingStatus, SessionMetadata};
use meeting_recorder::store::{FsStorageAdapter, StorageAdapter};
use tempfile::TempDir;

fn adapter(dir: &TempDir) -> Result<FsStorageAdapter> {
    FsStorageAdapter::new(dir.path().join("recordings"))
}

fn metadata(session_id: &str, status: RecordingStatus) -> SessionMetadata {
    SessionMetadata {
        id: session_id.to_string(),
        user_id: Some("user-1".to_string()),
        started_at: Utc::now(),
        status,
        chunk_count: 0,
        duration_secs: 0,
        integrity: RecordingManifest::new(session_id),
        interruption: None,
        platform: "test".to_string(),
        version: "0.0.0".to_string(),
        last_updated: Utc::now(),
    }
}

#[tokio::test]
async fn test_chunk_round_trip() -> Result<()> {
    let dir = TempDir::new()?;
    let store = adapter(&dir)?;

    store.save_chunk("s1", 0, b"first chunk").await?;
    store.save_chunk("s1", 1, b"second chunk").await?;

    assert_eq!(store.read_chunk("s1", 0).await?, b"first chunk");
    assert_eq!(store.read_chunk("s1", 1).await?, b"second chunk");
    assert_eq!(store.list_chunks("s1").await?, vec![0, 1]);
    Ok(())
}

#[tokio::test]
async fn test_save_chunk_is_idempotent_overwrite() -> Result<()> {
    let dir = TempDir::new()?;
    let store = adapter(&dir)?;

    store.save_chunk("s1", 0, b"first write").await?;
    store.save_chunk("s1", 0, b"second write").await?;

    assert_eq!(store.read_chunk("s1", 0).await?, b"second write");
    assert_eq!(store.list_chunks("s1").await?, vec![0]);
    Ok(())
}

#[tokio::test]
async fn test_chunk_listing_is_sorted_and_ignores_strangers() -> Result<()> {
    let dir = TempDir::new()?;
    let store = adapter(&dir)?;

    for index in [7u64, 0, 3, 12] {
        store.save_chunk("s1", index, b"x").await?;
    }
    // A stray file in the chunks directory must not confuse the index parse.
    let chunks_dir = dir.path().join("recordings/s1/chunks");
    std::fs::write(chunks_dir.join("notes.txt"), b"ignore me")?;

    assert_eq!(store.list_chunks("s1").await?, vec![0, 3, 7, 12]);
    Ok(())
}

#[tokio::test]
async fn test_list_chunks_of_unknown_session_is_empty() -> Result<()> {
    let dir = TempDir::new()?;
    let store = adapter(&dir)?;
    assert!(store.list_chunks("nope").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_metadata_round_trip() -> Result<()> {
    let dir = TempDir::new()?;
    let store = adapter(&dir)?;

    assert!(store.load_metadata("s1").await?.is_none());

    let meta = metadata("s1", RecordingStatus::Recording);
    store.save_metadata("s1", &meta).await?;

    let loaded = store.load_metadata("s1").await?.expect("metadata saved");
    assert_eq!(loaded.id, "s1");
    assert_eq!(loaded.status, RecordingStatus::Recording);
    assert_eq!(loaded.user_id.as_deref(), Some("user-1"));
    Ok(())
}

#[tokio::test]
async fn test_artifacts_exclude_metadata_file() -> Result<()> {
    let dir = TempDir::new()?;
    let store = adapter(&dir)?;

    store.save_metadata("s1", &metadata("s1", RecordingStatus::Stopped)).await?;
    store.write_artifact("s1", "session_000.bin", b"a").await?;
    store.write_artifact("s1", "audio.bin", b"b").await?;

    let names = store.list_artifacts("s1").await?;
    assert_eq!(names, vec!["audio.bin", "session_000.bin"]);
    Ok(())
}

#[tokio::test]
async fn test_delete_session_removes_everything() -> Result<()> {
    let dir = TempDir::new()?;
    let store = adapter(&dir)?;

    store.save_chunk("s1", 0, b"x").await?;
    store.write_artifact("s1", "audio.bin", b"y").await?;
    assert_eq!(store.list_sessions().await?, vec!["s1"]);

    store.delete_session("s1").await?;
    assert!(store.list_sessions().await?.is_empty());
    assert!(!dir.path().join("recordings/s1").exists());
    Ok(())
}

#[tokio::test]
async fn test_free_space_uses_injected_probe() -> Result<()> {
    let dir = TempDir::new()?;
    let store = adapter(&dir)?
        .with_free_space_probe(std::sync::Arc::new(|_path| Ok(42 * 1024 * 1024)));
    assert_eq!(store.free_space_bytes().await?, 42 * 1024 * 1024);
    Ok(())
}
