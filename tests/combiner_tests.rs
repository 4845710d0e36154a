// Integration tests for chunk combination
//
// These tests verify byte-exact ordered concatenation, gap reporting,
// empty/tiny-artifact rejection, and sub-session stacking.

use anyhow::Result;
use meeting_recorder::combine::{build_subsession, combine_session, CombineConfig};
use meeting_recorder::integrity;
use meeting_recorder::store::{FsStorageAdapter, StorageAdapter};
use tempfile::TempDir;

fn config() -> CombineConfig {
    CombineConfig {
        gap_warn_limit: 5,
        min_artifact_bytes: 1,
    }
}

fn adapter(dir: &TempDir) -> Result<FsStorageAdapter> {
    FsStorageAdapter::new(dir.path().join("recordings"))
}

#[tokio::test]
async fn test_combine_concatenates_in_index_order() -> Result<()> {
    let dir = TempDir::new()?;
    let store = adapter(&dir)?;

    // Saved out of order; combination must follow indices, not save order.
    store.save_chunk("s1", 2, b"CCC").await?;
    store.save_chunk("s1", 0, b"AAA").await?;
    store.save_chunk("s1", 1, b"BBB").await?;

    let outcome = combine_session(&store, "s1", &config()).await?;

    assert_eq!(outcome.chunks_processed, 3);
    assert_eq!(outcome.total_bytes, 9);
    assert!(outcome.warning.is_none());
    assert!(outcome.missing_indices.is_empty());

    let combined = std::fs::read(&outcome.file_path)?;
    assert_eq!(combined, b"AAABBBCCC");
    assert_eq!(outcome.combined_crc32, integrity::fast_checksum(b"AAABBBCCC"));
    assert_eq!(outcome.combined_sha256, integrity::secure_hash(b"AAABBBCCC"));

    // Source chunks are consumed by combination.
    assert!(store.list_chunks("s1").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_combine_reports_gaps_but_succeeds() -> Result<()> {
    let dir = TempDir::new()?;
    let store = adapter(&dir)?;

    store.save_chunk("s1", 0, b"a").await?;
    store.save_chunk("s1", 1, b"b").await?;
    store.save_chunk("s1", 4, b"e").await?;

    let outcome = combine_session(&store, "s1", &config()).await?;

    assert_eq!(outcome.missing_indices, vec![2, 3]);
    let warning = outcome.warning.expect("gap warning");
    assert_eq!(
        warning,
        "Missing chunks detected (indices: 2, 3). Audio may have gaps."
    );
    assert_eq!(std::fs::read(&outcome.file_path)?, b"abe");
    Ok(())
}

#[tokio::test]
async fn test_gap_listing_truncates_past_limit() -> Result<()> {
    let dir = TempDir::new()?;
    let store = adapter(&dir)?;

    store.save_chunk("s1", 0, b"a").await?;
    store.save_chunk("s1", 8, b"i").await?;

    let outcome = combine_session(&store, "s1", &config()).await?;
    let warning = outcome.warning.expect("gap warning");
    assert!(warning.contains("1, 2, 3, 4, 5..."));
    assert_eq!(outcome.missing_indices, vec![1, 2, 3, 4, 5, 6, 7]);
    Ok(())
}

#[tokio::test]
async fn test_combine_fails_with_no_chunks() -> Result<()> {
    let dir = TempDir::new()?;
    let store = adapter(&dir)?;

    let err = combine_session(&store, "empty", &config())
        .await
        .expect_err("must fail");
    assert!(err.to_string().contains("No audio chunks found"));
    Ok(())
}

#[tokio::test]
async fn test_tiny_artifact_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let store = adapter(&dir)?;

    store.save_chunk("s1", 0, b"too small").await?;

    let strict = CombineConfig {
        gap_warn_limit: 5,
        min_artifact_bytes: 1024,
    };
    let err = combine_session(&store, "s1", &strict)
        .await
        .expect_err("must fail");
    assert!(err.to_string().contains("Recording too short or empty"));
    Ok(())
}

#[tokio::test]
async fn test_subsessions_stack_in_split_order() -> Result<()> {
    let dir = TempDir::new()?;
    let store = adapter(&dir)?;

    // First sub-session from chunks 0..2, as the auto-split would build it.
    store.save_chunk("s1", 0, b"one-").await?;
    store.save_chunk("s1", 1, b"two-").await?;
    let first = build_subsession(&store, "s1", 0, &config()).await?;
    assert_eq!(first.name, "session_000.bin");
    assert!(store.list_chunks("s1").await?.is_empty());

    // Second sub-session after the chunk index was reset.
    store.save_chunk("s1", 0, b"three-").await?;
    let second = build_subsession(&store, "s1", 1, &config()).await?;
    assert_eq!(second.name, "session_001.bin");

    // Trailing chunks at stop time become the final sub-session.
    store.save_chunk("s1", 0, b"four").await?;

    let outcome = combine_session(&store, "s1", &config()).await?;
    assert_eq!(std::fs::read(&outcome.file_path)?, b"one-two-three-four");

    // Sub-session artifacts are consumed; only the final artifact remains.
    let artifacts = store.list_artifacts("s1").await?;
    assert_eq!(artifacts, vec!["audio.bin"]);
    Ok(())
}
