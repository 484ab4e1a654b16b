/*!
 * Tests for checkpoint files on disk
 */

use std::fs;
use anyhow::Result;
use subtrans::errors::CheckpointError;
use subtrans::translation::checkpoint::CHECKPOINT_VERSION;
use subtrans::translation::CheckpointStore;
use crate::common;

/// Test the naming of checkpoint files next to the output
#[test]
fn test_checkpoint_paths_withOutputFile_shouldAppendProgressSuffix() {
    let store = CheckpointStore::for_output("/data/movie_vi.srt");

    assert_eq!(store.global_path().to_string_lossy(), "/data/movie_vi.srt.progress");
    assert_eq!(store.chunk_path(3).to_string_lossy(), "/data/movie_vi.srt.progress.chunk3");
}

/// Test that the snapshot is a versioned JSON document
#[tokio::test]
async fn test_save_global_withEntries_shouldWriteVersionedJson() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let store = CheckpointStore::for_output(temp_dir.path().join("out.srt"));
    let mut entries = common::sample_entries(2);
    entries[0].apply_translation("một".to_string());

    store.save_global(&entries).await?;

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(store.global_path())?)?;
    assert_eq!(json["version"], CHECKPOINT_VERSION);
    assert_eq!(json["entries"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(json["entries"][0]["original_text"], "line 1");
    assert!(json["entries"][1].get("original_text").is_none());

    assert_eq!(store.load_global().await?, Some(entries));
    Ok(())
}

/// Test that a truncated checkpoint is reported, not silently accepted
#[tokio::test]
async fn test_load_chunk_withTruncatedFile_shouldReturnDeserializeError() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let store = CheckpointStore::for_output(temp_dir.path().join("out.srt"));
    fs::write(store.chunk_path(1), "{\"version\":1,\"entries\":[{\"seq_num\":1")?;

    assert!(matches!(store.load_chunk(1).await, Err(CheckpointError::Deserialize { .. })));
    Ok(())
}

/// Test that clearing removes every snapshot of this output, whatever its chunk id
#[tokio::test]
async fn test_clear_all_withLeftoversFromLargerRun_shouldRemoveThemAll() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let store = CheckpointStore::for_output(temp_dir.path().join("out.srt"));
    let neighbour = CheckpointStore::for_output(temp_dir.path().join("other.srt"));
    let entries = common::sample_entries(3);

    store.save_global(&entries).await?;
    store.save_chunk(1, &entries[..1]).await?;
    store.save_chunk(3, &entries[2..]).await?;
    // left behind by an earlier run with far more workers
    store.save_chunk(40, &entries[1..2]).await?;
    neighbour.save_chunk(1, &entries[..1]).await?;
    assert!(store.has_global());

    store.clear_all().await?;

    assert!(!store.has_global());
    assert!(store.load_chunk(1).await?.is_none());
    assert!(store.load_chunk(3).await?.is_none());
    assert!(!store.chunk_path(40).exists());
    assert!(neighbour.chunk_path(1).exists());
    assert_eq!(fs::read_dir(temp_dir.path())?.count(), 1);
    Ok(())
}

/// Test that clearing an output without any snapshot is not an error
#[tokio::test]
async fn test_clear_all_withNothingSaved_shouldSucceed() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let store = CheckpointStore::for_output(temp_dir.path().join("out.srt"));

    store.clear_all().await?;

    assert!(!store.has_global());
    Ok(())
}
