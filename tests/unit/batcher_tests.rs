/*!
 * Tests for the per-chunk batch loop against the mock backend
 */

use std::sync::Arc;
use anyhow::Result;
use subtrans::providers::mock::{MockBehavior, MockProvider};
use subtrans::translation::{partition, BatchSettings, BackoffPolicy, CheckpointStore, ChunkTranslator};
use std::time::Duration;
use crate::common::{self, RecordingObserver};

fn settings(batch_size: usize, max_retries: u32) -> BatchSettings {
    BatchSettings::new(batch_size, max_retries)
        .with_backoff(BackoffPolicy::immediate())
        .with_batch_delay(Duration::ZERO)
}

/// Test that a chunk bigger than a batch is sent in batch-sized requests
#[tokio::test]
async fn test_translate_chunk_withSevenEntries_shouldSendThreeBatches() -> Result<()> {
    common::init_logging();
    let temp_dir = common::create_temp_dir()?;
    let mock = MockProvider::working();
    let observer = RecordingObserver::new();
    let store = CheckpointStore::for_output(temp_dir.path().join("out.srt"));
    let translator = ChunkTranslator::new(Arc::new(mock.clone()), store.clone(), observer.clone(), settings(3, 2));

    let chunk = partition(&common::sample_entries(7), 1).remove(0);
    let result = translator.translate_chunk(chunk).await;

    assert_eq!(mock.request_count(), 3);
    assert_eq!(result.len(), 7);
    assert!(result.iter().all(|e| e.text == MockProvider::translate_text(e.original_text.as_deref().unwrap())));
    assert_eq!(observer.progress().last(), Some(&(1, 3, 3)));
    assert!(store.load_chunk(1).await?.is_none());
    Ok(())
}

/// Test that unlimited retries keep going until the backend recovers
#[tokio::test]
async fn test_translate_batch_withUnlimitedRetries_shouldOutlastFailures() {
    let temp_dir = common::create_temp_dir().unwrap();
    // every 2nd request fails
    let mock = MockProvider::intermittent(2);
    let observer = RecordingObserver::new();
    let translator = ChunkTranslator::new(
        Arc::new(mock.clone()),
        CheckpointStore::for_output(temp_dir.path().join("out.srt")),
        observer.clone(),
        settings(4, 0),
    );

    let entries = common::sample_entries(4);
    let first = translator.translate_batch(1, &entries).await;
    let second = translator.translate_batch(1, &entries).await;

    assert_eq!(first.attempts, 1);
    assert_eq!(second.attempts, 2);
    assert_eq!(second.translated, 4);
    assert!(!second.exhausted);
    assert_eq!(observer.count("backend error"), 1);
}

/// Test that an empty answer is retried and finally accepted as all-missing
#[tokio::test]
async fn test_translate_batch_withEmptyAnswers_shouldKeepOriginals() {
    let temp_dir = common::create_temp_dir().unwrap();
    let mock = MockProvider::empty();
    let observer = RecordingObserver::new();
    let translator = ChunkTranslator::new(
        Arc::new(mock.clone()),
        CheckpointStore::for_output(temp_dir.path().join("out.srt")),
        observer.clone(),
        settings(5, 3),
    );

    let entries = common::sample_entries(5);
    let result = translator.translate_batch(2, &entries).await;

    assert_eq!(mock.request_count(), 3);
    assert_eq!(result.translated, 0);
    assert!(!result.exhausted);
    assert_eq!(result.entries, entries);
    assert_eq!(observer.count("only 0/5 translations received"), 2);
    assert_eq!(observer.count("missing translation for subtitle"), 5);
}

/// Test that the `1.` style fallback is accepted on the first attempt
#[tokio::test]
async fn test_translate_batch_withLooseNumbering_shouldAcceptAll() {
    let temp_dir = common::create_temp_dir().unwrap();
    let mock = MockProvider::new(MockBehavior::LooseNumbering);
    let translator = ChunkTranslator::new(
        Arc::new(mock.clone()),
        CheckpointStore::for_output(temp_dir.path().join("out.srt")),
        RecordingObserver::new(),
        settings(3, 2),
    );

    let result = translator.translate_batch(1, &common::sample_entries(3)).await;

    assert_eq!(mock.request_count(), 1);
    assert_eq!(result.translated, 3);
    assert_eq!(result.entries[1].text, "[TRANSLATED] line 2");
}

/// Test that an unreadable position number is reported and ignored
#[tokio::test]
async fn test_translate_batch_withOverflowingNumber_shouldWarn() {
    let temp_dir = common::create_temp_dir().unwrap();
    let mock = MockProvider::working()
        .with_custom_response(|_| "[1] uno\n[2] dos\n[99999999999999999999999] ???\n".to_string());
    let observer = RecordingObserver::new();
    let translator = ChunkTranslator::new(
        Arc::new(mock),
        CheckpointStore::for_output(temp_dir.path().join("out.srt")),
        observer.clone(),
        settings(2, 1),
    );

    let result = translator.translate_batch(1, &common::sample_entries(2)).await;

    assert_eq!(result.translated, 2);
    assert_eq!(observer.count("invalid line number"), 1);
}

/// Test that entries of other chunks found in a chunk checkpoint are ignored
#[tokio::test]
async fn test_translate_chunk_withForeignCheckpointEntries_shouldIgnoreThem() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let store = CheckpointStore::for_output(temp_dir.path().join("out.srt"));
    let entries = common::sample_entries(4);
    let chunks = partition(&entries, 2);

    // chunk 2 owns indices 3 and 4; index 1 belongs to chunk 1
    let mut foreign = entries[0].clone();
    foreign.apply_translation("stale".to_string());
    let mut own = entries[2].clone();
    own.apply_translation("ba".to_string());
    store.save_chunk(2, &[foreign, own]).await?;

    let mock = MockProvider::working();
    let translator = ChunkTranslator::new(Arc::new(mock.clone()), store, RecordingObserver::new(), settings(10, 1));
    let result = translator.translate_chunk(chunks[1].clone()).await;

    assert_eq!(mock.sent_lines(), vec!["line 4"]);
    let mut indices: Vec<usize> = result.iter().map(|e| e.seq_num).collect();
    indices.sort();
    assert_eq!(indices, vec![3, 4]);
    Ok(())
}
