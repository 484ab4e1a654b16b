/*!
 * Integration tests for parallel runs: ordering, failures and resume
 */

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use subtrans::errors::ProviderError;
use subtrans::providers::mock::{MockBehavior, MockProvider};
use subtrans::providers::TranslationProvider;
use subtrans::subtitle_processor::SubtitleEntry;
use subtrans::translation::{BatchRequest, CheckpointStore, ParallelTranslator, ProgressObserver};
use crate::common::{self, RecordingObserver};

/// Backend that answers later lines faster and tracks how many calls overlap
#[derive(Debug, Default)]
struct StaggeredProvider {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    finished: Mutex<Vec<String>>,
}

#[async_trait]
impl TranslationProvider for StaggeredProvider {
    async fn translate_batch(&self, request: &BatchRequest) -> Result<String, ProviderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let first: u64 = request.texts[0].trim_start_matches("line ").parse().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(120u64.saturating_sub(first * 5))).await;

        self.finished.lock().push(request.texts[0].clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(MockProvider::generate_numbered_response(&request.texts, request.len()))
    }

    fn name(&self) -> &str {
        "staggered"
    }
}

/// Observer that reads the global checkpoint back every time a chunk is merged
struct SnapshotWatcher {
    global_path: std::path::PathBuf,
    entries_seen: Mutex<Vec<usize>>,
}

impl ProgressObserver for SnapshotWatcher {
    fn on_status(&self, message: &str) {
        if !message.contains("merged") {
            return;
        }
        let count = std::fs::read_to_string(&self.global_path)
            .ok()
            .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok())
            .and_then(|json| json["entries"].as_array().map(|a| a.len()))
            .unwrap_or(0);
        self.entries_seen.lock().push(count);
    }
}

fn assert_sorted_and_complete(entries: &[SubtitleEntry], count: usize) {
    let indices: Vec<usize> = entries.iter().map(|e| e.seq_num).collect();
    assert_eq!(indices, (1..=count).collect::<Vec<_>>());
}

/// Test that the output is index-sorted even when chunks finish in reverse order
#[tokio::test]
async fn test_translate_withChunksFinishingOutOfOrder_shouldStaySorted() -> Result<()> {
    common::init_logging();
    let temp_dir = common::create_temp_dir()?;
    let provider = Arc::new(StaggeredProvider::default());
    let translator = ParallelTranslator::new(
        provider.clone(),
        RecordingObserver::new(),
        common::fast_settings(4, 2, 1),
    );

    let outcome = translator.translate(&common::sample_entries(20), &temp_dir.path().join("out.srt")).await?;

    assert_sorted_and_complete(&outcome.entries, 20);
    assert_eq!(outcome.translated_count(), 20);
    assert_eq!(outcome.entries[0].text, "[TRANSLATED] line 1");

    // chunk 4 starts with line 16 and answers before chunk 1
    let finished = provider.finished.lock().clone();
    let pos = |line: &str| finished.iter().position(|l| l == line).unwrap();
    assert!(pos("line 16") < pos("line 1"));
    Ok(())
}

/// Test that no more than `num_workers` chunks hit the backend at once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_translate_withMoreChunksThanWorkers_shouldBoundConcurrency() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let provider = Arc::new(StaggeredProvider::default());
    let translator = ParallelTranslator::new(
        provider.clone(),
        RecordingObserver::new(),
        common::fast_settings(3, 1, 1),
    );

    // 10 entries over 3 workers -> chunks of 3, 3, 3, 1
    let outcome = translator.translate(&common::sample_entries(10), &temp_dir.path().join("out.srt")).await?;

    assert_eq!(outcome.total_chunks, 4);
    assert_eq!(outcome.translated_count(), 10);
    assert!(provider.max_in_flight.load(Ordering::SeqCst) <= 3);
    Ok(())
}

/// Test that a chunk whose backend keeps failing keeps its original text at its own indices
#[tokio::test]
async fn test_translate_withFailingChunk_shouldKeepItsOriginals() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let mut entries = common::sample_entries(9);
    // chunk 2 covers indices 4..=6
    entries[4].text = "poison".to_string();
    let mock = MockProvider::new(MockBehavior::FailWhenContains("poison"));
    let observer = RecordingObserver::new();
    let translator = ParallelTranslator::new(Arc::new(mock), observer.clone(), common::fast_settings(3, 3, 2));

    let outcome = translator.translate(&entries, &temp_dir.path().join("out.srt")).await?;

    assert_sorted_and_complete(&outcome.entries, 9);
    assert!(outcome.failed_chunks.is_empty());
    for entry in &outcome.entries {
        let in_chunk_two = (4..=6).contains(&entry.seq_num);
        assert_eq!(entry.is_translated(), !in_chunk_two, "entry {}", entry.seq_num);
    }
    assert_eq!(outcome.entries[4].text, "poison");
    assert_eq!(observer.count("could not translate batch after 2 attempts"), 1);
    Ok(())
}

/// Test that a panicking chunk task is contained and its entries keep the original text
#[tokio::test]
async fn test_translate_withPanickingChunk_shouldFillOriginals() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let mut entries = common::sample_entries(8);
    // chunk 3 covers indices 5..=6
    entries[5].text = "boom".to_string();
    let mock = MockProvider::new(MockBehavior::PanicWhenContains("boom"));
    let observer = RecordingObserver::new();
    let translator = ParallelTranslator::new(Arc::new(mock), observer.clone(), common::fast_settings(4, 2, 1));

    let outcome = translator.translate(&entries, &temp_dir.path().join("out.srt")).await?;

    assert_sorted_and_complete(&outcome.entries, 8);
    assert_eq!(outcome.failed_chunks, vec![3]);
    assert_eq!(outcome.entries[4], entries[4]);
    assert_eq!(outcome.entries[5], entries[5]);
    assert_eq!(outcome.translated_count(), 6);
    assert_eq!(observer.count("Chunk 3 panicked"), 1);
    Ok(())
}

/// Test that batches finished before a panic survive it and the chunk file is cleaned up
#[tokio::test]
async fn test_translate_withPanicMidChunk_shouldKeepCheckpointedBatches() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let output = temp_dir.path().join("out.srt");
    let mut entries = common::sample_entries(8);
    // a single chunk; the second batch covers indices 3..=4
    entries[3].text = "boom".to_string();
    let mock = MockProvider::new(MockBehavior::PanicWhenContains("boom"));
    let observer = RecordingObserver::new();
    let translator = ParallelTranslator::new(Arc::new(mock), observer.clone(), common::fast_settings(1, 2, 1));

    let outcome = translator.translate(&entries, &output).await?;

    assert_sorted_and_complete(&outcome.entries, 8);
    assert_eq!(outcome.failed_chunks, vec![1]);
    assert_eq!(outcome.translated_count(), 2);
    assert_eq!(outcome.entries[0].text, MockProvider::translate_text("line 1"));
    assert_eq!(outcome.entries[1].text, MockProvider::translate_text("line 2"));
    assert_eq!(outcome.entries[3], entries[3]);
    assert_eq!(observer.count("kept 2 finished entries"), 1);

    let store = CheckpointStore::for_output(&output);
    assert!(!store.chunk_path(1).exists());
    assert_eq!(store.load_global().await?.map(|saved| saved.len()), Some(8));

    store.delete_global().await?;
    assert_eq!(std::fs::read_dir(temp_dir.path())?.count(), 0);
    Ok(())
}

/// Test that the global checkpoint already holds a chunk when its merge is announced
#[tokio::test]
async fn test_translate_withThreeChunks_shouldGrowGlobalCheckpointPerMerge() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let output = temp_dir.path().join("out.srt");
    let watcher = Arc::new(SnapshotWatcher {
        global_path: CheckpointStore::for_output(&output).global_path(),
        entries_seen: Mutex::new(Vec::new()),
    });
    let translator = ParallelTranslator::new(
        Arc::new(MockProvider::working()),
        watcher.clone(),
        common::fast_settings(3, 10, 1),
    );

    let outcome = translator.translate(&common::sample_entries(9), &output).await?;

    assert_eq!(outcome.translated_count(), 9);
    assert_eq!(*watcher.entries_seen.lock(), vec![3, 6, 9]);
    Ok(())
}

/// Test that a second run over a finished checkpoint makes no backend call
#[tokio::test]
async fn test_translate_runTwice_shouldReuseCompleteCheckpoint() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let output = temp_dir.path().join("out.srt");
    let entries = common::sample_entries(12);

    let first_mock = MockProvider::working();
    let first = ParallelTranslator::new(Arc::new(first_mock.clone()), RecordingObserver::new(), common::fast_settings(3, 2, 1))
        .translate(&entries, &output)
        .await?;
    assert!(first_mock.request_count() > 0);
    assert!(!first.from_checkpoint);

    let second_mock = MockProvider::working();
    let second = ParallelTranslator::new(Arc::new(second_mock.clone()), RecordingObserver::new(), common::fast_settings(3, 2, 1))
        .translate(&entries, &output)
        .await?;

    assert_eq!(second_mock.request_count(), 0);
    assert!(second.from_checkpoint);
    assert_eq!(second.entries, first.entries);
    Ok(())
}

/// Test that an interrupted run resumes and matches an uninterrupted one
#[tokio::test]
async fn test_translate_afterInterruption_shouldOnlySendRemainingLines() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let entries = common::sample_entries(12);

    // uninterrupted reference run
    let reference = ParallelTranslator::new(Arc::new(MockProvider::working()), RecordingObserver::new(), common::fast_settings(3, 2, 1))
        .translate(&entries, &temp_dir.path().join("reference.srt"))
        .await?;

    // simulate a run that finished chunk 1 (1..=4) and half of chunk 2 (5..=6)
    let output = temp_dir.path().join("out.srt");
    let store = CheckpointStore::for_output(&output);
    store.save_global(&reference.entries[..4]).await?;
    store.save_chunk(2, &reference.entries[4..6]).await?;

    let mock = MockProvider::working();
    let observer = RecordingObserver::new();
    let resumed = ParallelTranslator::new(Arc::new(mock.clone()), observer.clone(), common::fast_settings(3, 2, 1))
        .translate(&entries, &output)
        .await?;

    assert_eq!(resumed.entries, reference.entries);
    assert_eq!(resumed.skipped_chunks, 1);
    let mut sent = mock.sent_lines();
    sent.sort();
    let mut expected: Vec<String> = (7..=12).map(|i| format!("line {}", i)).collect();
    expected.sort();
    assert_eq!(sent, expected);
    assert_eq!(observer.count("Chunk 2: resuming"), 1);
    Ok(())
}

/// Test that the global checkpoint on disk matches the final result
#[tokio::test]
async fn test_translate_withWorkingBackend_shouldLeaveMatchingGlobalCheckpoint() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let output = temp_dir.path().join("out.srt");
    let observer = RecordingObserver::new();

    let outcome = ParallelTranslator::new(Arc::new(MockProvider::working()), observer.clone(), common::fast_settings(5, 10, 0))
        .translate(&common::sample_entries(23), &output)
        .await?;

    let store = CheckpointStore::for_output(&output);
    assert_eq!(store.load_global().await?, Some(outcome.entries.clone()));
    assert_eq!(observer.count("merged"), 6);
    // each chunk reports 0/1 then 1/1
    assert_eq!(observer.progress().len(), 12);
    Ok(())
}
