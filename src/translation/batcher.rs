/*!
 * Per-chunk batch loop.
 *
 * A `ChunkTranslator` drives one chunk to completion: it skips whatever the chunk
 * checkpoint already holds, sends the rest to the backend in fixed-size batches,
 * retries short or failed answers with exponential backoff, and saves the chunk
 * checkpoint after every batch. Nothing in here returns an error; a batch that
 * cannot be translated keeps its original text.
 */

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::providers::TranslationProvider;
use crate::subtitle_processor::SubtitleEntry;

use super::backoff::{BackoffPolicy, RetryLimit};
use super::checkpoint::CheckpointStore;
use super::observer::ProgressObserver;
use super::partition::Chunk;
use super::protocol::{parse_numbered_response, BatchRequest, ParsedResponse};

/// Settings of the per-chunk batch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    /// Lines per backend call
    pub batch_size: usize,

    /// Attempts per batch
    pub retry_limit: RetryLimit,

    /// Delay between failed attempts
    pub backoff: BackoffPolicy,

    /// Pause between two consecutive batches of a chunk
    pub batch_delay: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            retry_limit: RetryLimit::Unlimited,
            backoff: BackoffPolicy::default(),
            batch_delay: Duration::from_secs(1),
        }
    }
}

impl BatchSettings {
    /// Settings with the given batch size and configured `max_retries` (0 = unlimited)
    pub fn new(batch_size: usize, max_retries: u32) -> Self {
        Self {
            batch_size,
            retry_limit: RetryLimit::from_config(max_retries),
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_batch_delay(mut self, batch_delay: Duration) -> Self {
        self.batch_delay = batch_delay;
        self
    }
}

/// What happened to one batch
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// The batch entries, translated where a translation was accepted
    pub entries: Vec<SubtitleEntry>,

    /// How many entries received a translation
    pub translated: usize,

    /// Backend calls made for this batch
    pub attempts: u32,

    /// Whether the retry limit ran out before any answer was accepted
    pub exhausted: bool,
}

/// Translates the remaining entries of one chunk
#[derive(Clone)]
pub struct ChunkTranslator {
    provider: Arc<dyn TranslationProvider>,
    store: CheckpointStore,
    observer: Arc<dyn ProgressObserver>,
    settings: BatchSettings,
}

impl ChunkTranslator {
    pub fn new(
        provider: Arc<dyn TranslationProvider>,
        store: CheckpointStore,
        observer: Arc<dyn ProgressObserver>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            provider,
            store,
            observer,
            settings,
        }
    }

    /// Drive a chunk to completion and return all of its entries
    pub async fn translate_chunk(&self, chunk: Chunk) -> Vec<SubtitleEntry> {
        let chunk_id = chunk.id;
        let chunk_len = chunk.len();
        let mut done = self.load_checkpoint(&chunk).await;

        let done_indices: HashSet<usize> = done.iter().map(|e| e.seq_num).collect();
        let remaining: Vec<SubtitleEntry> = chunk
            .entries
            .into_iter()
            .filter(|e| !done_indices.contains(&e.seq_num))
            .collect();

        if remaining.is_empty() {
            self.observer
                .on_status(&format!("Chunk {}: already translated, nothing to do", chunk_id));
            self.delete_checkpoint(chunk_id).await;
            self.observer.on_progress(chunk_id, 1, 1);
            return done;
        }

        if !done.is_empty() {
            self.observer.on_status(&format!(
                "Chunk {}: resuming, {}/{} entries taken from checkpoint",
                chunk_id,
                done.len(),
                chunk_len
            ));
        }

        let batch_size = self.settings.batch_size.max(1);
        let total_batches = remaining.len().div_ceil(batch_size);
        self.observer.on_progress(chunk_id, 0, total_batches);

        for (batch_no, batch) in remaining.chunks(batch_size).enumerate() {
            let result = self.translate_batch(chunk_id, batch).await;
            debug!(
                "Chunk {}: batch {}/{} done, {}/{} translated in {} attempt(s)",
                chunk_id,
                batch_no + 1,
                total_batches,
                result.translated,
                batch.len(),
                result.attempts
            );
            done.extend(result.entries);

            if let Err(e) = self.store.save_chunk(chunk_id, &done).await {
                self.observer
                    .on_status(&format!("Chunk {}: could not save checkpoint: {}", chunk_id, e));
            }
            self.observer.on_progress(chunk_id, batch_no + 1, total_batches);

            if batch_no + 1 < total_batches && !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
        }

        self.delete_checkpoint(chunk_id).await;
        self.observer
            .on_status(&format!("Chunk {}: completed {} entries", chunk_id, chunk_len));
        done
    }

    /// Translate one batch, retrying short or failed answers
    pub async fn translate_batch(&self, chunk_id: usize, batch: &[SubtitleEntry]) -> BatchResult {
        let request = BatchRequest::new(batch.iter().map(|e| e.text.clone()).collect());
        let limit = self.settings.retry_limit;
        let mut attempt: u32 = 0;

        while limit.allows(attempt) {
            let last = limit.is_last(attempt);

            match self.provider.translate_batch(&request).await {
                Ok(raw) => {
                    let parsed = self.usable_translations(chunk_id, batch.len(), raw);

                    if parsed.len() * 2 < batch.len() && !last {
                        self.observer.on_status(&format!(
                            "Chunk {}: only {}/{} translations received (attempt {})",
                            chunk_id,
                            parsed.len(),
                            batch.len(),
                            attempt + 1
                        ));
                        self.wait_before_retry(chunk_id, attempt).await;
                        attempt += 1;
                        continue;
                    }

                    return self.accept(chunk_id, batch, parsed, attempt + 1);
                }
                Err(e) => {
                    self.observer.on_status(&format!(
                        "Chunk {}: {} backend error (attempt {}): {}",
                        chunk_id,
                        self.provider.name(),
                        attempt + 1,
                        e
                    ));
                    if !last {
                        self.wait_before_retry(chunk_id, attempt).await;
                    }
                    attempt += 1;
                }
            }
        }

        self.observer.on_status(&format!(
            "Chunk {}: could not translate batch after {} attempts, keeping original text",
            chunk_id, attempt
        ));
        BatchResult {
            entries: batch.to_vec(),
            translated: 0,
            attempts: attempt,
            exhausted: true,
        }
    }

    /// Parse a raw answer and keep only non-empty translations for positions of this batch
    fn usable_translations(&self, chunk_id: usize, batch_len: usize, raw: String) -> ParsedResponse {
        let mut parsed = parse_numbered_response(&raw);

        for token in &parsed.malformed_tokens {
            self.observer
                .on_status(&format!("Chunk {}: warning, invalid line number '{}'", chunk_id, token));
        }
        parsed
            .translations
            .retain(|position, text| (1..=batch_len).contains(position) && !text.is_empty());
        parsed
    }

    fn accept(&self, chunk_id: usize, batch: &[SubtitleEntry], mut parsed: ParsedResponse, attempts: u32) -> BatchResult {
        let mut entries = batch.to_vec();
        let mut translated = 0;

        for (i, entry) in entries.iter_mut().enumerate() {
            match parsed.translations.remove(&(i + 1)) {
                Some(text) => {
                    entry.apply_translation(text);
                    translated += 1;
                }
                None => self.observer.on_status(&format!(
                    "Chunk {}: missing translation for subtitle {}, keeping original text",
                    chunk_id, entry.seq_num
                )),
            }
        }

        BatchResult {
            entries,
            translated,
            attempts,
            exhausted: false,
        }
    }

    async fn wait_before_retry(&self, chunk_id: usize, attempt: u32) {
        let delay = self.settings.backoff.delay(attempt);
        self.observer.on_status(&format!(
            "Chunk {}: retrying in {:.1}s...",
            chunk_id,
            delay.as_secs_f64()
        ));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Entries of this chunk found in its checkpoint; unreadable checkpoints count as empty
    async fn load_checkpoint(&self, chunk: &Chunk) -> Vec<SubtitleEntry> {
        let own: HashSet<usize> = chunk.indices().collect();

        match self.store.load_chunk(chunk.id).await {
            Ok(Some(entries)) => {
                let mut seen = HashSet::new();
                entries
                    .into_iter()
                    .filter(|e| own.contains(&e.seq_num) && seen.insert(e.seq_num))
                    .collect()
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                self.observer.on_status(&format!(
                    "Chunk {}: ignoring unreadable checkpoint: {}",
                    chunk.id, e
                ));
                Vec::new()
            }
        }
    }

    async fn delete_checkpoint(&self, chunk_id: usize) {
        if let Err(e) = self.store.delete_chunk(chunk_id).await {
            self.observer
                .on_status(&format!("Chunk {}: could not remove checkpoint: {}", chunk_id, e));
        }
    }
}
