/*!
 * Parallel orchestration of one translation run.
 *
 * The orchestrator partitions the entries, hands every unfinished chunk to a
 * `ChunkTranslator` running on its own tokio task, and merges the results in a
 * single collection loop as tasks finish, in whatever order they finish. At most
 * `num_workers` tasks run at once.
 *
 * All run state lives in a `RunContext` owned by that loop; worker tasks never
 * touch the accumulated result or the global checkpoint.
 */

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use log::debug;

use crate::app_config::TranslationCommonConfig;
use crate::errors::TranslationError;
use crate::providers::TranslationProvider;
use crate::subtitle_processor::{ensure_unique_indices, SubtitleEntry};

use super::backoff::BackoffPolicy;
use super::batcher::{BatchSettings, ChunkTranslator};
use super::checkpoint::CheckpointStore;
use super::merge::reconcile;
use super::observer::ProgressObserver;
use super::partition::{partition, Chunk};

/// Parameters of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Maximum number of chunks translated at the same time
    pub num_workers: usize,

    /// Per-chunk batch loop settings
    pub batch: BatchSettings,
}

impl RunSettings {
    /// Validated settings; `max_retries = 0` means unlimited
    pub fn new(num_workers: usize, batch_size: usize, max_retries: u32) -> Result<Self, TranslationError> {
        let settings = Self {
            num_workers,
            batch: BatchSettings::new(batch_size, max_retries),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Settings from the `translation.common` configuration section
    pub fn from_config(common: &TranslationCommonConfig) -> Result<Self, TranslationError> {
        Ok(Self::new(common.workers, common.batch_size, common.max_retries)?
            .with_batch_delay(Duration::from_millis(common.batch_delay_ms)))
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.batch.backoff = backoff;
        self
    }

    pub fn with_batch_delay(mut self, batch_delay: Duration) -> Self {
        self.batch.batch_delay = batch_delay;
        self
    }

    pub fn validate(&self) -> Result<(), TranslationError> {
        if self.num_workers == 0 {
            return Err(TranslationError::InvalidSettings(
                "number of workers must be at least 1".to_string(),
            ));
        }
        if self.batch.batch_size == 0 {
            return Err(TranslationError::InvalidSettings(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Phases of a run, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunPhase {
    Init,
    Planning,
    Dispatching,
    Collecting,
    Merging,
    Done,
}

/// State of one run, owned by the collection loop
#[derive(Debug)]
pub struct RunContext {
    phase: RunPhase,
    accumulated: BTreeMap<usize, SubtitleEntry>,
    total_chunks: usize,
    skipped_chunks: usize,
    merged_chunks: usize,
    failed_chunks: Vec<usize>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Init,
            accumulated: BTreeMap::new(),
            total_chunks: 0,
            skipped_chunks: 0,
            merged_chunks: 0,
            failed_chunks: Vec::new(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Move to a later phase
    pub fn advance(&mut self, phase: RunPhase) {
        debug_assert!(phase >= self.phase, "run phases only move forward");
        debug!("Run phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Replace-or-insert every entry by index
    pub fn upsert<I: IntoIterator<Item = SubtitleEntry>>(&mut self, entries: I) {
        for entry in entries {
            self.accumulated.insert(entry.seq_num, entry);
        }
    }

    /// Insert entries only where their index is still absent
    pub fn fill_missing<I: IntoIterator<Item = SubtitleEntry>>(&mut self, entries: I) {
        for entry in entries {
            self.accumulated.entry(entry.seq_num).or_insert(entry);
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.accumulated.contains_key(&index)
    }

    /// Accumulated entries, ascending by index
    pub fn snapshot(&self) -> Vec<SubtitleEntry> {
        self.accumulated.values().cloned().collect()
    }

    fn take_accumulated(&mut self) -> Vec<SubtitleEntry> {
        std::mem::take(&mut self.accumulated).into_values().collect()
    }
}

/// Result of a run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// One entry per input index, ascending by index
    pub entries: Vec<SubtitleEntry>,

    /// Chunks the input was split into
    pub total_chunks: usize,

    /// Chunks that were already complete in the global checkpoint
    pub skipped_chunks: usize,

    /// Chunks whose task failed; their entries kept the original text
    pub failed_chunks: Vec<usize>,

    /// Whether the global checkpoint already covered the whole input
    pub from_checkpoint: bool,
}

impl RunOutcome {
    fn finished(entries: Vec<SubtitleEntry>, ctx: &RunContext, from_checkpoint: bool) -> Self {
        Self {
            entries,
            total_chunks: ctx.total_chunks,
            skipped_chunks: ctx.skipped_chunks,
            failed_chunks: ctx.failed_chunks.clone(),
            from_checkpoint,
        }
    }

    /// Number of entries that carry a translation
    pub fn translated_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_translated()).count()
    }
}

/// Runs chunk translators on a bounded pool and merges their results
pub struct ParallelTranslator {
    provider: Arc<dyn TranslationProvider>,
    observer: Arc<dyn ProgressObserver>,
    settings: RunSettings,
}

impl ParallelTranslator {
    pub fn new(
        provider: Arc<dyn TranslationProvider>,
        observer: Arc<dyn ProgressObserver>,
        settings: RunSettings,
    ) -> Self {
        Self {
            provider,
            observer,
            settings,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Translate `entries`, checkpointing next to `output_path`.
    ///
    /// Only invalid settings or duplicate indices produce an error. Backend and
    /// checkpoint failures are reported through the observer and the affected
    /// entries keep their original text.
    pub async fn translate(&self, entries: &[SubtitleEntry], output_path: &Path) -> Result<RunOutcome, TranslationError> {
        self.settings.validate()?;
        ensure_unique_indices(entries)?;

        let mut ctx = RunContext::new();
        if entries.is_empty() {
            ctx.advance(RunPhase::Done);
            return Ok(RunOutcome::finished(Vec::new(), &ctx, false));
        }

        let store = CheckpointStore::for_output(output_path);
        let source_indices: HashSet<usize> = entries.iter().map(|e| e.seq_num).collect();
        ctx.upsert(
            self.load_global(&store)
                .await
                .into_iter()
                .filter(|e| source_indices.contains(&e.seq_num)),
        );

        if source_indices.iter().all(|index| ctx.contains(*index)) {
            self.observer.on_status(&format!(
                "Found a complete checkpoint for {:?}, nothing left to translate",
                output_path
            ));
            ctx.advance(RunPhase::Done);
            let result = reconcile(entries, ctx.take_accumulated());
            return Ok(RunOutcome::finished(result, &ctx, true));
        }

        ctx.advance(RunPhase::Planning);
        let chunks = partition(entries, self.settings.num_workers);
        ctx.total_chunks = chunks.len();
        let remaining: Vec<Chunk> = chunks
            .into_iter()
            .filter(|chunk| !chunk.indices().all(|index| ctx.contains(index)))
            .collect();
        ctx.skipped_chunks = ctx.total_chunks - remaining.len();

        self.observer.on_status(&format!(
            "Translating {} entries in {} chunks ({} already done) with {} workers",
            entries.len(),
            ctx.total_chunks,
            ctx.skipped_chunks,
            self.settings.num_workers
        ));

        ctx.advance(RunPhase::Dispatching);
        let translator = ChunkTranslator::new(
            Arc::clone(&self.provider),
            store.clone(),
            Arc::clone(&self.observer),
            self.settings.batch,
        );
        let mut results = stream::iter(remaining.into_iter().map(|chunk| {
            let translator = translator.clone();
            async move {
                let chunk_id = chunk.id;
                let originals = chunk.entries.clone();
                let joined = tokio::spawn(async move { translator.translate_chunk(chunk).await }).await;
                (chunk_id, originals, joined)
            }
        }))
        .buffer_unordered(self.settings.num_workers);

        ctx.advance(RunPhase::Collecting);
        while let Some((chunk_id, originals, joined)) = results.next().await {
            let status = match joined {
                Ok(translated) => {
                    ctx.upsert(translated);
                    ctx.merged_chunks += 1;
                    format!(
                        "Chunk {} merged ({}/{} chunks)",
                        chunk_id,
                        ctx.merged_chunks + ctx.skipped_chunks + ctx.failed_chunks.len(),
                        ctx.total_chunks
                    )
                }
                Err(e) => {
                    let reason = if e.is_panic() { "panicked" } else { "was cancelled" };
                    let recovered = self.recover_failed_chunk(&store, chunk_id, &originals).await;
                    ctx.upsert(recovered.iter().cloned());
                    ctx.fill_missing(originals);
                    ctx.failed_chunks.push(chunk_id);
                    format!(
                        "Chunk {} {}, kept {} finished entries and the original text for the rest",
                        chunk_id,
                        reason,
                        recovered.len()
                    )
                }
            };
            self.save_global(&store, &ctx.snapshot()).await;
            self.observer.on_status(&status);
        }

        ctx.advance(RunPhase::Merging);
        let result = reconcile(entries, ctx.take_accumulated());
        self.save_global(&store, &result).await;

        ctx.advance(RunPhase::Done);
        Ok(RunOutcome::finished(result, &ctx, false))
    }

    async fn load_global(&self, store: &CheckpointStore) -> Vec<SubtitleEntry> {
        match store.load_global().await {
            Ok(Some(entries)) => {
                self.observer.on_status(&format!(
                    "Resuming from checkpoint with {} entries",
                    entries.len()
                ));
                entries
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                self.observer
                    .on_status(&format!("Ignoring unreadable checkpoint: {}", e));
                Vec::new()
            }
        }
    }

    async fn save_global(&self, store: &CheckpointStore, entries: &[SubtitleEntry]) {
        if let Err(e) = store.save_global(entries).await {
            self.observer
                .on_status(&format!("Could not save checkpoint: {}", e));
        }
    }

    /// Entries a failed chunk had already checkpointed; its chunk file is removed afterwards
    async fn recover_failed_chunk(
        &self,
        store: &CheckpointStore,
        chunk_id: usize,
        originals: &[SubtitleEntry],
    ) -> Vec<SubtitleEntry> {
        let own: HashSet<usize> = originals.iter().map(|e| e.seq_num).collect();
        let recovered = match store.load_chunk(chunk_id).await {
            Ok(Some(entries)) => entries
                .into_iter()
                .filter(|e| own.contains(&e.seq_num))
                .collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                self.observer.on_status(&format!(
                    "Chunk {}: ignoring unreadable checkpoint: {}",
                    chunk_id, e
                ));
                Vec::new()
            }
        };

        if let Err(e) = store.delete_chunk(chunk_id).await {
            self.observer
                .on_status(&format!("Chunk {}: could not remove checkpoint: {}", chunk_id, e));
        }
        recovered
    }
}
