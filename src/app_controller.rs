use anyhow::{Result, Context, anyhow};
use log::{error, warn, info, debug};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use indicatif::{ProgressBar, ProgressStyle, MultiProgress};
use parking_lot::Mutex;

use crate::app_config::Config;
use crate::file_utils::FileManager;
use crate::providers::{self, TranslationProvider};
use crate::subtitle_processor::{create_backup, SubtitleCollection};
use crate::translation::{CheckpointStore, LogObserver, ParallelTranslator, ProgressObserver, RunSettings};

// @module: Application controller for subtitle translation

/// Outcome of translating one file
#[derive(Debug, Clone)]
pub struct FileReport {
    // @field: Source subtitle file
    pub input: PathBuf,

    // @field: Written translation
    pub output: PathBuf,

    // @field: Number of entries in the file
    pub entries: usize,

    // @field: Entries that received a translation
    pub translated: usize,

    // @field: Chunks whose worker task failed
    pub failed_chunks: usize,

    // @field: Whether the result came straight from a complete checkpoint
    pub from_checkpoint: bool,

    // @field: Wall time of the run
    pub elapsed: Duration,
}

/// Outcome of translating a directory
#[derive(Debug, Clone, Default)]
pub struct DirectoryReport {
    // @field: Per-file success, keyed by input path
    pub results: BTreeMap<PathBuf, bool>,

    // @field: Files skipped because their translation already exists
    pub skipped: Vec<PathBuf>,
}

impl DirectoryReport {
    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|ok| **ok).count()
    }

    pub fn failed(&self) -> usize {
        self.results.values().filter(|ok| !**ok).count()
    }
}

/// Main application controller for subtitle translation
pub struct Controller {
    // @field: App configuration
    config: Config,

    // @field: Backend shared by every run
    provider: Arc<dyn TranslationProvider>,

    // @field: Receiver of status lines and progress
    observer: Arc<dyn ProgressObserver>,

    // @field: Worker pool and batch loop settings
    settings: RunSettings,

    // @field: Ignore existing outputs and stale checkpoints
    force: bool,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        let provider = providers::create_provider(&config)?;
        Self::with_provider(config, provider)
    }

    /// Create a controller around an already built backend
    pub fn with_provider(config: Config, provider: Arc<dyn TranslationProvider>) -> Result<Self> {
        let settings = RunSettings::from_config(&config.translation.common)?;
        Ok(Self {
            config,
            provider,
            observer: Arc::new(LogObserver),
            settings,
            force: false,
        })
    }

    /// Replace the status/progress receiver
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace the run settings derived from the configuration
    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Overwrite existing outputs and discard stale checkpoints
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Where the translation of `input_file` is written in directory mode
    pub fn output_path_for(&self, input_file: &Path) -> PathBuf {
        FileManager::generate_output_path(input_file, &self.config.output.file_suffix)
    }

    /// Translate one SRT file into `output_file`
    pub async fn translate_file(&self, input_file: &Path, output_file: &Path) -> Result<FileReport> {
        let start_time = Instant::now();
        FileManager::require_file(input_file)?;

        if self.config.output.create_backup {
            if let Some(backup) = create_backup(input_file)? {
                info!("Backup created: {}", backup.display());
            }
        }

        let subtitles = SubtitleCollection::load_srt(input_file)?;
        subtitles.ensure_unique_indices()
            .with_context(|| format!("Cannot translate {}", input_file.display()))?;

        let store = CheckpointStore::for_output(output_file);
        if self.force {
            debug!("Clearing checkpoints for {}", output_file.display());
            store.clear_all().await?;
        } else if store.has_global() {
            info!("Found unfinished translation for {}, resuming", output_file.display());
        }

        info!(
            "Translating {} ({} entries) with {} - {}",
            input_file.display(),
            subtitles.len(),
            self.config.translation.provider.display_name(),
            self.config.translation.get_model()
        );

        let translator = ParallelTranslator::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.observer),
            self.settings,
        );
        let outcome = translator.translate(&subtitles.entries, output_file).await?;

        let translated = SubtitleCollection::from_entries(input_file.to_path_buf(), outcome.entries.clone());
        translated.write_to_srt(output_file, self.config.output.bilingual)?;

        if let Err(e) = store.delete_global().await {
            warn!("Failed to remove checkpoint for {}: {}", output_file.display(), e);
        }

        let report = FileReport {
            input: input_file.to_path_buf(),
            output: output_file.to_path_buf(),
            entries: translated.len(),
            translated: outcome.translated_count(),
            failed_chunks: outcome.failed_chunks.len(),
            from_checkpoint: outcome.from_checkpoint,
            elapsed: start_time.elapsed(),
        };

        if report.translated < report.entries {
            warn!(
                "{} of {} entries kept their original text",
                report.entries - report.translated,
                report.entries
            );
        }
        info!(
            "Success: {} ({} / {} translated in {})",
            output_file.display(),
            report.translated,
            report.entries,
            Self::format_duration(report.elapsed)
        );

        Ok(report)
    }

    /// Translate every SRT file below `input_dir`, next to its source
    /// Files that already have a translation are skipped unless forced
    pub async fn translate_directory(&self, input_dir: &Path) -> Result<DirectoryReport> {
        let start_time = Instant::now();

        if !FileManager::dir_exists(input_dir) {
            return Err(anyhow!("Input directory does not exist: {:?}", input_dir));
        }

        let suffix = self.config.output.file_suffix.as_str();
        let subtitle_files: Vec<PathBuf> = FileManager::find_files(input_dir, "srt")?
            .into_iter()
            .filter(|path| !Self::is_translation_output(path, suffix))
            .collect();

        if subtitle_files.is_empty() {
            return Err(anyhow!("No subtitle files found in directory: {:?}", input_dir));
        }

        let mut report = DirectoryReport::default();

        for input_file in subtitle_files {
            let output_file = self.output_path_for(&input_file);

            if output_file.exists() && !self.force {
                warn!(
                    "Skipping {}, translation already exists (use -f to force overwrite)",
                    input_file.display()
                );
                report.skipped.push(input_file);
                continue;
            }

            match self.translate_file(&input_file, &output_file).await {
                Ok(_) => {
                    report.results.insert(input_file, true);
                }
                Err(e) => {
                    error!("Error processing file {}: {:#}", input_file.display(), e);
                    report.results.insert(input_file, false);
                }
            }
        }

        info!(
            "Directory processing completed: {} translated, {} skipped, {} errors in {}",
            report.succeeded(),
            report.skipped.len(),
            report.failed(),
            Self::format_duration(start_time.elapsed())
        );

        Ok(report)
    }

    // A file named `<stem><suffix>.srt` is one of our own outputs
    fn is_translation_output(path: &Path, suffix: &str) -> bool {
        !suffix.is_empty()
            && path
                .file_stem()
                .map(|stem| stem.to_string_lossy().ends_with(suffix))
                .unwrap_or(false)
    }

    // Format duration in a human-readable format
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}

/// Terminal observer: one progress bar per chunk, status lines printed above the bars
pub struct IndicatifObserver {
    multi_progress: MultiProgress,
    bars: Mutex<HashMap<usize, ProgressBar>>,
    style: ProgressStyle,
}

impl Default for IndicatifObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatifObserver {
    pub fn new() -> Self {
        let style = ProgressStyle::default_bar()
            .template("{prefix:>9} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches ({percent}%)")
            .or_else(|_| ProgressStyle::default_bar().template("{prefix} [{bar:40}] {pos}/{len}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░");

        Self {
            multi_progress: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            style,
        }
    }

    /// Remove every bar from the terminal
    pub fn clear(&self) {
        for (_, bar) in self.bars.lock().drain() {
            bar.finish_and_clear();
        }
    }
}

impl ProgressObserver for IndicatifObserver {
    fn on_status(&self, message: &str) {
        if self.multi_progress.is_hidden() {
            info!("{}", message);
        } else if self.multi_progress.println(message).is_err() {
            info!("{}", message);
        }
    }

    fn on_progress(&self, chunk_id: usize, completed_batches: usize, total_batches: usize) {
        let mut bars = self.bars.lock();
        let bar = bars.entry(chunk_id).or_insert_with(|| {
            let bar = self.multi_progress.add(ProgressBar::new(total_batches as u64));
            bar.set_style(self.style.clone());
            bar.set_prefix(format!("Chunk {}", chunk_id));
            bar
        });

        bar.set_length(total_batches as u64);
        bar.set_position(completed_batches as u64);
        if completed_batches >= total_batches {
            bar.finish();
        }
    }
}
