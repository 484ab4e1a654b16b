/*!
 * # subtrans - resilient parallel subtitle translation
 *
 * A Rust library for translating large SRT subtitle files with remote AI backends.
 *
 * ## Features
 *
 * - Split a file across concurrent workers, each sending small numbered batches
 * - Retry short or failed answers with capped exponential backoff
 * - Checkpoint after every batch and resume interrupted runs without re-translating
 * - Deterministic, index-sorted output even when chunks finish out of order
 * - Translate using:
 *   - Google Gemini
 *   - Any OpenAI-compatible chat completions API (e.g. Novita)
 * - Optional bilingual output and automatic backups
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `subtitle_processor`: Subtitle entries and the SRT codec
 * - `translation`: The translation pipeline:
 *   - `translation::partition`: Chunking for worker assignment
 *   - `translation::batcher`: Per-chunk batch loop with retry/backoff
 *   - `translation::checkpoint`: Durable progress snapshots
 *   - `translation::orchestrator`: Bounded worker pool and merge loop
 *   - `translation::merge`: Final reconciliation
 * - `file_utils`: File system operations
 * - `app_controller`: File and directory workflows
 * - `providers`: Client implementations for the translation backends:
 *   - `providers::gemini`: Gemini API client
 *   - `providers::openai`: OpenAI-compatible API client
 *   - `providers::mock`: Scriptable backend for tests
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod file_utils;
pub mod subtitle_processor;
pub mod translation;
pub mod app_controller;
pub mod providers;
pub mod errors;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::{Controller, DirectoryReport, FileReport};
pub use subtitle_processor::{SubtitleCollection, SubtitleEntry};
pub use translation::{ParallelTranslator, ProgressObserver, RunOutcome, RunSettings};
pub use errors::{AppError, CheckpointError, ProviderError, SubtitleError, TranslationError};
