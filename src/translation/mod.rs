/*!
 * Resilient parallel batch translation.
 *
 * This module contains the translation pipeline. It is split into several submodules:
 *
 * - `partition`: Splits entries into contiguous chunks, one per worker task
 * - `backoff`: Exponential retry delays and retry limits
 * - `protocol`: Numbered request payloads and response parsing
 * - `batcher`: Per-chunk batch loop with retry and partial acceptance
 * - `checkpoint`: Durable per-chunk and global progress snapshots
 * - `orchestrator`: Bounded worker pool and the single-writer merge loop
 * - `merge`: Final index-sorted reconciliation
 * - `observer`: Status and progress callbacks
 */

// Re-export main types for easier usage
pub use self::backoff::{BackoffPolicy, RetryLimit};
pub use self::batcher::{BatchResult, BatchSettings, ChunkTranslator};
pub use self::checkpoint::CheckpointStore;
pub use self::merge::reconcile;
pub use self::observer::{progress_percent, LogObserver, ProgressObserver, SilentObserver};
pub use self::orchestrator::{ParallelTranslator, RunContext, RunOutcome, RunPhase, RunSettings};
pub use self::partition::{partition, Chunk};
pub use self::protocol::{build_numbered_payload, parse_numbered_response, BatchRequest, ParsedResponse};

// Submodules
pub mod backoff;
pub mod batcher;
pub mod checkpoint;
pub mod merge;
pub mod observer;
pub mod orchestrator;
pub mod partition;
pub mod protocol;
