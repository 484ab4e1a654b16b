/*!
 * Status and progress callbacks for a translation run.
 *
 * Workers call the observer from many tasks at once, so implementations must be
 * `Send + Sync` and handle their own synchronization.
 */

use log::info;

/// Receives human-readable status lines and per-chunk progress
pub trait ProgressObserver: Send + Sync {
    /// A status or diagnostic line, e.g. a retry warning
    fn on_status(&self, message: &str);

    /// Called after each batch of a chunk
    fn on_progress(&self, _chunk_id: usize, _completed_batches: usize, _total_batches: usize) {}
}

/// Percentage of completed batches, `100.0` for an empty chunk
pub fn progress_percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    completed as f64 / total as f64 * 100.0
}

/// Observer that forwards everything to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_status(&self, message: &str) {
        info!("{}", message);
    }

    fn on_progress(&self, chunk_id: usize, completed_batches: usize, total_batches: usize) {
        log::debug!(
            "Chunk {}: {}/{} batches ({:.0}%)",
            chunk_id,
            completed_batches,
            total_batches,
            progress_percent(completed_batches, total_batches)
        );
    }
}

/// Observer that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl ProgressObserver for SilentObserver {
    fn on_status(&self, _message: &str) {}
}
