//! Progress reporting side channel.
//!
//! Nothing reported here feeds back into the computation.

use tracing::{debug, info};

/// Sink for pipeline progress.
pub trait ProgressReporter: Sync {
    /// A pipeline stage is starting.
    fn stage(&self, _name: &str) {}

    /// `done` of `total` epochs have finished clustering.
    fn epochs_clustered(&self, done: usize, total: usize);
}

/// Reports through `tracing`, every 10 epochs and on completion.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn stage(&self, name: &str) {
        info!(stage = name, "Starting stage");
    }

    fn epochs_clustered(&self, done: usize, total: usize) {
        if done % 10 == 0 || done == total {
            let pct = if total > 0 {
                done as f64 / total as f64 * 100.0
            } else {
                100.0
            };
            info!("KMeans progress: [{}/{}] epochs ({:.1}%)", done, total, pct);
        } else {
            debug!(done, total, "Epoch clustered");
        }
    }
}

/// Discards all progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn epochs_clustered(&self, _done: usize, _total: usize) {}
}
