//! Offloaded CPU-bound work
//!
//! Runs blocking closures on tokio's blocking threads, gated by a semaphore so
//! that at most `workers` of them run at once no matter how many agents ask.

use crate::error::WardenError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error};

/// Counters for offloaded work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OffloadStats {
    pub completed: u64,
    pub failed: u64,
    pub in_flight: usize,
}

/// Bounded pool for CPU-bound work
pub struct OffloadPool {
    workers: usize,
    permits: Arc<Semaphore>,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl OffloadPool {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            permits: Arc::new(Semaphore::new(workers)),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `f` on a worker and wait for its result.
    ///
    /// Waits for a free worker first. A panic inside `f` surfaces as
    /// `OffloadFailed`.
    pub async fn execute<F, R>(&self, f: F) -> Result<R, WardenError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| WardenError::OffloadFailed("worker pool closed".to_string()))?;

        debug!(
            in_flight = self.workers - self.permits.available_permits(),
            "Dispatching offloaded task"
        );

        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await;

        match result {
            Ok(value) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Offloaded task failed");
                Err(WardenError::OffloadFailed(e.to_string()))
            }
        }
    }

    pub fn stats(&self) -> OffloadStats {
        OffloadStats {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            in_flight: self.workers - self.permits.available_permits(),
        }
    }

    /// Refuse new work; tasks already running finish normally
    pub fn close(&self) {
        self.permits.close();
    }
}
