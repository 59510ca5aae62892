//! Worker threads for offloaded calls.
//!
//! Backed by a dedicated tokio blocking pool with no thread cap: a thread is
//! spawned whenever no idle worker is available, so an offloaded call never
//! queues behind a busy or abandoned one. Each worker runs one call at a time
//! and idle workers are reclaimed after the configured keep-alive.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::{Builder, Runtime};

use crate::config::BridgeConfig;
use crate::error::BridgeError;

pub(crate) struct WorkerPool {
    runtime: Option<Runtime>,
}

impl WorkerPool {
    pub(crate) fn start(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let base = config.worker_thread_name.clone();
        let counter = Arc::new(AtomicUsize::new(1));
        let runtime = Builder::new_current_thread()
            .thread_name_fn(move || format!("{base}-{}", counter.fetch_add(1, Ordering::Relaxed)))
            .thread_keep_alive(config.worker_keep_alive())
            .max_blocking_threads(usize::MAX)
            .build()?;
        tracing::debug!(keep_alive = ?config.worker_keep_alive(), "performer worker pool started");
        Ok(Self { runtime: Some(runtime) })
    }

    /// Run `job` on a worker thread. The job is detached; it reports its own
    /// outcome.
    pub(crate) fn execute(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(runtime) = &self.runtime {
            drop(runtime.spawn_blocking(job));
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Offloaded calls may still be running; never wait for them here.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
