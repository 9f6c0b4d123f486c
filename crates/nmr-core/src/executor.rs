//! Delivery executor.
//!
//! Asynchronous deliveries run endpoint code that may block, so they go
//! through `spawn_blocking` on a dedicated tokio runtime rather than onto
//! async worker threads. Two lanes share the work:
//!
//! | Lane | Carries | Threads |
//! |------|---------|---------|
//! | pool | deliveries nobody is blocked on | `executor_threads` |
//! | handoff | deliveries a blocked `send_sync` is waiting for | tokio's default blocking cap, idle threads retire |
//!
//! A provider that itself calls `send_sync` holds its thread until the
//! nested delivery runs, so nested deliveries cannot queue behind it on
//! the bounded pool. Runtimes are shut down in the background when the
//! executor is dropped: queued deliveries are abandoned, running ones
//! finish on their own.

use nmr_types::NmrError;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

struct Lane {
    runtime: Option<Runtime>,
    handle: Handle,
}

impl Lane {
    fn new(builder: &mut Builder) -> Result<Self, NmrError> {
        let runtime = builder
            .worker_threads(1)
            .build()
            .map_err(|e| NmrError::Executor(e.to_string()))?;
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    fn execute(&self, task: impl FnOnce() + Send + 'static) {
        // Completion is observed through the exchange, not the join handle.
        drop(self.handle.spawn_blocking(task));
    }
}

impl Drop for Lane {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

pub(crate) struct DeliveryExecutor {
    pool: Lane,
    handoff: Lane,
}

impl DeliveryExecutor {
    pub(crate) fn new(threads: usize, thread_name: &str) -> Result<Self, NmrError> {
        let pool = Lane::new(
            Builder::new_multi_thread()
                .max_blocking_threads(threads)
                .thread_name(thread_name),
        )?;
        let handoff = Lane::new(
            Builder::new_multi_thread().thread_name(format!("{thread_name}-sync")),
        )?;
        debug!(threads, thread_name, "Delivery executor started");
        Ok(Self { pool, handoff })
    }

    /// Queues `task` for execution on a delivery thread.
    pub(crate) fn execute(&self, task: impl FnOnce() + Send + 'static) {
        self.pool.execute(task);
    }

    /// Runs `task` for a sender blocked in `send_sync`. Never waits for a
    /// pool thread.
    pub(crate) fn execute_for_waiter(&self, task: impl FnOnce() + Send + 'static) {
        self.handoff.execute(task);
    }
}
