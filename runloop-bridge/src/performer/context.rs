//! Per-dispatch-thread performer state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ThreadId;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::bridge::envelope::Envelope;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, catch_failure};
use crate::performer::frames::{FrameItem, FrameStack};
use crate::performer::perform_in_place;
use crate::performer::pool::WorkerPool;

/// Performer state for one dispatch thread: its frame stack and a lazily
/// started worker pool.
pub struct PerformerContext {
    thread: ThreadId,
    config: BridgeConfig,
    frames: FrameStack,
    pool: OnceCell<WorkerPool>,
}

impl PerformerContext {
    pub(crate) fn new(thread: ThreadId, config: BridgeConfig) -> Self {
        Self { thread, config, frames: FrameStack::default(), pool: OnceCell::new() }
    }

    /// Dispatch thread this context belongs to.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Number of offloaded calls whose frame is still on the stack.
    pub fn frame_depth(&self) -> usize {
        self.frames.depth()
    }

    pub(crate) fn offer(&self, envelope: Envelope) -> Result<(), Envelope> {
        self.frames.offer(envelope)
    }

    fn pool(&self) -> Result<&WorkerPool, BridgeError> {
        self.pool.get_or_try_init(|| WorkerPool::start(&self.config))
    }

    /// Offload `call` to a worker and service nested invocations on the
    /// calling dispatch thread until it finishes.
    pub(crate) fn perform<T, F>(self: &Arc<Self>, call: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let pool = match self.pool() {
            Ok(pool) => pool,
            Err(err) => {
                tracing::warn!("{err}; performing selector in place");
                return perform_in_place(call);
            }
        };

        let frame = self.frames.push_frame();
        let task = Arc::new(TaskSlot::new());

        let context = Arc::clone(self);
        let worker_frame = Arc::clone(&frame);
        let worker_task = Arc::clone(&task);
        pool.execute(move || {
            let outcome = catch_failure(call);
            context.frames.complete(&worker_frame, || worker_task.finish(outcome));
        });

        let wait_limit = self.config.performer_wait_limit();
        while !task.is_done() || !frame.is_empty() {
            match frame.poll(wait_limit) {
                Some(FrameItem::Invocation(envelope)) => {
                    tracing::debug!(seq = envelope.seq(), frame = frame.id(), "dispatching nested invocation");
                    envelope.dispatch();
                }
                Some(FrameItem::Wake) => {}
                None => {
                    tracing::warn!(
                        frame = frame.id(),
                        ?wait_limit,
                        "waiting for the invocation event timed out; abandoning offloaded call"
                    );
                    for envelope in self.frames.abandon(&frame) {
                        envelope.dispatch();
                    }
                    break;
                }
            }
        }

        match task.take() {
            Some(Ok(value)) => Some(value),
            Some(Err(err)) => {
                tracing::warn!("offloaded selector failed: {err:#}");
                None
            }
            None => None,
        }
    }
}

impl fmt::Debug for PerformerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformerContext")
            .field("thread", &self.thread)
            .field("frame_depth", &self.frames.depth())
            .field("pool_started", &self.pool.get().is_some())
            .finish()
    }
}

/// Outcome slot of one offloaded call.
struct TaskSlot<T> {
    outcome: Mutex<Option<anyhow::Result<T>>>,
    done: AtomicBool,
}

impl<T> TaskSlot<T> {
    fn new() -> Self {
        Self { outcome: Mutex::new(None), done: AtomicBool::new(false) }
    }

    fn finish(&self, outcome: anyhow::Result<T>) {
        *self.outcome.lock() = Some(outcome);
        self.done.store(true, Ordering::Release);
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn take(&self) -> Option<anyhow::Result<T>> {
        if self.is_done() { self.outcome.lock().take() } else { None }
    }
}
