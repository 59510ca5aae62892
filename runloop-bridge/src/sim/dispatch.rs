//! Simulated application event queue: one named dispatch thread draining a
//! single FIFO shared by every context.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::bridge::envelope::Envelope;
use crate::bridge::router::DispatchRouter;
use crate::event::ContextId;

const SECONDARY_LOOP_TICK: Duration = Duration::from_millis(10);

#[derive(Default)]
struct DispatchQueue {
    items: VecDeque<Envelope>,
    shutdown: bool,
}

pub struct SimDispatcher {
    queue: Mutex<DispatchQueue>,
    ready: Condvar,
    thread_id: Mutex<Option<ThreadId>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    dispatched: AtomicUsize,
    flushes: AtomicUsize,
}

impl SimDispatcher {
    /// Spawn the dispatch thread under `name`.
    pub fn start(name: &str) -> io::Result<Arc<Self>> {
        let dispatcher = Arc::new(Self {
            queue: Mutex::new(DispatchQueue::default()),
            ready: Condvar::new(),
            thread_id: Mutex::new(None),
            worker: Mutex::new(None),
            dispatched: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
        });

        let runner = Arc::clone(&dispatcher);
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || runner.run())?;
        *dispatcher.thread_id.lock() = Some(handle.thread().id());
        *dispatcher.worker.lock() = Some(handle);
        tracing::debug!(name, "dispatch thread started");
        Ok(dispatcher)
    }

    pub fn thread_id(&self) -> Option<ThreadId> {
        *self.thread_id.lock()
    }

    /// Envelopes dispatched by the queue so far, including those run from a
    /// secondary loop. Envelopes diverted into a performer frame are not
    /// counted.
    pub fn dispatched_count(&self) -> usize {
        self.dispatched.load(Ordering::Acquire)
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::Acquire)
    }

    /// Envelopes waiting in the queue.
    pub fn queued(&self) -> usize {
        self.queue.lock().items.len()
    }

    /// Drain the queue, then stop and join the dispatch thread.
    pub fn shutdown(&self) {
        self.queue.lock().shutdown = true;
        self.ready.notify_all();

        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::warn!("dispatch thread panicked");
        }
    }

    fn run(&self) {
        loop {
            let envelope = {
                let mut queue = self.queue.lock();
                loop {
                    if let Some(envelope) = queue.items.pop_front() {
                        break Some(envelope);
                    }
                    if queue.shutdown {
                        break None;
                    }
                    self.ready.wait(&mut queue);
                }
            };
            match envelope {
                Some(envelope) => self.dispatch(envelope),
                None => break,
            }
        }
        tracing::debug!("dispatch thread exiting");
    }

    /// Dispatch one queued envelope, waiting up to `timeout` for one to
    /// arrive. Returns whether anything ran.
    fn pump_once(&self, timeout: Duration) -> bool {
        let envelope = {
            let mut queue = self.queue.lock();
            if queue.items.is_empty() {
                let _ = self.ready.wait_for(&mut queue, timeout);
            }
            queue.items.pop_front()
        };
        match envelope {
            Some(envelope) => {
                self.dispatch(envelope);
                true
            }
            None => false,
        }
    }

    fn dispatch(&self, envelope: Envelope) {
        envelope.dispatch();
        self.dispatched.fetch_add(1, Ordering::AcqRel);
    }
}

impl DispatchRouter for SimDispatcher {
    fn post(&self, context: Option<ContextId>, envelope: Envelope) {
        tracing::trace!(seq = envelope.seq(), ?context, "posting envelope");
        self.queue.lock().items.push_back(envelope);
        self.ready.notify_all();
    }

    fn flush_pending(&self, _context: Option<ContextId>) {
        self.flushes.fetch_add(1, Ordering::AcqRel);
    }

    fn dispatch_thread(&self, _context: Option<ContextId>) -> Option<ThreadId> {
        self.thread_id()
    }

    fn is_dispatch_thread(&self) -> bool {
        self.thread_id() == Some(thread::current().id())
    }

    fn enter_secondary_loop(&self, keep_running: &dyn Fn() -> bool) {
        while keep_running() {
            self.pump_once(SECONDARY_LOOP_TICK);
        }
    }
}

impl std::fmt::Debug for SimDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimDispatcher")
            .field("thread_id", &self.thread_id())
            .field("queued", &self.queued())
            .field("dispatched", &self.dispatched_count())
            .finish()
    }
}
