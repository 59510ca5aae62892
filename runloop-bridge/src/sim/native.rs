//! Simulated native run loop.
//!
//! Records a journal of mediator lifecycle events and keeps a queue of tasks
//! that other threads ask the native thread to run. A nested loop services
//! [`RunLoopMode::Bridge`] tasks always and [`RunLoopMode::Default`] tasks
//! only when it processes events, mirroring a host loop spun in a private
//! mode versus the default mode.

use std::collections::{HashSet, VecDeque};
use std::sync::mpsc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;

use crate::bridge::mediator::{MediatorToken, NativeLoop};

/// Run-loop mode a native task is scheduled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunLoopMode {
    /// Cross-thread requests from the bridge; serviced by every nested loop.
    Bridge,
    /// Ordinary native events; serviced only while processing events.
    Default,
}

/// Journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediatorEvent {
    Created { token: MediatorToken },
    Started { token: MediatorToken, process_events: bool },
    Stopped { token: MediatorToken },
    Exited { token: MediatorToken },
}

struct NativeTask {
    mode: RunLoopMode,
    job: Box<dyn FnOnce() + Send>,
}

#[derive(Default)]
struct NativeState {
    next_token: u64,
    stopped: HashSet<MediatorToken>,
    tasks: VecDeque<NativeTask>,
    journal: Vec<MediatorEvent>,
    active_loops: usize,
    flushes: usize,
    native_thread: Option<ThreadId>,
}

impl NativeState {
    fn next_runnable(&mut self, process_events: bool) -> Option<NativeTask> {
        let index = self
            .tasks
            .iter()
            .position(|task| process_events || task.mode == RunLoopMode::Bridge)?;
        self.tasks.remove(index)
    }

    fn services_tasks_on_current_thread(&self) -> bool {
        self.native_thread.is_none_or(|native| native == thread::current().id())
    }
}

impl std::fmt::Debug for SimNativeLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimNativeLoop")
            .field("pending_tasks", &state.tasks.len())
            .field("active_loops", &state.active_loops)
            .field("journal_len", &state.journal.len())
            .finish()
    }
}

#[derive(Default)]
pub struct SimNativeLoop {
    state: Mutex<NativeState>,
    changed: Condvar,
}

impl SimNativeLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only nested loops on the calling thread will run native tasks from now
    /// on. Without this, every nested loop services tasks.
    pub fn attach_current_thread(&self) {
        self.state.lock().native_thread = Some(thread::current().id());
    }

    /// Queue `job` for the native thread without waiting.
    pub fn perform_on_native(&self, mode: RunLoopMode, job: impl FnOnce() + Send + 'static) {
        self.state.lock().tasks.push_back(NativeTask { mode, job: Box::new(job) });
        self.changed.notify_all();
    }

    /// Queue `job` for the native thread and block until it has run.
    ///
    /// Returns `None` if the task was dropped without running.
    pub fn perform_on_native_waiting<T: Send + 'static>(
        &self,
        mode: RunLoopMode,
        job: impl FnOnce() -> T + Send + 'static,
    ) -> Option<T> {
        let (tx, rx) = mpsc::channel();
        self.perform_on_native(mode, move || {
            let _ = tx.send(job());
        });
        rx.recv().ok()
    }

    /// Run queued tasks on the calling thread, as the top-level native loop
    /// would between events. Returns how many ran.
    pub fn run_pending(&self, process_events: bool) -> usize {
        let mut ran = 0;
        let mut state = self.state.lock();
        while let Some(task) = state.next_runnable(process_events) {
            MutexGuard::unlocked(&mut state, || (task.job)());
            ran += 1;
        }
        ran
    }

    pub fn journal(&self) -> Vec<MediatorEvent> {
        self.state.lock().journal.clone()
    }

    /// Journal entries for one token.
    pub fn events_for(&self, token: MediatorToken) -> Vec<MediatorEvent> {
        self.journal()
            .into_iter()
            .filter(|event| match event {
                MediatorEvent::Created { token: t }
                | MediatorEvent::Started { token: t, .. }
                | MediatorEvent::Stopped { token: t }
                | MediatorEvent::Exited { token: t } => *t == token,
            })
            .collect()
    }

    pub fn pending_tasks(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn active_loops(&self) -> usize {
        self.state.lock().active_loops
    }

    pub fn flush_count(&self) -> usize {
        self.state.lock().flushes
    }
}

impl NativeLoop for SimNativeLoop {
    fn create_mediator(&self) -> MediatorToken {
        let mut state = self.state.lock();
        state.next_token += 1;
        let token = MediatorToken::new(state.next_token);
        state.journal.push(MediatorEvent::Created { token });
        token
    }

    fn run_nested_loop(&self, token: MediatorToken, process_events: bool) {
        let mut state = self.state.lock();
        state.journal.push(MediatorEvent::Started { token, process_events });
        state.active_loops += 1;

        loop {
            if state.stopped.remove(&token) {
                break;
            }
            let task = if state.services_tasks_on_current_thread() {
                state.next_runnable(process_events)
            } else {
                None
            };
            match task {
                Some(task) => MutexGuard::unlocked(&mut state, || (task.job)()),
                None => self.changed.wait(&mut state),
            }
        }

        state.active_loops -= 1;
        state.journal.push(MediatorEvent::Exited { token });
    }

    fn stop_mediator(&self, token: MediatorToken) {
        let mut state = self.state.lock();
        state.stopped.insert(token);
        state.journal.push(MediatorEvent::Stopped { token });
        drop(state);
        self.changed.notify_all();
    }

    fn flush_native_queue(&self) {
        self.state.lock().flushes += 1;
        self.changed.notify_all();
    }
}
