//! Native run-loop boundary.
//!
//! The host's event loop is opaque: the bridge only creates a mediator token,
//! spins a nested loop on it, and stops it. Implementations must accept a
//! stop that arrives before the loop is entered; the nested loop then returns
//! immediately.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

/// Opaque identity of one nested-loop session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MediatorToken(u64);

impl MediatorToken {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MediatorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mediator#{}", self.0)
    }
}

/// Host event loop facility.
pub trait NativeLoop: Send + Sync {
    /// Allocate a token for one nested-loop session.
    fn create_mediator(&self) -> MediatorToken;

    /// Spin a nested loop on the calling thread until `token` is stopped.
    ///
    /// With `process_events` the loop dispatches every pending native event;
    /// without it, only the bridge's own cross-thread requests are serviced
    /// and ordinary events wait until the loop exits.
    fn run_nested_loop(&self, token: MediatorToken, process_events: bool);

    /// Stop the nested loop for `token`. Safe to call from any thread.
    fn stop_mediator(&self, token: MediatorToken);

    /// Spin one empty block through the native queue synchronously.
    fn flush_native_queue(&self);
}

/// One mediator token and the guarantee that it is stopped at most once.
pub(crate) struct MediatorSession {
    native: Arc<dyn NativeLoop>,
    token: MediatorToken,
    stopped: AtomicBool,
}

impl MediatorSession {
    pub(crate) fn open(native: Arc<dyn NativeLoop>) -> Arc<Self> {
        let token = native.create_mediator();
        tracing::trace!(%token, "mediator created");
        Arc::new(Self { native, token, stopped: AtomicBool::new(false) })
    }

    pub(crate) fn token(&self) -> MediatorToken {
        self.token
    }

    /// Block in the nested loop until [`stop`](Self::stop) is called.
    pub(crate) fn run(&self, process_events: bool) {
        tracing::trace!(token = %self.token, process_events, "entering nested loop");
        self.native.run_nested_loop(self.token, process_events);
        tracing::trace!(token = %self.token, "nested loop exited");
    }

    pub(crate) fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.native.stop_mediator(self.token);
        }
    }
}
