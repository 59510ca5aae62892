//! Selector performer: offload a native call that must produce a result
//! without stalling the dispatch thread.
//!
//! When the native side needs a value computed by code that may itself post
//! work back to the dispatch thread, running it inline would deadlock: the
//! native thread waits on the dispatch thread, which waits on the native
//! thread. `perform` instead hands the call to a worker and keeps the dispatch
//! thread busy draining a private frame queue. Invocations aimed at that
//! thread are diverted into the frame by [`SelectorPerformer::offer`] and run
//! immediately, ahead of the normal queue. Nested `perform` calls push nested
//! frames and unwind in LIFO order.

mod context;
mod frames;
mod pool;
mod registry;

use std::sync::Arc;
use std::thread::{self, ThreadId};

pub use context::PerformerContext;
pub use registry::PerformerRegistry;

use crate::bridge::envelope::Envelope;
use crate::bridge::router::DispatchRouter;
use crate::error::catch_failure;

/// Entry point for `perform` / `offer`, bound to a registry and the router
/// that knows which thread is the dispatch thread.
#[derive(Clone)]
pub struct SelectorPerformer {
    registry: Arc<PerformerRegistry>,
    router: Arc<dyn DispatchRouter>,
}

impl SelectorPerformer {
    pub fn new(registry: Arc<PerformerRegistry>, router: Arc<dyn DispatchRouter>) -> Self {
        Self { registry, router }
    }

    pub fn registry(&self) -> &Arc<PerformerRegistry> {
        &self.registry
    }

    /// Run `call` and return its result.
    ///
    /// On a dispatch thread the call is offloaded and nested invocations are
    /// serviced until it finishes, or until the wait limit passes without any
    /// activity, in which case `None` is returned and the call is left to
    /// finish unobserved. Anywhere else the call runs in place. Failures are
    /// logged and yield `None`.
    pub fn perform<T, F>(&self, call: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        if self.router.is_dispatch_thread() {
            let context = self.registry.get_or_create(thread::current().id());
            return context.perform(call);
        }
        perform_in_place(call)
    }

    /// Divert `invocation` into the active frame of the dispatch thread that
    /// owns its context.
    ///
    /// The envelope is marked posted either way. `Ok` means an in-progress
    /// `perform` will run it. `Err` hands the envelope back: no frame is
    /// active and it must be posted normally.
    pub fn offer(&self, invocation: Envelope) -> Result<(), Envelope> {
        invocation.mark_posted();
        match self.router.dispatch_thread(invocation.context()) {
            Some(thread) => self.offer_to(thread, invocation),
            None => Err(invocation),
        }
    }

    /// [`offer`](Self::offer) with the target thread already resolved.
    pub fn offer_to(&self, thread: ThreadId, invocation: Envelope) -> Result<(), Envelope> {
        invocation.mark_posted();
        match self.registry.get(thread) {
            Some(context) => context.offer(invocation),
            None => Err(invocation),
        }
    }

    /// Active frames on `thread`.
    pub fn frame_depth(&self, thread: ThreadId) -> usize {
        self.registry.frame_depth(thread)
    }
}

pub(crate) fn perform_in_place<T>(call: impl FnOnce() -> anyhow::Result<T>) -> Option<T> {
    match catch_failure(call) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("selector failed while performing in place: {err:#}");
            None
        }
    }
}
