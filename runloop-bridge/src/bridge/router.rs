//! Dispatch-side boundary: the application's event queue.
//!
//! The router owns FIFO delivery per context. The bridge only posts
//! envelopes, flushes anything the router buffers before its real queue, and
//! asks which thread is the dispatch thread.

use std::thread::{self, ThreadId};

use crate::bridge::envelope::Envelope;
use crate::event::ContextId;

pub trait DispatchRouter: Send + Sync {
    /// Enqueue `envelope` on the queue for `context`, or the default queue
    /// when `context` is `None`.
    fn post(&self, context: Option<ContextId>, envelope: Envelope);

    /// Push any envelopes still buffered for `context` into its queue so they
    /// cannot get stuck behind a waiting caller.
    fn flush_pending(&self, context: Option<ContextId>);

    /// Thread that dispatches work for `context`.
    fn dispatch_thread(&self, context: Option<ContextId>) -> Option<ThreadId>;

    /// Whether the calling thread is any dispatch thread.
    fn is_dispatch_thread(&self) -> bool;

    /// Keep dispatching queued work on the calling (dispatch) thread while
    /// `keep_running` returns true.
    fn enter_secondary_loop(&self, keep_running: &dyn Fn() -> bool);

    /// Whether the calling thread dispatches work for `context`.
    fn is_dispatch_thread_for(&self, context: Option<ContextId>) -> bool {
        self.dispatch_thread(context) == Some(thread::current().id())
    }
}
