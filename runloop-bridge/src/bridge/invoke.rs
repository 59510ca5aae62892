//! Public invocation surface.
//!
//! Handles route work onto the dispatch thread and park the caller in a
//! nested native loop while it runs, so the caller's own loop keeps servicing
//! the requests the dispatch thread sends back.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::bridge::envelope::{Envelope, EnvelopeHandle};
use crate::bridge::mediator::{MediatorSession, NativeLoop};
use crate::bridge::router::DispatchRouter;
use crate::coordination::{CoordinationState, WaitPermit};
use crate::error::BridgeError;
use crate::event::ContextId;
use crate::performer::{PerformerRegistry, SelectorPerformer};

/// Cross-loop invocation bridge.
///
/// Cheap to clone; clones share the native loop, router, coordination state
/// and performer registry.
#[derive(Clone)]
pub struct InvocationBridge {
    native: Arc<dyn NativeLoop>,
    router: Arc<dyn DispatchRouter>,
    coordination: Arc<CoordinationState>,
    performer: SelectorPerformer,
}

impl InvocationBridge {
    /// Bridge using the process-wide coordination state and performer
    /// registry.
    pub fn new(native: Arc<dyn NativeLoop>, router: Arc<dyn DispatchRouter>) -> Self {
        let performer = SelectorPerformer::new(PerformerRegistry::global(), Arc::clone(&router));
        Self { native, router, coordination: CoordinationState::global(), performer }
    }

    pub fn with_coordination(mut self, coordination: Arc<CoordinationState>) -> Self {
        self.coordination = coordination;
        self
    }

    pub fn with_registry(mut self, registry: Arc<PerformerRegistry>) -> Self {
        self.performer = SelectorPerformer::new(registry, Arc::clone(&self.router));
        self
    }

    pub fn coordination(&self) -> &Arc<CoordinationState> {
        &self.coordination
    }

    pub fn performer(&self) -> &SelectorPerformer {
        &self.performer
    }

    /// Run `action` on the dispatch thread for `context` and wait for it.
    pub fn invoke_and_wait<F>(&self, action: F, context: Option<ContextId>) -> Result<(), BridgeError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.invoke_and_wait_with(action, context, false)
    }

    /// Run `action` on the dispatch thread for `context` and wait for it.
    ///
    /// `process_events` marks a priority call: the nested loop dispatches all
    /// native events while waiting and the wait is not counted as blocking.
    /// Use it only where native event processing must continue, drag tracking
    /// being the usual case; ordinary sequencing is not guaranteed meanwhile.
    pub fn invoke_and_wait_with<F>(
        &self,
        action: F,
        context: Option<ContextId>,
        process_events: bool,
    ) -> Result<(), BridgeError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.call_and_wait_with(action, context, process_events)
    }

    /// [`invoke_and_wait`](Self::invoke_and_wait) returning the value the
    /// callable produced on the dispatch thread.
    pub fn call_and_wait<T, F>(&self, callable: F, context: Option<ContextId>) -> Result<T, BridgeError>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.call_and_wait_with(callable, context, false)
    }

    fn call_and_wait_with<T, F>(
        &self,
        callable: F,
        context: Option<ContextId>,
        process_events: bool,
    ) -> Result<T, BridgeError>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&slot);
        let envelope = Envelope::new(
            move || {
                *sink.lock() = Some(callable()?);
                Ok(())
            },
            context,
        );
        let handle = envelope.handle();

        if self.router.is_dispatch_thread_for(context) {
            tracing::debug!(seq = handle.seq(), "already on the dispatch thread, dispatching in place");
            envelope.mark_posted();
            envelope.dispatch();
            return take_result(&slot, &handle);
        }

        let permit = if process_events {
            WaitPermit::NonBlocking
        } else {
            self.coordination.enter_blocking()
        };
        let nested_processes_events = permit.processes_events();

        let session = MediatorSession::open(Arc::clone(&self.native));
        let stopper = Arc::clone(&session);
        let envelope = envelope.with_completion(move || stopper.stop());

        tracing::debug!(
            seq = handle.seq(),
            token = %session.token(),
            context = ?context,
            process_events = nested_processes_events,
            "invoke_and_wait"
        );
        self.route(envelope, context);
        session.run(nested_processes_events);
        drop(permit);

        take_result(&slot, &handle)
    }

    /// Post `action` to the dispatch thread for `context` without waiting.
    ///
    /// A failure is recorded on the returned handle and logged; it is never
    /// raised to the caller.
    pub fn invoke_later<F>(&self, action: F, context: Option<ContextId>) -> Result<EnvelopeHandle, BridgeError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let Some(context) = context else {
            tracing::error!("invoke_later called without a target context");
            return Err(BridgeError::MissingContext { operation: "invoke_later" });
        };

        let envelope = Envelope::new(action, Some(context)).detached();
        let handle = envelope.handle();
        tracing::debug!(seq = handle.seq(), %context, "invoke_later");

        envelope.mark_posted();
        self.router.post(Some(context), envelope);
        self.router.flush_pending(Some(context));
        Ok(handle)
    }

    /// Run `action` in place on the dispatch thread as a priority call.
    ///
    /// Marks a priority call as pending, dispatches queued work until no
    /// ordinary blocking wait is outstanding, then runs `action`. Waits that
    /// start meanwhile let their nested loops process native events.
    pub fn unsafe_nonblocking_execute<R>(&self, action: impl FnOnce() -> R) -> Result<R, BridgeError> {
        if !self.router.is_dispatch_thread() {
            tracing::error!("unsafe_nonblocking_execute called off the dispatch thread");
            return Err(BridgeError::NotDispatchThread { operation: "unsafe_nonblocking_execute" });
        }

        let _priority = self.coordination.begin_priority();
        let coordination = &self.coordination;
        self.router.enter_secondary_loop(&|| coordination.has_blocking_waits());
        Ok(action())
    }

    /// Spin one empty block through the native queue synchronously.
    pub fn flush_native_queue(&self) {
        self.native.flush_native_queue();
    }

    fn route(&self, envelope: Envelope, context: Option<ContextId>) {
        let envelope = match self.performer.offer(envelope) {
            Ok(()) => return,
            Err(envelope) => envelope,
        };
        self.router.post(context, envelope);
        self.router.flush_pending(context);
    }
}

fn take_result<T>(slot: &Mutex<Option<T>>, handle: &EnvelopeHandle) -> Result<T, BridgeError> {
    if let Some(failure) = handle.take_failure() {
        return Err(BridgeError::invocation_target(failure));
    }
    slot.lock().take().ok_or_else(|| {
        BridgeError::invocation_target(anyhow::anyhow!(
            "invocation {} finished without producing a result",
            handle.seq()
        ))
    })
}
