//! One unit of posted work plus its completion and failure state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::bridge::callback::CompletionHook;
use crate::error::catch_failure;
use crate::event::{ContextId, InvocationState};

type Action = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Monotonic envelope sequence, used to correlate log lines.
static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

/// A unit of work that runs exactly once on a dispatch thread.
///
/// Fields:
/// - `action`: the work itself. A returned error or a panic is captured as
///   the envelope's failure.
/// - `on_complete`: fired exactly once after the action, success or failure.
/// - `context`: the dispatch context the envelope targets.
/// - `detached`: fire-and-forget envelopes log their failure, since nobody
///   will inspect it.
pub struct Envelope {
    action: Action,
    on_complete: Option<CompletionHook>,
    context: Option<ContextId>,
    detached: bool,
    shared: Arc<EnvelopeShared>,
}

struct EnvelopeShared {
    seq: u64,
    state: AtomicU8,
    failure: Mutex<Option<anyhow::Error>>,
}

impl EnvelopeShared {
    fn state(&self) -> InvocationState {
        InvocationState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn advance(&self, from: InvocationState, to: InvocationState) {
        if self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(seq = self.seq, ?from, ?to, state = ?self.state(), "unexpected envelope transition");
            self.state.store(to as u8, Ordering::Release);
        }
    }
}

impl Envelope {
    pub fn new<F>(action: F, context: Option<ContextId>) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            action: Box::new(action),
            on_complete: None,
            context,
            detached: false,
            shared: Arc::new(EnvelopeShared {
                seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
                state: AtomicU8::new(InvocationState::Created as u8),
                failure: Mutex::new(None),
            }),
        }
    }

    /// Attach the hook fired after the action finishes.
    pub fn with_completion(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(CompletionHook::new(hook));
        self
    }

    /// Mark as fire-and-forget: a failure is logged when it is recorded.
    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    pub fn seq(&self) -> u64 {
        self.shared.seq
    }

    pub fn context(&self) -> Option<ContextId> {
        self.context
    }

    pub fn state(&self) -> InvocationState {
        self.shared.state()
    }

    /// Observer handle that outlives the envelope.
    pub fn handle(&self) -> EnvelopeHandle {
        EnvelopeHandle { shared: Arc::clone(&self.shared) }
    }

    /// Record that the envelope was handed to a queue. Repeat calls while
    /// still posted are no-ops.
    pub fn mark_posted(&self) {
        if self.shared.state() != InvocationState::Posted {
            self.shared.advance(InvocationState::Created, InvocationState::Posted);
        }
    }

    /// Run the action, record its outcome and fire the completion hook.
    ///
    /// Consumes the envelope, so it runs at most once.
    pub fn dispatch(self) {
        let Self { action, on_complete, context, detached, shared } = self;

        shared.advance(InvocationState::Posted, InvocationState::Dispatching);
        match catch_failure(action) {
            Ok(()) => shared.advance(InvocationState::Dispatching, InvocationState::Completed),
            Err(failure) => {
                if detached {
                    tracing::warn!(
                        seq = shared.seq,
                        context = ?context,
                        "invoke_later action failed: {failure:#}"
                    );
                }
                *shared.failure.lock() = Some(failure);
                shared.advance(InvocationState::Dispatching, InvocationState::Failed);
            }
        }

        if let Some(hook) = on_complete {
            hook.fire();
        }
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("seq", &self.shared.seq)
            .field("context", &self.context)
            .field("state", &self.shared.state())
            .field("detached", &self.detached)
            .finish_non_exhaustive()
    }
}

/// Read side of an envelope, held by whoever waits on or inspects it.
#[derive(Clone)]
pub struct EnvelopeHandle {
    shared: Arc<EnvelopeShared>,
}

impl EnvelopeHandle {
    pub fn seq(&self) -> u64 {
        self.shared.seq
    }

    pub fn state(&self) -> InvocationState {
        self.shared.state()
    }

    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Message of the recorded failure, if any.
    pub fn failure_message(&self) -> Option<String> {
        self.shared.failure.lock().as_ref().map(|failure| failure.to_string())
    }

    /// Take the recorded failure. Later calls return `None`.
    pub fn take_failure(&self) -> Option<anyhow::Error> {
        self.shared.failure.lock().take()
    }
}

impl fmt::Debug for EnvelopeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeHandle")
            .field("seq", &self.shared.seq)
            .field("state", &self.shared.state())
            .finish()
    }
}
