//! Errors returned by the bridge surface.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Boxed cause carried by [`BridgeError::InvocationTarget`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures surfaced to bridge callers.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The action ran on the dispatch thread and failed. The original failure
    /// is kept as the source with its message unchanged.
    #[error("invocation target failed: {cause}")]
    InvocationTarget {
        #[source]
        cause: BoxError,
    },
    /// A dispatch-thread-only operation was called from another thread.
    #[error("{operation} must be called on the dispatch thread")]
    NotDispatchThread { operation: &'static str },
    /// An operation that needs a target context was given none.
    #[error("{operation} requires a target context")]
    MissingContext { operation: &'static str },
    /// The performer worker pool could not be started.
    #[error("failed to start performer worker pool: {0}")]
    WorkerPool(#[from] std::io::Error),
}

impl BridgeError {
    /// Wraps a failure captured from an action.
    ///
    /// A failure that already is an invocation-target wrapper (a nested bridge
    /// call failed inside the action) is unwrapped so callers always see the
    /// innermost cause.
    pub fn invocation_target(failure: anyhow::Error) -> Self {
        match failure.downcast::<BridgeError>() {
            Ok(BridgeError::InvocationTarget { cause }) => Self::InvocationTarget { cause },
            Ok(other) => Self::InvocationTarget { cause: Box::new(other) },
            Err(failure) => Self::InvocationTarget { cause: failure.into() },
        }
    }

    /// Original cause of an invocation-target failure.
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::InvocationTarget { cause } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

/// Runs `f`, turning a panic into a failure that carries the panic message.
pub(crate) fn catch_failure<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(panic_failure(payload)),
    }
}

fn panic_failure(payload: Box<dyn Any + Send>) -> anyhow::Error {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        anyhow::anyhow!("{msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        anyhow::anyhow!("{msg}")
    } else {
        anyhow::anyhow!("action panicked")
    }
}
