//! Cross-loop invocation bridge between a native UI run loop and an
//! application dispatch thread.
//!
//! Either side can synchronously run code on the other without the two loops
//! deadlocking: a waiting caller spins a nested native loop until its envelope
//! completes, and the dispatch thread can offload blocking native calls to
//! helper threads while still servicing the reentrant work those calls post
//! back. Process-wide defaults for the coordination state and the performer
//! registry live in lazily-initialised statics; every component also accepts
//! injected instances so it can be driven in isolation.

pub mod bridge;
pub mod config;
pub mod coordination;
pub mod error;
pub mod event;
pub mod performer;
pub mod sim;

use std::sync::Arc;

use once_cell::sync::Lazy;

pub use bridge::{
    CompletionHook, DispatchRouter, Envelope, EnvelopeHandle, InvocationBridge, MediatorToken,
    NativeLoop,
};
pub use config::BridgeConfig;
pub use coordination::{BlockingGuard, CoordinationState, PriorityGuard, WaitPermit};
pub use error::BridgeError;
pub use event::{ContextId, InvocationState};
pub use performer::{PerformerContext, PerformerRegistry, SelectorPerformer};

/// Blocking-depth counter and priority flag shared by every bridge that does
/// not inject its own.
pub(crate) static COORDINATION: Lazy<Arc<CoordinationState>> =
    Lazy::new(|| Arc::new(CoordinationState::new()));

/// Dispatch thread → performer context table shared by every bridge that does
/// not inject its own. Configured from the environment on first use.
pub(crate) static PERFORMERS: Lazy<Arc<PerformerRegistry>> =
    Lazy::new(|| Arc::new(PerformerRegistry::new(BridgeConfig::from_env())));
