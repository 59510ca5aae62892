//! Invocation bridge: envelopes, the native mediator boundary, the dispatch
//! router boundary and the blocking/non-blocking invocation surface.

pub mod callback;
pub mod envelope;
pub mod invoke;
pub mod mediator;
pub mod router;

pub use callback::CompletionHook;
pub use envelope::{Envelope, EnvelopeHandle};
pub use invoke::InvocationBridge;
pub use mediator::{MediatorToken, NativeLoop};
pub use router::DispatchRouter;
