//! In-process stand-ins for the host run loop and the application event
//! queue, used to drive the bridge in tests and in the demo binary.

mod dispatch;
mod native;

pub use dispatch::SimDispatcher;
pub use native::{MediatorEvent, RunLoopMode, SimNativeLoop};
