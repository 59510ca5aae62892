//! One-shot completion hook attached to an envelope.

use std::fmt;

/// Wraps the closure an envelope fires when it finishes.
///
/// The bridge uses it to stop the waiting caller's nested loop. Firing
/// consumes the hook, so it can run at most once.
pub struct CompletionHook {
    hook: Box<dyn FnOnce() + Send>,
}

impl CompletionHook {
    pub fn new(hook: impl FnOnce() + Send + 'static) -> Self {
        Self { hook: Box::new(hook) }
    }

    pub fn fire(self) {
        (self.hook)();
    }
}

impl fmt::Debug for CompletionHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompletionHook")
    }
}
