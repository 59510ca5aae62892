//! Identities and lifecycle states shared across the bridge.

use std::fmt;

use serde::Serialize;

/// Opaque identity of an application dispatch context (one per window or
/// app context). The router maps it to the dispatch thread that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContextId(u64);

impl ContextId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Lifecycle of one invocation envelope.
///
/// `Created → Posted → Dispatching → (Completed | Failed)`. Transitions only
/// move forward and never skip `Dispatching`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    Created = 0,
    Posted = 1,
    Dispatching = 2,
    Completed = 3,
    Failed = 4,
}

impl InvocationState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Posted,
            2 => Self::Dispatching,
            3 => Self::Completed,
            _ => Self::Failed,
        }
    }

    /// Whether the envelope has finished running, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}
