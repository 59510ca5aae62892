//! Process-wide coordination between blocking waits and priority calls.
//!
//! Two pieces of state decide how a nested loop behaves:
//!
//! - `blocking_depth`: number of ordinary `invoke_and_wait` calls currently
//!   parked in a nested loop. A secondary dispatch loop opened by a priority
//!   call keeps pumping while this is non-zero.
//! - `priority_pending`: set while a priority call runs on the dispatch
//!   thread. Ordinary waits that start meanwhile neither count themselves nor
//!   block native event processing.
//!
//! The check-then-set sequences run under one guard lock; the counter itself
//! is lock-free. Every mutation is paired with a guard value so it is released
//! on every exit path, unwinding included.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct CoordinationState {
    blocking_depth: AtomicUsize,
    priority_pending: AtomicBool,
    guard: Mutex<()>,
}

impl CoordinationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance.
    pub fn global() -> Arc<Self> {
        Arc::clone(&crate::COORDINATION)
    }

    pub fn blocking_depth(&self) -> usize {
        self.blocking_depth.load(Ordering::Acquire)
    }

    pub fn has_blocking_waits(&self) -> bool {
        self.blocking_depth() > 0
    }

    pub fn is_priority_pending(&self) -> bool {
        self.priority_pending.load(Ordering::Acquire)
    }

    /// Register an ordinary blocking wait.
    ///
    /// Returns [`WaitPermit::Blocking`] (counted until dropped) unless a
    /// priority call is pending, in which case the wait runs as
    /// [`WaitPermit::NonBlocking`] and is not counted.
    pub fn enter_blocking(&self) -> WaitPermit<'_> {
        let _guard = self.guard.lock();
        if self.priority_pending.load(Ordering::Acquire) {
            WaitPermit::NonBlocking
        } else {
            self.blocking_depth.fetch_add(1, Ordering::AcqRel);
            WaitPermit::Blocking(BlockingGuard { state: self })
        }
    }

    /// Mark a priority call as running until the returned guard drops.
    ///
    /// Nested priority sections restore the previous flag on exit rather than
    /// clearing it underneath the outer section.
    pub fn begin_priority(&self) -> PriorityGuard<'_> {
        let _guard = self.guard.lock();
        let previous = self.priority_pending.swap(true, Ordering::AcqRel);
        PriorityGuard { state: self, previous }
    }
}

/// Outcome of [`CoordinationState::enter_blocking`].
#[derive(Debug)]
pub enum WaitPermit<'a> {
    /// Counted in the blocking depth; the nested loop does not dispatch
    /// ordinary native events.
    Blocking(BlockingGuard<'a>),
    /// Not counted; the nested loop dispatches every class of native event.
    NonBlocking,
}

impl WaitPermit<'_> {
    pub fn processes_events(&self) -> bool {
        matches!(self, Self::NonBlocking)
    }
}

/// Decrements the blocking depth exactly once, on drop.
#[derive(Debug)]
pub struct BlockingGuard<'a> {
    state: &'a CoordinationState,
}

impl Drop for BlockingGuard<'_> {
    fn drop(&mut self) {
        let previous = self.state.blocking_depth.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "blocking depth underflow");
    }
}

/// Restores the priority flag on drop.
#[derive(Debug)]
pub struct PriorityGuard<'a> {
    state: &'a CoordinationState,
    previous: bool,
}

impl Drop for PriorityGuard<'_> {
    fn drop(&mut self) {
        let _guard = self.state.guard.lock();
        self.state.priority_pending.store(self.previous, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_permit_counts_until_dropped() {
        let state = CoordinationState::new();
        let first = state.enter_blocking();
        let second = state.enter_blocking();
        assert!(!first.processes_events());
        assert_eq!(state.blocking_depth(), 2);

        drop(first);
        assert_eq!(state.blocking_depth(), 1);
        drop(second);
        assert_eq!(state.blocking_depth(), 0);
        assert!(!state.has_blocking_waits());
    }

    #[test]
    fn test_priority_makes_waits_nonblocking() {
        let state = CoordinationState::new();
        let priority = state.begin_priority();
        assert!(state.is_priority_pending());

        let permit = state.enter_blocking();
        assert!(permit.processes_events());
        assert_eq!(state.blocking_depth(), 0);

        drop(permit);
        drop(priority);
        assert!(!state.is_priority_pending());
    }

    #[test]
    fn test_nested_priority_restores_outer_flag() {
        let state = CoordinationState::new();
        let outer = state.begin_priority();
        {
            let _inner = state.begin_priority();
            assert!(state.is_priority_pending());
        }
        assert!(state.is_priority_pending());
        drop(outer);
        assert!(!state.is_priority_pending());
    }

    #[test]
    fn test_guard_released_on_panic() {
        let state = CoordinationState::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _permit = state.enter_blocking();
            let _priority = state.begin_priority();
            panic!("unwind");
        }));
        assert!(result.is_err());
        assert_eq!(state.blocking_depth(), 0);
        assert!(!state.is_priority_pending());
    }

    #[test]
    fn test_concurrent_permits_balance() {
        let state = Arc::new(CoordinationState::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        let _permit = state.enter_blocking();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(state.blocking_depth(), 0);
    }
}
