//! Per-context stack of pending-invocation queues.
//!
//! Every in-flight offloaded call owns one frame. Nested invocations offered
//! while the call runs land on the top live frame and are drained by the
//! performer loop that owns it. The stack has one monitor; each frame queue
//! has its own, always taken after the stack's.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::bridge::envelope::Envelope;

pub(crate) enum FrameItem {
    Invocation(Envelope),
    /// Posted when the owning call completes so a parked poll re-checks.
    Wake,
}

#[derive(Default)]
struct FrameQueue {
    items: VecDeque<FrameItem>,
    abandoned: bool,
}

pub(crate) struct Frame {
    id: u64,
    queue: Mutex<FrameQueue>,
    ready: Condvar,
}

impl Frame {
    fn new(id: u64) -> Self {
        Self { id, queue: Mutex::new(FrameQueue::default()), ready: Condvar::new() }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().items.is_empty()
    }

    fn push(&self, item: FrameItem) {
        self.queue.lock().items.push_back(item);
        self.ready.notify_one();
    }

    /// Next queued item, waiting at most `timeout` for one to arrive.
    pub(crate) fn poll(&self, timeout: Duration) -> Option<FrameItem> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.queue.lock();
        loop {
            if let Some(item) = queue.items.pop_front() {
                return Some(item);
            }
            if self.ready.wait_until(&mut queue, deadline).timed_out() {
                return queue.items.pop_front();
            }
        }
    }

    fn is_abandoned(&self) -> bool {
        self.queue.lock().abandoned
    }
}

#[derive(Default)]
pub(crate) struct FrameStack {
    frames: Mutex<Vec<Arc<Frame>>>,
    next_id: AtomicU64,
}

impl FrameStack {
    pub(crate) fn push_frame(&self) -> Arc<Frame> {
        let frame = Arc::new(Frame::new(self.next_id.fetch_add(1, Ordering::Relaxed)));
        self.frames.lock().push(Arc::clone(&frame));
        frame
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.lock().len()
    }

    /// Queue `envelope` on the top live frame. Hands it back when no frame
    /// is accepting work.
    pub(crate) fn offer(&self, envelope: Envelope) -> Result<(), Envelope> {
        let frames = self.frames.lock();
        match frames.iter().rev().find(|frame| !frame.is_abandoned()) {
            Some(frame) => {
                tracing::debug!(seq = envelope.seq(), frame = frame.id, "invocation offered to performer frame");
                frame.push(FrameItem::Invocation(envelope));
                Ok(())
            }
            None => Err(envelope),
        }
    }

    /// Pop `frame` once its offloaded call is done.
    ///
    /// `finish` publishes the call's outcome while the stack is still locked,
    /// so by the time the owner observes completion no further offer can reach
    /// the frame. A wake item follows so a parked poll returns promptly.
    pub(crate) fn complete(&self, frame: &Arc<Frame>, finish: impl FnOnce()) {
        let mut frames = self.frames.lock();
        match frames.iter().rposition(|candidate| Arc::ptr_eq(candidate, frame)) {
            Some(index) => {
                frames.remove(index);
            }
            None => tracing::warn!(frame = frame.id, "completed frame was not on the stack"),
        }
        finish();
        frame.push(FrameItem::Wake);
    }

    /// Stop routing offers to `frame` after its owner gave up waiting.
    ///
    /// The frame stays on the stack until its call completes. Returns the
    /// invocations that were queued before the frame was closed.
    pub(crate) fn abandon(&self, frame: &Arc<Frame>) -> Vec<Envelope> {
        let _frames = self.frames.lock();
        let mut queue = frame.queue.lock();
        queue.abandoned = true;
        queue
            .items
            .drain(..)
            .filter_map(|item| match item {
                FrameItem::Invocation(envelope) => Some(envelope),
                FrameItem::Wake => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> Envelope {
        Envelope::new(|| Ok(()), None)
    }

    #[test]
    fn test_offer_without_frames_is_rejected() {
        let stack = FrameStack::default();
        assert!(stack.offer(envelope()).is_err());
    }

    #[test]
    fn test_offer_goes_to_top_frame() {
        let stack = FrameStack::default();
        let outer = stack.push_frame();
        let inner = stack.push_frame();
        assert_eq!(stack.depth(), 2);

        assert!(stack.offer(envelope()).is_ok());
        assert!(outer.is_empty());
        assert!(!inner.is_empty());
    }

    #[test]
    fn test_complete_pops_and_wakes() {
        let stack = FrameStack::default();
        let frame = stack.push_frame();
        let mut finished = false;
        stack.complete(&frame, || finished = true);

        assert!(finished);
        assert_eq!(stack.depth(), 0);
        assert!(matches!(frame.poll(Duration::from_millis(10)), Some(FrameItem::Wake)));
    }

    #[test]
    fn test_complete_out_of_order_removes_the_right_frame() {
        let stack = FrameStack::default();
        let outer = stack.push_frame();
        let inner = stack.push_frame();
        stack.complete(&outer, || {});

        assert_eq!(stack.depth(), 1);
        assert!(stack.offer(envelope()).is_ok());
        assert!(!inner.is_empty());
    }

    #[test]
    fn test_abandoned_frame_is_skipped() {
        let stack = FrameStack::default();
        let outer = stack.push_frame();
        let inner = stack.push_frame();
        stack.offer(envelope()).unwrap();

        let leftovers = stack.abandon(&inner);
        assert_eq!(leftovers.len(), 1);
        assert_eq!(stack.depth(), 2);

        stack.offer(envelope()).unwrap();
        assert!(!outer.is_empty());
        assert!(inner.is_empty());
    }

    #[test]
    fn test_poll_times_out() {
        let stack = FrameStack::default();
        let frame = stack.push_frame();
        let started = Instant::now();
        assert!(frame.poll(Duration::from_millis(20)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
