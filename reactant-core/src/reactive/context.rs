//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal or derived
//! value is read, the read is recorded against the current computation.
//!
//! # Implementation
//!
//! Each session owns an evaluation stack. Before a derived value or effect
//! runs, a frame is pushed for it; every tracked read appends to the top
//! frame; when the computation completes the frame is popped and its reads
//! become the consumer's new dependency set.
//!
//! The stack is owned by the session rather than kept in a thread-local, so
//! two sessions driven from the same thread never see each other's frames.
//!
//! Untracked frames (pushed by `isolate`) allow reads without recording them.

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::graph::NodeId;

/// Producers read during one evaluation.
pub(crate) type Reads = SmallVec<[NodeId; 8]>;

#[derive(Debug)]
struct Frame {
    /// The computation being evaluated. `None` for a top-level isolate.
    consumer: Option<NodeId>,
    /// Whether reads in this frame become dependencies.
    tracked: bool,
    reads: Reads,
}

/// The evaluation stack of one session.
#[derive(Debug, Default)]
pub(crate) struct Tracker {
    stack: RefCell<Vec<Frame>>,
}

impl Tracker {
    /// Enter a tracked frame for `consumer`.
    ///
    /// The frame is popped when the guard is finished or dropped.
    pub fn enter(&self, consumer: NodeId) -> FrameGuard<'_> {
        self.push(Frame {
            consumer: Some(consumer),
            tracked: true,
            reads: Reads::new(),
        })
    }

    /// Enter a frame in which reads are allowed but not recorded.
    pub fn enter_untracked(&self) -> FrameGuard<'_> {
        let consumer = self.current_consumer();
        self.push(Frame {
            consumer,
            tracked: false,
            reads: Reads::new(),
        })
    }

    fn push(&self, frame: Frame) -> FrameGuard<'_> {
        let mut stack = self.stack.borrow_mut();
        stack.push(frame);
        FrameGuard {
            tracker: self,
            depth: stack.len(),
            finished: false,
        }
    }

    /// Check if any evaluation is in progress.
    pub fn is_active(&self) -> bool {
        !self.stack.borrow().is_empty()
    }

    pub fn current_consumer(&self) -> Option<NodeId> {
        self.stack.borrow().last().and_then(|frame| frame.consumer)
    }

    /// Record a read of `producer` in the top frame.
    pub fn track(&self, producer: NodeId) {
        if let Some(frame) = self.stack.borrow_mut().last_mut() {
            if frame.tracked && !frame.reads.contains(&producer) {
                frame.reads.push(producer);
            }
        }
    }

    /// Consumers on the stack from outermost to innermost, without repeats.
    pub fn consumers(&self) -> Vec<NodeId> {
        let stack = self.stack.borrow();
        let mut chain: Vec<NodeId> = Vec::with_capacity(stack.len());
        for consumer in stack.iter().filter_map(|frame| frame.consumer) {
            if chain.last() != Some(&consumer) {
                chain.push(consumer);
            }
        }
        chain
    }

    /// Consumers still on the stack that have already read `producer`.
    ///
    /// Their edges are only installed when they finish, so a write to
    /// `producer` must invalidate them directly.
    pub fn readers_of(&self, producer: NodeId) -> Reads {
        self.stack
            .borrow()
            .iter()
            .filter(|frame| frame.tracked && frame.reads.contains(&producer))
            .filter_map(|frame| frame.consumer)
            .collect()
    }

    fn pop(&self, depth: usize) -> Option<Frame> {
        let mut stack = self.stack.borrow_mut();
        debug_assert_eq!(
            stack.len(),
            depth,
            "evaluation frames popped out of order"
        );
        stack.pop()
    }
}

/// Guard that pops its frame when finished or dropped.
///
/// Dropping without finishing discards the reads, which keeps the stack
/// balanced if a computation panics.
pub(crate) struct FrameGuard<'a> {
    tracker: &'a Tracker,
    depth: usize,
    finished: bool,
}

impl FrameGuard<'_> {
    /// Pop the frame and return the producers read while it was on top.
    pub fn finish(mut self) -> Reads {
        self.finished = true;
        self.tracker
            .pop(self.depth)
            .map(|frame| frame.reads)
            .unwrap_or_default()
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.tracker.pop(self.depth);
        }
    }
}
