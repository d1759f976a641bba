//! Derived Values
//!
//! A derived value is a cached computation over signals and other derived
//! values. It re-evaluates only when one of its dependencies changed since
//! the last evaluation and someone reads it.
//!
//! # How Derived Values Work
//!
//! 1. Creation does not run the body. The first read does.
//!
//! 2. While clean, every read returns the cached result, so any number of
//!    readers within one invalidation cycle share a single evaluation.
//!
//! 3. A dependency write marks the value dirty. Nothing recomputes until the
//!    next read; a derived value nobody reads stays dirty.
//!
//! 4. Results are not compared. Any dependency change invalidates.
//!
//! Failures are cached like values: every reader sees the same error until
//! the next dependency change forces a fresh evaluation.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{ReactiveError, Result};
use crate::graph::{DirtyState, NodeId, NodeKind};

use super::session::{Session, SessionId};

/// Body of a derived value.
pub type DerivedFn = Rc<dyn Fn(&Session) -> Result<Value>>;

pub(crate) struct DerivedEntry {
    body: DerivedFn,
    cached: Option<Result<Value>>,
    evaluating: bool,
    runs: u64,
}

#[derive(Default)]
pub(crate) struct DerivedCache {
    entries: HashMap<NodeId, DerivedEntry>,
}

impl DerivedCache {
    fn runs(&self, id: NodeId) -> u64 {
        self.entries.get(&id).map_or(0, |entry| entry.runs)
    }

    fn is_cached(&self, id: NodeId) -> bool {
        self.entries.get(&id).is_some_and(|entry| entry.cached.is_some())
    }

    /// Forget cached results so the next read re-evaluates.
    pub fn discard(&mut self, ids: &[NodeId]) {
        for id in ids {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.cached = None;
            }
        }
    }
}

/// Handle to a derived value.
///
/// Handles are cheap to copy into the bodies of other computations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Derived {
    session: SessionId,
    node: NodeId,
}

impl Derived {
    /// Read the value, recomputing it if dirty.
    ///
    /// Like a signal read, this subscribes the current computation and fails
    /// outside of any evaluation.
    pub fn get(&self, session: &Session) -> Result<Value> {
        session.read_derived(*self)
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn state(&self, session: &Session) -> DirtyState {
        if !session.derived.borrow().is_cached(self.node) {
            return DirtyState::Dirty;
        }
        session
            .graph
            .borrow()
            .get_node(self.node)
            .map_or(DirtyState::Dirty, |node| node.dirty_state())
    }

    /// Number of times the body has been evaluated.
    pub fn run_count(&self, session: &Session) -> u64 {
        session.derived.borrow().runs(self.node)
    }
}

impl Session {
    /// Create a derived value. The body runs on first read.
    pub fn derived<F>(&self, label: impl Into<String>, body: F) -> Derived
    where
        F: Fn(&Session) -> Result<Value> + 'static,
    {
        self.derived_from_fn(label.into(), Rc::new(body))
    }

    pub(crate) fn derived_from_fn(&self, label: String, body: DerivedFn) -> Derived {
        let node = self.graph.borrow_mut().add_node(NodeKind::Derived, label);
        self.derived.borrow_mut().entries.insert(
            node,
            DerivedEntry {
                body,
                cached: None,
                evaluating: false,
                runs: 0,
            },
        );
        Derived { session: self.id, node }
    }

    pub(crate) fn read_derived(&self, handle: Derived) -> Result<Value> {
        self.check_handle(handle.session, handle.node)?;
        let id = handle.node;

        if !self.tracker.is_active() {
            return Err(ReactiveError::OutOfContextAccess {
                name: self.graph.borrow().label(id),
            });
        }

        let body = {
            let mut cache = self.derived.borrow_mut();
            let Some(entry) = cache.entries.get_mut(&id) else {
                return Err(ReactiveError::failed(format!("unknown derived value {id}")));
            };

            if entry.evaluating {
                return Err(self.cycle_error(id));
            }

            self.tracker.track(id);

            let clean = self.graph.borrow().get_node(id).is_some_and(|node| node.is_clean());
            if clean {
                if let Some(cached) = &entry.cached {
                    return cached.clone();
                }
            }

            entry.evaluating = true;
            Rc::clone(&entry.body)
        };

        // Marked clean before the body runs so a write during evaluation
        // leaves the node dirty for the next read.
        if let Some(node) = self.graph.borrow_mut().get_node_mut(id) {
            node.mark_clean();
        }

        let frame = self.tracker.enter(id);
        let result = body(self);
        let reads = frame.finish();
        {
            let mut graph = self.graph.borrow_mut();
            graph.set_dependencies(id, &reads);
            if graph.has_stale_dependency(id) {
                graph.invalidate(id);
            }
        }

        let runs = {
            let mut cache = self.derived.borrow_mut();
            match cache.entries.get_mut(&id) {
                Some(entry) => {
                    entry.evaluating = false;
                    entry.runs += 1;
                    entry.cached = Some(result.clone());
                    entry.runs
                }
                None => 0,
            }
        };

        match &result {
            Err(error) if !error.is_silent() => {
                tracing::warn!(session = %self.id, node = %id, runs, %error, "derived value failed");
            }
            _ => {
                tracing::debug!(session = %self.id, node = %id, runs, deps = reads.len(), "derived value recomputed");
            }
        }

        result
    }

    fn cycle_error(&self, id: NodeId) -> ReactiveError {
        let chain = self.tracker.consumers();
        let start = chain.iter().position(|consumer| *consumer == id).unwrap_or(0);

        let graph = self.graph.borrow();
        let mut path: Vec<String> = chain[start..].iter().map(|node| graph.label(*node)).collect();
        path.push(graph.label(id));

        tracing::error!(session = %self.id, path = %path.join(" -> "), "cyclic dependency");
        ReactiveError::CyclicDependency { path }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
