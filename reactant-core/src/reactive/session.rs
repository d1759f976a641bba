//! Reactive Session
//!
//! The session is the central coordinator that connects signals, derived
//! values, and effects. It owns the dependency graph, the evaluation stack,
//! and the per-kind state tables, and it drains pending effects at the end of
//! every external event.
//!
//! # How It Works
//!
//! 1. Input arrives as `(name, value)` writes, alone or in a batch.
//!
//! 2. Each real change marks dependents dirty through the graph. Derived
//!    values stay dirty until read; effects join the pending set.
//!
//! 3. When the outermost write, batch, or isolate returns, the session
//!    flushes: pending effects run once each, in registration order.
//!
//! # Threading
//!
//! A session is deliberately `!Send`. Everything inside it runs on one
//! thread, one computation at a time. Concurrent clients get one session
//! each (see [`crate::host`]).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::config::SessionConfig;
use crate::error::{ReactiveError, Result};
use crate::graph::{NodeId, UpdateScheduler};
use crate::render::{NullTarget, RenderTarget};

use super::context::Tracker;
use super::derived::DerivedCache;
use super::effect::EffectRegistry;
use super::signal::SignalStore;

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Generate a new unique session id.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// One isolated reactive graph.
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) config: SessionConfig,
    pub(crate) graph: RefCell<UpdateScheduler>,
    pub(crate) tracker: Tracker,
    pub(crate) signals: RefCell<SignalStore>,
    pub(crate) derived: RefCell<DerivedCache>,
    pub(crate) effects: RefCell<EffectRegistry>,
    pub(crate) target: Rc<dyn RenderTarget>,
    pub(crate) flushing: Cell<bool>,
    batch_depth: Cell<usize>,
    on_ended: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl Session {
    /// Create a session with the default configuration.
    pub fn new(target: Rc<dyn RenderTarget>) -> Self {
        Self::with_config(SessionConfig::default(), target)
    }

    /// Create a session whose outputs go nowhere.
    pub fn headless() -> Self {
        Self::new(Rc::new(NullTarget))
    }

    pub fn with_config(config: SessionConfig, target: Rc<dyn RenderTarget>) -> Self {
        Self::with_id(SessionId::next(), config, target)
    }

    pub(crate) fn with_id(id: SessionId, config: SessionConfig, target: Rc<dyn RenderTarget>) -> Self {
        tracing::debug!(session = %id, "session started");
        Self {
            id,
            config,
            graph: RefCell::new(UpdateScheduler::new()),
            tracker: Tracker::default(),
            signals: RefCell::new(SignalStore::default()),
            derived: RefCell::new(DerivedCache::default()),
            effects: RefCell::new(EffectRegistry::default()),
            target,
            flushing: Cell::new(false),
            batch_depth: Cell::new(0),
            on_ended: RefCell::new(Vec::new()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Apply a set of input values as one external event.
    ///
    /// All writes land before any effect runs, so an effect that reads
    /// several of these inputs runs once.
    pub fn apply<I, K>(&self, inputs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        self.batch(|session| {
            for (name, value) in inputs {
                session.set(name.as_ref(), value)?;
            }
            Ok(())
        })
    }

    /// Run `f` as one external event: effects are deferred until it returns.
    pub fn batch<R>(&self, f: impl FnOnce(&Session) -> Result<R>) -> Result<R> {
        self.batch_depth.set(self.batch_depth.get() + 1);
        let result = f(self);
        self.batch_depth.set(self.batch_depth.get() - 1);
        let settled = self.settle();
        let value = result?;
        settled?;
        Ok(value)
    }

    /// Run `f` with reads allowed but not tracked.
    ///
    /// Inside a computation this reads ambient state without subscribing to
    /// it. From host code it is the way to inspect signals and derived
    /// values outside of any effect.
    pub fn isolate<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        let frame = self.tracker.enter_untracked();
        let result = f(self);
        drop(frame);
        if let Err(error) = self.settle() {
            tracing::error!(session = %self.id, %error, "flush after isolate failed");
        }
        result
    }

    /// Register a callback to run when the session is dropped.
    pub fn on_ended(&self, callback: impl FnOnce() + 'static) {
        self.on_ended.borrow_mut().push(Box::new(callback));
    }

    /// End the session. All nodes are destroyed together.
    pub fn close(self) {
        drop(self);
    }

    /// Number of nodes ever created in this session.
    pub fn node_count(&self) -> usize {
        self.graph.borrow().node_count()
    }

    /// Number of effects waiting for the next flush.
    pub fn pending_effects(&self) -> usize {
        self.graph.borrow().pending_count()
    }

    /// Flush pending effects unless an enclosing event or evaluation will.
    pub(crate) fn settle(&self) -> Result<()> {
        if self.flushing.get() || self.batch_depth.get() > 0 || self.tracker.is_active() {
            return Ok(());
        }
        self.flush()
    }

    pub(crate) fn check_handle(&self, owner: SessionId, node: NodeId) -> Result<()> {
        if owner == self.id {
            Ok(())
        } else {
            Err(ReactiveError::ForeignHandle {
                handle: format!("{owner}{node}"),
            })
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("node_count", &self.node_count())
            .field("pending_effects", &self.pending_effects())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let callbacks = std::mem::take(self.on_ended.get_mut());
        for callback in callbacks {
            callback();
        }
        tracing::debug!(session = %self.id, nodes = self.graph.get_mut().node_count(), "session ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::next(), SessionId::next());
    }

    #[test]
    fn on_ended_runs_at_close() {
        let ended = Rc::new(Cell::new(false));
        let session = Session::headless();
        let flag = ended.clone();
        session.on_ended(move || flag.set(true));

        assert!(!ended.get());
        session.close();
        assert!(ended.get());
    }

    #[test]
    fn batch_returns_body_value() {
        let session = Session::headless();
        let value = session
            .batch(|s| {
                s.set("a", json!(1))?;
                Ok(7)
            })
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(session.isolate(|s| s.get("a")).unwrap(), json!(1));
    }

    #[test]
    fn isolate_allows_reads_without_tracking() {
        let session = Session::headless();
        session.signal("a", json!("x")).unwrap();

        assert!(session.get("a").is_err());
        assert_eq!(session.isolate(|s| s.get("a")).unwrap(), json!("x"));
    }
}
