//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When registered, the effect is scheduled and runs at the end of the
//!    current external event (immediately, when registered outside one) to
//!    establish its initial dependencies.
//!
//! 2. When any dependency changes, the effect joins the pending set.
//!
//! 3. The session drains the pending set once per external event, running
//!    each pending effect once, in registration order.
//!
//! 4. Each run rebuilds the effect's dependencies from the reads it made.
//!
//! # Output Effects
//!
//! An output effect is bound to a named render slot. Its body produces a
//! payload that is written to the session's render target. Binding a name a
//! second time disposes the previous effect.
//!
//! # Failures
//!
//! A failing body is logged and reported to the render target. The effect
//! stays registered and runs again on its next invalidation. A guarded-read
//! halt is not a failure: the run ends and the output is left as it was.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{ReactiveError, Result};
use crate::graph::{DirtyState, NodeId, NodeKind};
use crate::render::RenderKind;

use super::session::{Session, SessionId};

/// Body of a plain effect.
pub type ObserverFn = Rc<dyn Fn(&Session) -> Result<()>>;

/// Body of an output effect; the returned value is the render payload.
pub type RenderFn = Rc<dyn Fn(&Session) -> Result<Value>>;

#[derive(Clone)]
pub(crate) enum EffectBody {
    Observer(ObserverFn),
    Output {
        name: String,
        kind: RenderKind,
        render: RenderFn,
    },
}

pub(crate) struct EffectEntry {
    body: EffectBody,
    runs: u64,
}

#[derive(Default)]
pub(crate) struct EffectRegistry {
    entries: HashMap<NodeId, EffectEntry>,
    outputs: IndexMap<String, NodeId>,
}

/// Handle to a registered effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Effect {
    session: SessionId,
    node: NodeId,
}

impl Effect {
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Number of times the effect has run.
    pub fn run_count(&self, session: &Session) -> u64 {
        session
            .effects
            .borrow()
            .entries
            .get(&self.node)
            .map_or(0, |entry| entry.runs)
    }

    pub fn state(&self, session: &Session) -> DirtyState {
        session
            .graph
            .borrow()
            .get_node(self.node)
            .map_or(DirtyState::Uninitialized, |node| node.dirty_state())
    }

    pub fn is_disposed(&self, session: &Session) -> bool {
        session
            .graph
            .borrow()
            .get_node(self.node)
            .map_or(true, |node| node.is_disposed())
    }

    /// Dispose of the effect. It never runs again.
    pub fn dispose(&self, session: &Session) -> Result<()> {
        session.check_handle(self.session, self.node)?;
        session.dispose_effect(self.node);
        Ok(())
    }
}

impl Session {
    /// Register a plain effect.
    pub fn observe<F>(&self, label: impl Into<String>, body: F) -> Result<Effect>
    where
        F: Fn(&Session) -> Result<()> + 'static,
    {
        self.register_effect(label.into(), EffectBody::Observer(Rc::new(body)))
    }

    /// Bind an output slot to a render body, replacing any previous binding.
    pub fn output<F>(&self, name: impl Into<String>, kind: RenderKind, render: F) -> Result<Effect>
    where
        F: Fn(&Session) -> Result<Value> + 'static,
    {
        let name = name.into();
        let previous = self.effects.borrow().outputs.get(&name).copied();
        if let Some(previous) = previous {
            tracing::debug!(session = %self.id, output = %name, node = %previous, "replacing output binding");
            self.dispose_effect(previous);
        }

        let body = EffectBody::Output {
            name: name.clone(),
            kind,
            render: Rc::new(render),
        };
        self.register_effect(format!("output:{name}"), body)
    }

    /// Unbind an output slot and clear it. Returns false if it was not bound.
    pub fn remove_output(&self, name: &str) -> bool {
        let bound = self.effects.borrow().outputs.get(name).copied();
        match bound {
            Some(node) => {
                self.dispose_effect(node);
                self.target.clear(name);
                true
            }
            None => false,
        }
    }

    /// Names of bound outputs, in binding order.
    pub fn output_names(&self) -> Vec<String> {
        self.effects.borrow().outputs.keys().cloned().collect()
    }

    pub(crate) fn register_effect(&self, label: String, body: EffectBody) -> Result<Effect> {
        let node = self.graph.borrow_mut().add_node(NodeKind::Effect, label);
        {
            let mut effects = self.effects.borrow_mut();
            if let EffectBody::Output { name, .. } = &body {
                effects.outputs.insert(name.clone(), node);
            }
            effects.entries.insert(node, EffectEntry { body, runs: 0 });
        }

        self.graph.borrow_mut().schedule(node);
        self.settle()?;
        Ok(Effect { session: self.id, node })
    }

    fn dispose_effect(&self, node: NodeId) {
        self.graph.borrow_mut().dispose(node);

        let mut effects = self.effects.borrow_mut();
        if let Some(EffectEntry { body: EffectBody::Output { name, .. }, .. }) = effects.entries.remove(&node) {
            if effects.outputs.get(&name) == Some(&node) {
                effects.outputs.shift_remove(&name);
            }
        }
    }

    /// Run pending effects until none remain.
    pub(crate) fn flush(&self) -> Result<()> {
        if self.flushing.replace(true) {
            return Ok(());
        }

        let span = tracing::debug_span!("flush", session = %self.id);
        let _enter = span.enter();

        let limit = self.config.max_flush_passes.max(1);
        let mut passes = 0;

        let outcome = loop {
            if !self.graph.borrow().has_pending() {
                break Ok(());
            }

            passes += 1;
            if passes > limit {
                let rearmed = self.graph.borrow_mut().abandon_pending();
                self.derived.borrow_mut().discard(&rearmed);
                tracing::error!(passes = limit, rearmed = rearmed.len(), "effects kept invalidating each other; abandoning flush");
                break Err(ReactiveError::FlushLimitExceeded { passes: limit });
            }

            let pending = self.graph.borrow_mut().take_pending();
            tracing::debug!(pass = passes, effects = pending.len(), "running pending effects");
            for node in pending {
                self.run_effect(node);
            }
        };

        self.flushing.set(false);
        outcome
    }

    fn run_effect(&self, node: NodeId) {
        let body = match self.effects.borrow().entries.get(&node) {
            Some(entry) => entry.body.clone(),
            None => return,
        };

        {
            let mut graph = self.graph.borrow_mut();
            match graph.get_node_mut(node) {
                Some(graph_node) if !graph_node.is_disposed() => graph_node.mark_clean(),
                _ => return,
            }
        }

        let frame = self.tracker.enter(node);
        let outcome = match &body {
            EffectBody::Observer(observer) => observer(self).map(|()| None),
            EffectBody::Output { render, .. } => render(self).map(Some),
        };
        let reads = frame.finish();
        {
            let mut graph = self.graph.borrow_mut();
            graph.set_dependencies(node, &reads);
            if graph.has_stale_dependency(node) {
                graph.invalidate(node);
            }
        }

        if let Some(entry) = self.effects.borrow_mut().entries.get_mut(&node) {
            entry.runs += 1;
        }

        let slot = match &body {
            EffectBody::Output { name, .. } => name.clone(),
            EffectBody::Observer(_) => self.graph.borrow().label(node),
        };

        match (outcome, &body) {
            (Ok(Some(payload)), EffectBody::Output { name, kind, .. }) => {
                tracing::trace!(node = %node, output = %name, "output rendered");
                self.target.write(name, *kind, &payload);
            }
            (Ok(_), _) => {}
            (Err(error), _) if error.is_silent() => {
                tracing::trace!(node = %node, effect = %slot, "effect halted on missing value");
            }
            (Err(error), body) => {
                if let ReactiveError::Validation { message } = &error {
                    tracing::debug!(node = %node, effect = %slot, %message, "validation failed");
                } else {
                    tracing::warn!(node = %node, effect = %slot, %error, "effect failed");
                }
                if matches!(body, EffectBody::Output { .. }) && self.config.clear_on_error {
                    self.target.clear(&slot);
                }
                self.target.report_error(&slot, &error);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
