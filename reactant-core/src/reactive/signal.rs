//! Signal Store
//!
//! A signal is the fundamental reactive primitive: a named cell holding the
//! current value of an input. Signals are the roots of the dependency graph.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (derived value or
//!    effect), the read is recorded as a dependency of that computation.
//!
//! 2. When a write changes the value, every dependent is marked dirty.
//!    A write that leaves the value unchanged under the equality policy does
//!    nothing at all.
//!
//! 3. Writes never remove edges. Only the consumer's next evaluation does.
//!
//! Signals are addressed by name. Reading or writing an unknown name creates
//! the signal on the spot with no value, which is how a computation can
//! depend on an input the client has not sent yet.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::EqualityPolicy;
use crate::error::{ReactiveError, Result};
use crate::graph::{NodeId, NodeKind};

use super::session::Session;

#[derive(Debug)]
pub(crate) struct SignalCell {
    value: Option<Value>,
    policy: EqualityPolicy,
}

/// Signal values and the name index.
#[derive(Debug, Default)]
pub(crate) struct SignalStore {
    by_name: IndexMap<String, NodeId>,
    cells: HashMap<NodeId, SignalCell>,
}

impl SignalStore {
    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn insert(&mut self, name: String, id: NodeId, value: Option<Value>, policy: EqualityPolicy) {
        self.by_name.insert(name, id);
        self.cells.insert(id, SignalCell { value, policy });
    }

    pub fn value(&self, id: NodeId) -> Option<&Value> {
        self.cells.get(&id).and_then(|cell| cell.value.as_ref())
    }

    /// Store `value` if it differs from the current one. Returns whether it did.
    pub fn write(&mut self, id: NodeId, value: Value, same: Option<&dyn Fn(&Value, &Value) -> bool>) -> bool {
        let Some(cell) = self.cells.get_mut(&id) else {
            return false;
        };

        let unchanged = match (cell.value.as_ref(), same) {
            (Some(old), Some(same)) => same(old, &value),
            (None, Some(_)) => false,
            (old, None) => cell.policy.unchanged(old, &value),
        };
        if unchanged {
            return false;
        }

        cell.value = Some(value);
        true
    }

    pub fn names(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }
}

impl Session {
    /// Define a signal with an initial value.
    ///
    /// Defining a name that already exists writes the value instead.
    pub fn signal(&self, name: impl Into<String>, initial: Value) -> Result<()> {
        self.signal_with_policy(name, initial, self.config.equality)
    }

    /// Define a signal that uses its own equality policy.
    pub fn signal_with_policy(&self, name: impl Into<String>, initial: Value, policy: EqualityPolicy) -> Result<()> {
        let name = name.into();
        let existing = self.signals.borrow().lookup(&name);
        if existing.is_some() {
            self.write_signal(&name, initial, None)?;
            return Ok(());
        }

        let id = self.graph.borrow_mut().add_node(NodeKind::Signal, name.clone());
        tracing::trace!(session = %self.id, node = %id, signal = %name, "signal defined");
        self.signals.borrow_mut().insert(name, id, Some(initial), policy);
        Ok(())
    }

    /// Read a signal, subscribing the current computation to it.
    ///
    /// An unset signal reads as `null`. Reading outside of any evaluation
    /// fails with [`ReactiveError::OutOfContextAccess`].
    pub fn get(&self, name: &str) -> Result<Value> {
        if !self.tracker.is_active() {
            return Err(ReactiveError::OutOfContextAccess { name: name.to_string() });
        }

        let id = self.ensure_signal(name);
        self.tracker.track(id);

        Ok(self.signals.borrow().value(id).cloned().unwrap_or(Value::Null))
    }

    /// Read a signal and deserialize it into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.get(name)?;
        serde_json::from_value(value).map_err(|err| ReactiveError::failed(format!("input `{name}`: {err}")))
    }

    /// Write a signal. Returns whether the write changed the value.
    ///
    /// Outside of a batch, flush, or evaluation this is a complete external
    /// event: pending effects run before it returns.
    pub fn set(&self, name: &str, value: Value) -> Result<bool> {
        self.write_signal(name, value, None)
    }

    /// Write a signal using `same` to decide whether the value changed.
    pub fn set_with(&self, name: &str, value: Value, same: impl Fn(&Value, &Value) -> bool) -> Result<bool> {
        self.write_signal(name, value, Some(&same))
    }

    /// Names of all known signals, in definition order.
    pub fn input_names(&self) -> Vec<String> {
        self.signals.borrow().names()
    }

    fn write_signal(&self, name: &str, value: Value, same: Option<&dyn Fn(&Value, &Value) -> bool>) -> Result<bool> {
        let id = self.ensure_signal(name);

        let changed = self.signals.borrow_mut().write(id, value, same);
        if !changed {
            tracing::trace!(session = %self.id, signal = name, "write left value unchanged");
            return Ok(false);
        }

        let in_flight = self.tracker.readers_of(id);
        let scheduled = {
            let mut graph = self.graph.borrow_mut();
            let mut scheduled = graph.mark_changed(id);
            for reader in in_flight {
                scheduled += graph.invalidate(reader);
            }
            scheduled
        };
        tracing::trace!(session = %self.id, signal = name, scheduled, "signal changed");

        self.settle()?;
        Ok(true)
    }

    fn ensure_signal(&self, name: &str) -> NodeId {
        if let Some(id) = self.signals.borrow().lookup(name) {
            return id;
        }

        let id = self.graph.borrow_mut().add_node(NodeKind::Signal, name);
        self.signals
            .borrow_mut()
            .insert(name.to_string(), id, None, self.config.equality);
        id
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
