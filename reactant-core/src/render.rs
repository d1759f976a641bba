//! Render Targets
//!
//! The reactive core never draws anything. Output effects hand their
//! payloads to a [`RenderTarget`], the collaborator that owns the actual
//! plots, tables, and text on the client side.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ReactiveError;

/// What kind of widget an output slot feeds. Opaque to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderKind {
    Text,
    Table,
    Plot,
    Image,
    Ui,
}

/// Receives the results of output effects.
pub trait RenderTarget {
    /// Replace the contents of output `name`.
    fn write(&self, name: &str, kind: RenderKind, payload: &Value);

    /// Blank output `name`.
    fn clear(&self, name: &str);

    /// An effect bound to `name` failed.
    fn report_error(&self, name: &str, error: &ReactiveError) {
        tracing::warn!(output = name, %error, "unhandled reactive error");
    }
}

/// A target that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTarget;

impl RenderTarget for NullTarget {
    fn write(&self, _name: &str, _kind: RenderKind, _payload: &Value) {}

    fn clear(&self, _name: &str) {}

    fn report_error(&self, _name: &str, _error: &ReactiveError) {}
}

/// One call received by a [`MemoryTarget`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RenderCommand {
    Write {
        name: String,
        kind: RenderKind,
        payload: Value,
    },
    Clear {
        name: String,
    },
    Error {
        name: String,
        message: String,
    },
}

/// A target that records every call, for tests and headless embedding.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    commands: Mutex<Vec<RenderCommand>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    pub fn commands(&self) -> Vec<RenderCommand> {
        self.commands.lock().clone()
    }

    /// Drain the recorded commands.
    pub fn take(&self) -> Vec<RenderCommand> {
        std::mem::take(&mut *self.commands.lock())
    }

    /// The most recent payload written to `name`, unless cleared since.
    pub fn last_payload(&self, name: &str) -> Option<Value> {
        self.commands
            .lock()
            .iter()
            .rev()
            .find_map(|command| match command {
                RenderCommand::Write { name: slot, payload, .. } if slot == name => Some(Some(payload.clone())),
                RenderCommand::Clear { name: slot } if slot == name => Some(None),
                _ => None,
            })
            .flatten()
    }

    /// Number of writes made to `name`.
    pub fn writes_to(&self, name: &str) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|command| matches!(command, RenderCommand::Write { name: slot, .. } if slot == name))
            .count()
    }
}

impl RenderTarget for MemoryTarget {
    fn write(&self, name: &str, kind: RenderKind, payload: &Value) {
        self.commands.lock().push(RenderCommand::Write {
            name: name.to_string(),
            kind,
            payload: payload.clone(),
        });
    }

    fn clear(&self, name: &str) {
        self.commands.lock().push(RenderCommand::Clear { name: name.to_string() });
    }

    fn report_error(&self, name: &str, error: &ReactiveError) {
        self.commands.lock().push(RenderCommand::Error {
            name: name.to_string(),
            message: error.to_string(),
        });
    }
}
