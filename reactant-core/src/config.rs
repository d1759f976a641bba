//! Session Configuration
//!
//! Knobs that shape how a session decides a write is a real change and how
//! hard the scheduler tries to settle the graph. Every field has a default,
//! so a partial JSON document is a valid configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default upper bound on scheduler passes per external event.
pub const DEFAULT_MAX_FLUSH_PASSES: usize = 100;

/// How a signal decides whether a write changes its value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EqualityPolicy {
    /// Structural equality of the stored value. Writing an equal value is a no-op.
    #[default]
    Deep,

    /// Every write counts as a change, even when the value is identical.
    Never,
}

impl EqualityPolicy {
    /// Returns true when writing `new` over `old` leaves the signal unchanged.
    pub fn unchanged(self, old: Option<&Value>, new: &Value) -> bool {
        match self {
            EqualityPolicy::Deep => old == Some(new),
            EqualityPolicy::Never => false,
        }
    }
}

/// Per-session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Equality policy applied to signals that do not override it.
    pub equality: EqualityPolicy,

    /// Scheduler passes allowed per external event before giving up.
    pub max_flush_passes: usize,

    /// Clear an output slot when its render body fails.
    pub clear_on_error: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            equality: EqualityPolicy::Deep,
            max_flush_passes: DEFAULT_MAX_FLUSH_PASSES,
            clear_on_error: true,
        }
    }
}

impl SessionConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }
}
