//! Error Types
//!
//! Every fallible operation in the reactive core returns [`ReactiveError`].
//! The enum doubles as the control-flow channel for guarded reads: a body
//! that hits [`ReactiveError::MissingValue`] simply returns it through `?`
//! and the engine treats the halt as a silent no-op for that pass.
//!
//! Errors are `Clone` because derived values cache their last result,
//! including failures, and hand the same error to every reader.

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Errors raised by the reactive engine or by user computation bodies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A signal or derived value was read outside of any evaluation frame.
    #[error("`{name}` was read outside of a reactive evaluation; read it from a derived value, an effect, or `isolate`")]
    OutOfContextAccess { name: String },

    /// A consumer depends on itself, directly or through other derived values.
    #[error("cyclic dependency detected: {}", .path.join(" -> "))]
    CyclicDependency { path: Vec<String> },

    /// A guarded read found no value. Halts the current evaluation silently.
    #[error("a required value is missing")]
    MissingValue,

    /// A guarded read failed with a message meant for the end user.
    #[error("{message}")]
    Validation { message: String },

    /// A computation body failed.
    #[error("{0}")]
    Failed(String),

    /// Effects kept invalidating each other and the flush never settled.
    #[error("reactive graph did not settle after {passes} flush passes")]
    FlushLimitExceeded { passes: usize },

    /// A handle created by one session was passed to another.
    #[error("handle {handle} belongs to a different session")]
    ForeignHandle { handle: String },
}

impl ReactiveError {
    /// Build a [`ReactiveError::Failed`] from any displayable value.
    pub fn failed(message: impl fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }

    /// Whether this error is a guarded-read halt rather than a failure.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::MissingValue)
    }
}

impl From<serde_json::Error> for ReactiveError {
    fn from(err: serde_json::Error) -> Self {
        Self::failed(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_path() {
        let err = ReactiveError::CyclicDependency {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency detected: a -> b -> a");
    }

    #[test]
    fn only_missing_value_is_silent() {
        assert!(ReactiveError::MissingValue.is_silent());
        assert!(!ReactiveError::failed("boom").is_silent());
        assert!(!ReactiveError::Validation { message: "pick a state".into() }.is_silent());
    }
}
