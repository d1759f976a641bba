//! Guarded Reads
//!
//! Helpers that stop a computation early when a value it needs is not
//! there yet. The halt travels as [`ReactiveError::MissingValue`] through
//! `?`, so reads made before the halt stay recorded and the computation
//! re-runs as soon as one of them changes.

use serde_json::Value;

use crate::error::{ReactiveError, Result};

use super::session::Session;

/// Pass `value` through, or halt if it is `null`.
pub fn req(value: Value) -> Result<Value> {
    if value.is_null() {
        Err(ReactiveError::MissingValue)
    } else {
        Ok(value)
    }
}

/// Pass `value` through, or halt if it is not truthy.
pub fn req_truthy(value: Value) -> Result<Value> {
    if is_truthy(&value) {
        Ok(value)
    } else {
        Err(ReactiveError::MissingValue)
    }
}

/// `null`, `false`, the empty string, and the empty array are not truthy.
/// Numbers (zero included) and objects are.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Number(_) | Value::Object(_) => true,
    }
}

/// Halt with a message for the end user unless `condition` holds.
pub fn validate(condition: bool, message: impl Into<String>) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(ReactiveError::Validation {
            message: message.into(),
        })
    }
}

impl Session {
    /// Read a signal, halting the current computation if it is unset or `null`.
    pub fn req(&self, name: &str) -> Result<Value> {
        req(self.get(name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!(0)));
        assert!(is_truthy(&json!({})));
        assert!(is_truthy(&json!(["a"])));
    }

    #[test]
    fn req_halts_on_null_only() {
        assert_eq!(req(json!(null)), Err(ReactiveError::MissingValue));
        assert_eq!(req(json!("")), Ok(json!("")));
        assert_eq!(req_truthy(json!("")), Err(ReactiveError::MissingValue));
    }

    #[test]
    fn validate_carries_message() {
        assert_eq!(validate(true, "unused"), Ok(()));
        assert_eq!(
            validate(false, "select a dataset"),
            Err(ReactiveError::Validation {
                message: "select a dataset".into()
            })
        );
    }

    #[test]
    fn session_req_keeps_partial_dependencies() {
        let session = Session::headless();
        session.signal("dataset", json!("iris")).unwrap();

        let summary = session.derived("summary", |s| {
            let dataset = s.req("dataset")?;
            let column = s.req("column")?;
            Ok(json!(format!("{}:{}", dataset.as_str().unwrap_or(""), column.as_str().unwrap_or(""))))
        });

        assert_eq!(session.isolate(|s| summary.get(s)), Err(ReactiveError::MissingValue));

        session.set("column", json!("petal")).unwrap();
        assert_eq!(session.isolate(|s| summary.get(s)).unwrap(), json!("iris:petal"));
    }
}
