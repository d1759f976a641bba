//! Event-Gated Computations
//!
//! Sometimes a computation should run only when one particular input fires,
//! such as a "go" button, while still reading other state freely. Gated
//! computations track exactly one trigger and run their handler isolated,
//! so no other read can invalidate them.

use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ReactiveError, Result};

use super::derived::Derived;
use super::effect::Effect;
use super::session::Session;

/// What a gated computation listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A signal, by name.
    Input(String),
    /// A derived value.
    Derived(Derived),
}

impl Trigger {
    fn read(&self, session: &Session) -> Result<Value> {
        match self {
            Trigger::Input(name) => session.get(name),
            Trigger::Derived(derived) => derived.get(session),
        }
    }
}

impl From<&str> for Trigger {
    fn from(name: &str) -> Self {
        Trigger::Input(name.to_string())
    }
}

impl From<String> for Trigger {
    fn from(name: String) -> Self {
        Trigger::Input(name)
    }
}

impl From<Derived> for Trigger {
    fn from(derived: Derived) -> Self {
        Trigger::Derived(derived)
    }
}

/// Firing rules for gated computations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventOptions {
    /// Do not fire while the trigger is `null`.
    pub ignore_null: bool,
    /// Do not fire on the first evaluation.
    pub ignore_init: bool,
}

impl Default for EventOptions {
    fn default() -> Self {
        Self {
            ignore_null: true,
            ignore_init: false,
        }
    }
}

/// Tracks whether a gated computation should fire for a given trigger value.
struct Gate {
    options: EventOptions,
    initialized: Cell<bool>,
}

impl Gate {
    fn new(options: EventOptions) -> Self {
        Self {
            options,
            initialized: Cell::new(false),
        }
    }

    fn fires(&self, trigger: &Value) -> bool {
        let first = !self.initialized.replace(true);
        if first && self.options.ignore_init {
            return false;
        }
        !(self.options.ignore_null && trigger.is_null())
    }
}

impl Session {
    /// Register an effect that runs `handler` only when `trigger` changes.
    pub fn observe_event<F>(
        &self,
        label: impl Into<String>,
        trigger: impl Into<Trigger>,
        options: EventOptions,
        handler: F,
    ) -> Result<Effect>
    where
        F: Fn(&Session, &Value) -> Result<()> + 'static,
    {
        let trigger = trigger.into();
        let gate = Gate::new(options);

        self.observe(label, move |session| {
            let value = trigger.read(session)?;
            if !gate.fires(&value) {
                return Ok(());
            }
            session.isolate(|session| handler(session, &value))
        })
    }

    /// Create a derived value recomputed only when `trigger` changes.
    ///
    /// Until the trigger first fires, reads halt with
    /// [`ReactiveError::MissingValue`].
    pub fn event_derived<F>(
        &self,
        label: impl Into<String>,
        trigger: impl Into<Trigger>,
        options: EventOptions,
        handler: F,
    ) -> Derived
    where
        F: Fn(&Session, &Value) -> Result<Value> + 'static,
    {
        let trigger = trigger.into();
        let gate = Gate::new(options);

        self.derived_from_fn(
            label.into(),
            Rc::new(move |session: &Session| -> Result<Value> {
                let value = trigger.read(session)?;
                if !gate.fires(&value) {
                    return Err(ReactiveError::MissingValue);
                }
                session.isolate(|session| handler(session, &value))
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    #[test]
    fn handler_reads_are_not_tracked() {
        let session = Session::headless();
        session.signal("bins", json!(10)).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();

        session
            .observe_event("draw", "go", EventOptions::default(), move |s, _| {
                log.borrow_mut().push(s.get("bins")?);
                Ok(())
            })
            .unwrap();

        // `go` is unset (null), so nothing fired yet.
        assert!(seen.borrow().is_empty());

        session.set("bins", json!(20)).unwrap();
        assert!(seen.borrow().is_empty());

        session.set("go", json!(1)).unwrap();
        session.set("bins", json!(30)).unwrap();
        assert_eq!(*seen.borrow(), vec![json!(20)]);

        session.set("go", json!(2)).unwrap();
        assert_eq!(*seen.borrow(), vec![json!(20), json!(30)]);
    }

    #[test]
    fn ignore_init_skips_first_run() {
        let session = Session::headless();
        session.signal("go", json!(0)).unwrap();
        let fired = Rc::new(Cell::new(0));
        let count = fired.clone();

        let options = EventOptions {
            ignore_init: true,
            ..EventOptions::default()
        };
        session
            .observe_event("on_go", "go", options, move |_, _| {
                count.set(count.get() + 1);
                Ok(())
            })
            .unwrap();

        assert_eq!(fired.get(), 0);
        session.set("go", json!(1)).unwrap();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn gated_derivation_waits_for_trigger() {
        let session = Session::headless();
        session.signal("n", json!(3)).unwrap();

        let snapshot = session.event_derived("snapshot", "refresh", EventOptions::default(), |s, _| {
            let n = s.get("n")?.as_i64().unwrap_or(0);
            Ok(json!(n * n))
        });

        assert_eq!(session.isolate(|s| snapshot.get(s)), Err(ReactiveError::MissingValue));

        session.set("refresh", json!(true)).unwrap();
        assert_eq!(session.isolate(|s| snapshot.get(s)).unwrap(), json!(9));

        session.set("n", json!(4)).unwrap();
        assert_eq!(session.isolate(|s| snapshot.get(s)).unwrap(), json!(9));
        assert_eq!(snapshot.run_count(&session), 2);

        session.set("refresh", json!(false)).unwrap();
        assert_eq!(session.isolate(|s| snapshot.get(s)).unwrap(), json!(16));
    }

    #[test]
    fn derived_values_can_trigger() {
        let session = Session::headless();
        session.signal("clicks", json!(0)).unwrap();
        let parity = session.derived("parity", |s| {
            let clicks = s.get("clicks")?.as_i64().unwrap_or(0);
            Ok(json!(clicks % 2 == 0))
        });
        let fired = Rc::new(Cell::new(0));
        let count = fired.clone();

        session
            .observe_event("on_parity", parity, EventOptions::default(), move |_, _| {
                count.set(count.get() + 1);
                Ok(())
            })
            .unwrap();

        session.set("clicks", json!(1)).unwrap();
        assert_eq!(fired.get(), 2);
    }
}
