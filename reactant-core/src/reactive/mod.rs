//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, derived values,
//! and effects, all owned by a [`Session`].
//!
//! # Concepts
//!
//! ## Signals
//!
//! A signal is a named cell for an input value. When a signal is read within
//! a tracking context (a derived value or effect), the read is recorded as a
//! dependency. When the signal's value changes, all dependents are
//! invalidated.
//!
//! ## Derived Values
//!
//! A derived value caches the result of a computation. It re-evaluates only
//! when a dependency changed and someone reads it.
//!
//! ## Effects
//!
//! An effect is a side-effecting computation that runs whenever its
//! dependencies change. Output effects feed a named render slot.
//!
//! # Implementation Notes
//!
//! Dependencies are discovered automatically: each session keeps an
//! evaluation stack, and every read registers against the computation on top
//! of it. Dependency sets are rebuilt on every run, so conditional reads
//! come and go with the branches that make them.

mod context;
mod derived;
mod effect;
mod event;
mod guard;
mod session;
mod signal;

pub use derived::{Derived, DerivedFn};
pub use effect::{Effect, ObserverFn, RenderFn};
pub use event::{EventOptions, Trigger};
pub use guard::{is_truthy, req, req_truthy, validate};
pub use session::{Session, SessionId};
