//! Reactant Core
//!
//! This crate provides the core runtime for Reactant, a reactive session
//! engine for interactive data applications. It implements:
//!
//! - Reactive primitives (signals, derived values, effects)
//! - Automatic dependency tracking with dynamic dependency sets
//! - Coalesced, ordered effect scheduling per external event
//! - Render targets and a client protocol for output delivery
//! - A host that runs one isolated session per client
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Sessions and the reactive primitives they own
//! - `graph`: The dependency graph arena and update scheduler
//! - `render`: The collaborator interface for output slots
//! - `protocol`: Client and server messages
//! - `host`: Worker-per-session hosting over channels
//!
//! # Example
//!
//! ```rust,ignore
//! use reactant_core::{RenderKind, Session};
//! use serde_json::json;
//!
//! let session = Session::headless();
//!
//! // Create a signal
//! session.signal("state", json!("CA"))?;
//!
//! // Create a derived value
//! let cities = session.derived("cities", |s| Ok(cities_for(&s.get("state")?)));
//!
//! // Create an output effect
//! session.output("city_list", RenderKind::Ui, move |s| cities.get(s))?;
//!
//! // Update the signal
//! session.set("state", json!("NY"))?;
//! // `cities` recomputes once, `city_list` re-renders once
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod host;
pub mod protocol;
pub mod reactive;
pub mod render;

pub use config::{EqualityPolicy, SessionConfig};
pub use error::{ReactiveError, Result};
pub use host::{App, Connection, HostError, SessionHost};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use reactive::{req, req_truthy, validate, Derived, Effect, EventOptions, Session, SessionId, Trigger};
pub use render::{MemoryTarget, NullTarget, RenderCommand, RenderKind, RenderTarget};
