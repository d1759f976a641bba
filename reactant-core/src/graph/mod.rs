//! Dependency Graph
//!
//! This module implements the dependency graph that tracks relationships
//! between signals, derived values, and effects inside one session.
//!
//! # Overview
//!
//! - Nodes represent signals, derived values, or effects
//! - Edges represent dependencies: if A reads B, there is an edge from B to A
//!
//! When a signal changes, we traverse the graph to find all affected nodes
//! and mark them as dirty. Derived values recompute on their next read;
//! effects are queued and run once the external event has been applied.
//!
//! # Design Decisions
//!
//! 1. Nodes live in an arena indexed by [`NodeId`]. Edges are index pairs,
//!    so the graph can contain cycles without any ownership cycles.
//!
//! 2. Edges are rebuilt wholesale after every evaluation, which is how
//!    conditional reads stop being tracked once a branch is no longer taken.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents) edges
//!    to enable efficient traversal in both directions.

mod node;
mod scheduler;

pub use node::{DirtyState, Node, NodeId, NodeKind};
pub use scheduler::UpdateScheduler;
