//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//! Nodes sit in an arena and are addressed by index, so an edge is just a
//! pair of [`NodeId`]s.

use std::fmt;

use indexmap::IndexSet;
use smallvec::SmallVec;

/// Index of a node in a session's graph arena.
///
/// Ids are handed out in creation order, which the scheduler relies on to
/// run pending effects in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// Get the arena index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A signal. Roots of the graph: dependents only.
    Signal,

    /// A derived value. Lazily recomputed, has both dependencies and dependents.
    Derived,

    /// An effect. Leaves of the graph: dependencies only.
    Effect,
}

/// Dirty state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// An effect that has never run.
    Uninitialized,

    /// The node's value (or last run) is up-to-date.
    Clean,

    /// A dependency changed since the last evaluation.
    Dirty,
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    kind: NodeKind,

    /// Human-readable name used in logs and cycle reports.
    label: String,

    state: DirtyState,

    disposed: bool,

    /// Producers this node read during its last evaluation.
    dependencies: SmallVec<[NodeId; 4]>,

    /// Consumers that read this node, in subscription order.
    dependents: IndexSet<NodeId>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            state: match kind {
                NodeKind::Signal => DirtyState::Clean,
                NodeKind::Derived => DirtyState::Dirty,
                NodeKind::Effect => DirtyState::Uninitialized,
            },
            disposed: false,
            dependencies: SmallVec::new(),
            dependents: IndexSet::new(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.state
    }

    pub fn is_clean(&self) -> bool {
        self.state == DirtyState::Clean
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn mark_clean(&mut self) {
        self.state = DirtyState::Clean;
    }

    pub fn mark_dirty(&mut self) {
        self.state = DirtyState::Dirty;
    }

    pub(crate) fn dispose(&mut self) {
        self.disposed = true;
    }

    /// Add a dependency (a node that this node reads from).
    pub fn add_dependency(&mut self, node_id: NodeId) {
        if !self.dependencies.contains(&node_id) {
            self.dependencies.push(node_id);
        }
    }

    pub fn remove_dependency(&mut self, node_id: NodeId) {
        self.dependencies.retain(|id| *id != node_id);
    }

    pub fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }

    /// Add a dependent (a node that reads from this node).
    pub fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    pub fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.shift_remove(&node_id);
    }

    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }

    /// Detach and return the dependency list, leaving it empty.
    pub(crate) fn take_dependencies(&mut self) -> SmallVec<[NodeId; 4]> {
        std::mem::take(&mut self.dependencies)
    }

    pub(crate) fn take_dependents(&mut self) -> IndexSet<NodeId> {
        std::mem::take(&mut self.dependents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_states_follow_kind() {
        assert!(Node::new(NodeKind::Signal, "s").is_clean());
        assert_eq!(Node::new(NodeKind::Derived, "d").dirty_state(), DirtyState::Dirty);
        assert_eq!(
            Node::new(NodeKind::Effect, "e").dirty_state(),
            DirtyState::Uninitialized
        );
    }

    #[test]
    fn dependency_management() {
        let mut node = Node::new(NodeKind::Derived, "total");
        let dep1 = NodeId::from_index(1);
        let dep2 = NodeId::from_index(2);

        node.add_dependency(dep1);
        node.add_dependency(dep2);
        node.add_dependency(dep1);

        assert_eq!(node.dependencies(), &[dep1, dep2]);

        node.remove_dependency(dep1);
        assert_eq!(node.dependencies(), &[dep2]);

        let taken = node.take_dependencies();
        assert_eq!(taken.as_slice(), &[dep2]);
        assert!(node.dependencies().is_empty());
    }

    #[test]
    fn dirty_state_transitions() {
        let mut node = Node::new(NodeKind::Derived, "d");

        node.mark_clean();
        assert_eq!(node.dirty_state(), DirtyState::Clean);

        node.mark_dirty();
        assert_eq!(node.dirty_state(), DirtyState::Dirty);
    }
}
