//! Update Scheduler
//!
//! The scheduler owns the node arena, the dependency edges, and the set of
//! effects waiting to run.
//!
//! # Algorithm
//!
//! 1. When a signal changes, walk its dependents.
//! 2. A clean derived node is marked dirty and the walk continues into its
//!    own dependents. A derived node that is already dirty is skipped: it has
//!    not been read since its last invalidation, so its dependents were
//!    already marked then.
//! 3. An effect is marked dirty and added to the pending set.
//! 4. Nothing is recomputed here. Derived values recompute when read; the
//!    session drains the pending set once the external event is applied.
//!
//! The pending set is ordered by [`NodeId`], which is creation order, so
//! effects run in registration order and duplicate marks coalesce.

use std::collections::{BTreeSet, HashSet};

use super::node::{DirtyState, Node, NodeId, NodeKind};

/// The update scheduler manages the dependency graph and coordinates updates.
#[derive(Debug, Default)]
pub struct UpdateScheduler {
    /// All nodes in the graph, indexed by id.
    nodes: Vec<Node>,

    /// Effects scheduled for the next pass.
    pending: BTreeSet<NodeId>,
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the arena.
    pub fn add_node(&mut self, kind: NodeKind, label: impl Into<String>) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(Node::new(kind, label));
        id
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(node_id.index())
    }

    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(node_id.index())
    }

    /// Label of a node, or its id when the node is unknown.
    pub fn label(&self, node_id: NodeId) -> String {
        self.get_node(node_id)
            .map(|node| node.label().to_string())
            .unwrap_or_else(|| node_id.to_string())
    }

    /// Add a dependency edge: `dependent` depends on `dependency`.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(dependency.index()) {
            dep_node.add_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(dependent.index()) {
            dependent_node.add_dependency(dependency);
        }
    }

    /// Replace a consumer's dependencies wholesale.
    ///
    /// Producers read during the previous evaluation but not this one stop
    /// notifying the consumer. Self-edges are never recorded.
    pub fn set_dependencies(&mut self, consumer: NodeId, producers: &[NodeId]) {
        let old = match self.nodes.get_mut(consumer.index()) {
            Some(node) if !node.is_disposed() => node.take_dependencies(),
            _ => return,
        };

        for producer in old {
            if let Some(node) = self.nodes.get_mut(producer.index()) {
                node.remove_dependent(consumer);
            }
        }

        for &producer in producers {
            if producer != consumer {
                self.add_edge(producer, consumer);
            }
        }
    }

    /// Whether `consumer` reads a derived node that is not clean.
    ///
    /// Such a producer was invalidated before the edge to `consumer`
    /// existed, so the invalidation never reached it.
    pub fn has_stale_dependency(&self, consumer: NodeId) -> bool {
        self.get_node(consumer).is_some_and(|node| {
            node.dependencies().iter().any(|&producer| {
                self.get_node(producer)
                    .is_some_and(|p| p.kind() == NodeKind::Derived && !p.is_clean())
            })
        })
    }

    /// Remove a node from the live graph. Its slot stays allocated so ids
    /// remain stable, but it no longer has edges and never runs again.
    pub fn dispose(&mut self, node_id: NodeId) {
        self.set_dependencies(node_id, &[]);

        let dependents = match self.nodes.get_mut(node_id.index()) {
            Some(node) => {
                node.dispose();
                node.take_dependents()
            }
            None => return,
        };

        for dependent in dependents {
            if let Some(node) = self.nodes.get_mut(dependent.index()) {
                node.remove_dependency(node_id);
            }
        }

        self.pending.remove(&node_id);
    }

    /// Mark a changed source's dependents dirty and schedule reachable effects.
    ///
    /// Returns the number of effects newly added to the pending set.
    pub fn mark_changed(&mut self, source_id: NodeId) -> usize {
        let stack: Vec<NodeId> = match self.nodes.get(source_id.index()) {
            Some(source) => source.dependents().iter().copied().collect(),
            None => return 0,
        };
        self.propagate(stack)
    }

    /// Invalidate a consumer that is still being evaluated.
    ///
    /// Unlike [`mark_changed`](Self::mark_changed) the node itself is marked,
    /// even though it was cleaned when its evaluation began.
    pub fn invalidate(&mut self, node_id: NodeId) -> usize {
        self.propagate(vec![node_id])
    }

    fn propagate(&mut self, mut stack: Vec<NodeId>) -> usize {
        let mut scheduled = 0;

        while let Some(node_id) = stack.pop() {
            let Some(node) = self.nodes.get_mut(node_id.index()) else {
                continue;
            };
            if node.is_disposed() {
                continue;
            }

            match node.kind() {
                NodeKind::Effect => {
                    node.mark_dirty();
                    if self.pending.insert(node_id) {
                        scheduled += 1;
                    }
                }
                NodeKind::Derived => {
                    if node.dirty_state() == DirtyState::Dirty {
                        continue;
                    }
                    node.mark_dirty();
                    stack.extend(node.dependents().iter().copied());
                }
                NodeKind::Signal => {}
            }
        }

        scheduled
    }

    /// Add an effect to the pending set. Returns false if already pending.
    pub fn schedule(&mut self, node_id: NodeId) -> bool {
        self.pending.insert(node_id)
    }

    /// Drain the pending set in registration order.
    pub fn take_pending(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop every pending effect without running it.
    ///
    /// Dirty derived nodes upstream of the dropped effects are marked clean
    /// again so the next write propagates through them. Their ids are
    /// returned; their cached results are stale and must be discarded.
    pub fn abandon_pending(&mut self) -> Vec<NodeId> {
        let mut stack: Vec<NodeId> = std::mem::take(&mut self.pending).into_iter().collect();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut rearmed = Vec::new();

        while let Some(node_id) = stack.pop() {
            let Some(node) = self.nodes.get_mut(node_id.index()) else {
                continue;
            };
            if node.kind() == NodeKind::Derived && node.dirty_state() == DirtyState::Dirty {
                node.mark_clean();
                rearmed.push(node_id);
            }
            for &producer in node.dependencies() {
                if visited.insert(producer) {
                    stack.push(producer);
                }
            }
        }

        rearmed
    }

    /// Get the total number of nodes in the arena, disposed ones included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(scheduler: &mut UpdateScheduler, ids: &[NodeId]) {
        for id in ids {
            scheduler.get_node_mut(*id).unwrap().mark_clean();
        }
    }

    #[test]
    fn add_edge_links_both_ends() {
        let mut scheduler = UpdateScheduler::new();
        let source_id = scheduler.add_node(NodeKind::Signal, "n");
        let derived_id = scheduler.add_node(NodeKind::Derived, "double");

        scheduler.add_edge(source_id, derived_id);

        assert!(scheduler
            .get_node(source_id)
            .unwrap()
            .dependents()
            .contains(&derived_id));
        assert_eq!(
            scheduler.get_node(derived_id).unwrap().dependencies(),
            &[source_id]
        );
    }

    #[test]
    fn stale_dependency_is_a_dirty_derived_producer() {
        let mut scheduler = UpdateScheduler::new();
        let source = scheduler.add_node(NodeKind::Signal, "n");
        let derived = scheduler.add_node(NodeKind::Derived, "d");
        let effect = scheduler.add_node(NodeKind::Effect, "e");

        scheduler.set_dependencies(effect, &[source, derived]);
        assert!(scheduler.has_stale_dependency(effect));

        clean(&mut scheduler, &[derived]);
        assert!(!scheduler.has_stale_dependency(effect));
    }

    #[test]
    fn abandoned_effects_can_be_reached_again() {
        let mut scheduler = UpdateScheduler::new();
        let source = scheduler.add_node(NodeKind::Signal, "n");
        let upper = scheduler.add_node(NodeKind::Derived, "upper");
        let lower = scheduler.add_node(NodeKind::Derived, "lower");
        let effect = scheduler.add_node(NodeKind::Effect, "e");

        scheduler.add_edge(source, upper);
        scheduler.add_edge(upper, lower);
        scheduler.add_edge(lower, effect);
        clean(&mut scheduler, &[upper, lower, effect]);
        scheduler.mark_changed(source);

        let mut rearmed = scheduler.abandon_pending();
        rearmed.sort();
        assert_eq!(rearmed, vec![upper, lower]);
        assert!(!scheduler.has_pending());

        assert_eq!(scheduler.mark_changed(source), 1);
        assert_eq!(scheduler.take_pending(), vec![effect]);
    }

    #[test]
    fn set_dependencies_drops_stale_edges() {
        let mut scheduler = UpdateScheduler::new();
        let a = scheduler.add_node(NodeKind::Signal, "a");
        let b = scheduler.add_node(NodeKind::Signal, "b");
        let d = scheduler.add_node(NodeKind::Derived, "d");

        scheduler.set_dependencies(d, &[a, b]);
        scheduler.set_dependencies(d, &[b, d]);

        assert!(scheduler.get_node(a).unwrap().dependents().is_empty());
        assert!(scheduler.get_node(b).unwrap().dependents().contains(&d));
        assert_eq!(scheduler.get_node(d).unwrap().dependencies(), &[b]);
    }

    #[test]
    fn mark_changed_cascades_through_clean_derived() {
        let mut scheduler = UpdateScheduler::new();
        let source = scheduler.add_node(NodeKind::Signal, "state");
        let derived1 = scheduler.add_node(NodeKind::Derived, "cities");
        let derived2 = scheduler.add_node(NodeKind::Derived, "count");
        let effect = scheduler.add_node(NodeKind::Effect, "update_list");

        scheduler.add_edge(source, derived1);
        scheduler.add_edge(derived1, derived2);
        scheduler.add_edge(derived2, effect);
        clean(&mut scheduler, &[derived1, derived2, effect]);

        assert_eq!(scheduler.mark_changed(source), 1);
        assert_eq!(
            scheduler.get_node(derived2).unwrap().dirty_state(),
            DirtyState::Dirty
        );
        assert_eq!(scheduler.take_pending(), vec![effect]);
    }

    #[test]
    fn mark_changed_stops_at_dirty_derived() {
        let mut scheduler = UpdateScheduler::new();
        let source = scheduler.add_node(NodeKind::Signal, "s");
        let derived = scheduler.add_node(NodeKind::Derived, "d");
        let effect = scheduler.add_node(NodeKind::Effect, "e");

        scheduler.add_edge(source, derived);
        scheduler.add_edge(derived, effect);
        clean(&mut scheduler, &[effect]);

        // `derived` was never read, so nothing downstream is scheduled.
        assert_eq!(scheduler.mark_changed(source), 0);
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn invalidate_marks_the_node_itself() {
        let mut scheduler = UpdateScheduler::new();
        let derived = scheduler.add_node(NodeKind::Derived, "d");
        let effect = scheduler.add_node(NodeKind::Effect, "e");

        scheduler.add_edge(derived, effect);
        clean(&mut scheduler, &[derived, effect]);

        assert_eq!(scheduler.invalidate(derived), 1);
        assert_eq!(
            scheduler.get_node(derived).unwrap().dirty_state(),
            DirtyState::Dirty
        );
        assert_eq!(scheduler.take_pending(), vec![effect]);
    }

    #[test]
    fn pending_effects_coalesce_in_registration_order() {
        let mut scheduler = UpdateScheduler::new();
        let a = scheduler.add_node(NodeKind::Signal, "a");
        let b = scheduler.add_node(NodeKind::Signal, "b");
        let first = scheduler.add_node(NodeKind::Effect, "first");
        let second = scheduler.add_node(NodeKind::Effect, "second");

        scheduler.add_edge(a, second);
        scheduler.add_edge(b, second);
        scheduler.add_edge(b, first);

        scheduler.mark_changed(a);
        scheduler.mark_changed(b);

        assert_eq!(scheduler.pending_count(), 2);
        assert_eq!(scheduler.take_pending(), vec![first, second]);
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn disposed_nodes_are_detached() {
        let mut scheduler = UpdateScheduler::new();
        let source = scheduler.add_node(NodeKind::Signal, "s");
        let effect = scheduler.add_node(NodeKind::Effect, "e");

        scheduler.add_edge(source, effect);
        scheduler.schedule(effect);
        scheduler.dispose(effect);

        assert!(scheduler.get_node(effect).unwrap().is_disposed());
        assert!(scheduler.get_node(source).unwrap().dependents().is_empty());
        assert!(!scheduler.has_pending());
        assert_eq!(scheduler.mark_changed(source), 0);
        assert_eq!(scheduler.node_count(), 2);
    }
}
