//! Dependency Registry
//!
//! The registry owns every node and keeps the two halves of each edge in
//! step: `a` is in `b.dependents()` exactly when `b` is in
//! `a.dependencies()`.
//!
//! # Operations
//!
//! - `add_edge`: record that an observer read a dependency.
//! - `clear_dependencies`: drop every edge an observer owns. Observers call
//!   this before they re-run, since each run may read a different set.
//! - `dependents_of`: snapshot the observers of a dependency. Notification
//!   iterates the snapshot, because delivering a change can re-subscribe
//!   and mutate the live set.
//! - `remove`: free a node's slot along with all of its edges.

use slotmap::SlotMap;

use super::node::{Node, NodeId};

/// Arena of nodes plus the bidirectional adjacency between them.
pub struct DependencyGraph {
    /// All nodes in the graph, indexed by ID.
    nodes: SlotMap<NodeId, Node>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
        }
    }

    /// Add a node to the graph.
    pub fn insert(&mut self, node: Node) -> NodeId {
        self.nodes.insert(node)
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node. The node is handed back
    /// so the caller decides where its observer gets dropped.
    pub fn remove(&mut self, node_id: NodeId) -> Option<Node> {
        let mut node = self.nodes.remove(node_id)?;

        // Remove this node from its dependencies' dependent lists
        for dep_id in node.take_dependencies() {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                dep.remove_dependent(node_id);
            }
        }

        // Remove this node from its dependents' dependency lists
        for dependent_id in node.take_dependents() {
            if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                dependent.remove_dependency(node_id);
            }
        }

        Some(node)
    }

    /// Get a reference to a node.
    pub fn get(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    /// Get a mutable reference to a node.
    pub fn get_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(node_id)
    }

    /// Check whether a node is still alive.
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Add a dependency edge: `dependent` depends on `dependency`.
    ///
    /// Self-edges and edges to freed nodes are ignored. Returns `true` if a
    /// new edge was recorded.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) -> bool {
        if dependency == dependent
            || !self.contains(dependency)
            || !self.contains(dependent)
        {
            return false;
        }

        let added = self.nodes[dependency].add_dependent(dependent);
        self.nodes[dependent].add_dependency(dependency);
        added
    }

    /// Remove every edge where `observer` is the dependent.
    ///
    /// Idempotent. Returns the number of edges removed.
    pub fn clear_dependencies(&mut self, observer: NodeId) -> usize {
        let Some(node) = self.nodes.get_mut(observer) else {
            return 0;
        };

        let dependencies = node.take_dependencies();
        for dep_id in &dependencies {
            if let Some(dep) = self.nodes.get_mut(*dep_id) {
                dep.remove_dependent(observer);
            }
        }
        dependencies.len()
    }

    /// Snapshot the observers of a dependency, in subscription order.
    pub fn dependents_of(&self, dependency: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(dependency)
            .map(|node| node.dependents().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_edge(graph: &DependencyGraph, dependency: NodeId, dependent: NodeId) -> bool {
        let forward = graph
            .get(dependency)
            .map(|n| n.dependents().contains(&dependent))
            .unwrap_or(false);
        let reverse = graph
            .get(dependent)
            .map(|n| n.dependencies().contains(&dependency))
            .unwrap_or(false);
        assert_eq!(forward, reverse, "edge halves out of sync");
        forward
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut graph = DependencyGraph::new();

        let id1 = graph.insert(Node::source());
        let id2 = graph.insert(Node::derived());

        assert_eq!(graph.node_count(), 2);

        graph.remove(id1);
        assert_eq!(graph.node_count(), 1);
        assert!(graph.get(id1).is_none());
        assert!(graph.get(id2).is_some());
    }

    #[test]
    fn edges_are_unique() {
        let mut graph = DependencyGraph::new();

        let source_id = graph.insert(Node::source());
        let derived_id = graph.insert(Node::derived());

        assert!(graph.add_edge(source_id, derived_id));
        assert!(!graph.add_edge(source_id, derived_id));
        assert!(has_edge(&graph, source_id, derived_id));
        assert_eq!(graph.dependents_of(source_id), vec![derived_id]);
    }

    #[test]
    fn self_edges_are_ignored() {
        let mut graph = DependencyGraph::new();
        let id = graph.insert(Node::derived());

        assert!(!graph.add_edge(id, id));
        assert!(graph.get(id).unwrap().dependencies().is_empty());
    }

    #[test]
    fn clear_dependencies_removes_both_halves() {
        let mut graph = DependencyGraph::new();

        let a = graph.insert(Node::source());
        let b = graph.insert(Node::source());
        let effect = graph.insert(Node::effect());

        graph.add_edge(a, effect);
        graph.add_edge(b, effect);

        assert_eq!(graph.clear_dependencies(effect), 2);
        assert!(!has_edge(&graph, a, effect));
        assert!(!has_edge(&graph, b, effect));

        // Idempotent
        assert_eq!(graph.clear_dependencies(effect), 0);
    }

    #[test]
    fn edges_to_freed_nodes_are_ignored() {
        let mut graph = DependencyGraph::new();
        let source = graph.insert(Node::source());
        let effect = graph.insert(Node::effect());

        graph.remove(source);
        assert!(!graph.contains(source));
        assert!(!graph.add_edge(source, effect));
        assert!(graph.get(effect).unwrap().dependencies().is_empty());
    }

    #[test]
    fn remove_cleans_up_edges() {
        let mut graph = DependencyGraph::new();

        // Chain: source -> derived -> effect
        let source = graph.insert(Node::source());
        let derived = graph.insert(Node::derived());
        let effect = graph.insert(Node::effect());

        graph.add_edge(source, derived);
        graph.add_edge(derived, effect);

        graph.remove(derived);

        assert!(graph.dependents_of(source).is_empty());
        assert!(graph.get(effect).unwrap().dependencies().is_empty());
    }

    #[test]
    fn stale_ids_do_not_resolve() {
        let mut graph = DependencyGraph::new();

        let old = graph.insert(Node::effect());
        graph.remove(old);
        let new = graph.insert(Node::effect());

        assert_ne!(old, new);
        assert!(!graph.contains(old));

        let source = graph.insert(Node::source());
        assert!(!graph.add_edge(source, old));
        assert!(graph.dependents_of(source).is_empty());
    }

    #[test]
    fn dependents_snapshot_is_ordered() {
        let mut graph = DependencyGraph::new();

        let source = graph.insert(Node::source());
        let first = graph.insert(Node::effect());
        let second = graph.insert(Node::derived());

        graph.add_edge(source, first);
        graph.add_edge(source, second);

        assert_eq!(graph.dependents_of(source), vec![first, second]);
    }
}
