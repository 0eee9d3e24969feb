//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;
use slotmap::new_key_type;

new_key_type! {
    /// Unique identifier for a node in the dependency graph.
    ///
    /// The key carries a generation, so an id that outlives its node never
    /// resolves to whatever node later reuses the slot.
    pub struct NodeId;
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A source node (signal). Only ever read from.
    Source,

    /// A derived node (computed). Observes its inputs and is itself read.
    ///
    /// Derived observers are always notified inline, even while a batch is
    /// open, so cached values are invalidated before any effect runs.
    Derived,

    /// An effect node (reaction or once). Observes, but is never read.
    Effect,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Source => "signal",
            NodeKind::Derived => "computed",
            NodeKind::Effect => "subscription",
        })
    }
}

/// Something that wants to hear about a change in one of its dependencies.
pub trait Observer: Send + Sync {
    /// Called once per delivered change.
    fn notify(self: Arc<Self>);
}

/// A node in the dependency graph.
pub struct Node {
    /// What kind of node this is.
    kind: NodeKind,

    /// Optional name, used only to build error sources.
    label: Option<Arc<str>>,

    /// Callback invoked when a dependency of this node changes.
    observer: Option<Arc<dyn Observer>>,

    /// Nodes that this node reads from.
    dependencies: IndexSet<NodeId>,

    /// Nodes that read from this node.
    dependents: IndexSet<NodeId>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            label: None,
            observer: None,
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
        }
    }

    /// Create a new source (signal) node.
    pub fn source() -> Self {
        Self::new(NodeKind::Source)
    }

    /// Create a new derived (computed) node.
    pub fn derived() -> Self {
        Self::new(NodeKind::Derived)
    }

    /// Create a new effect node.
    pub fn effect() -> Self {
        Self::new(NodeKind::Effect)
    }

    /// Attach a label.
    pub fn with_label(mut self, label: Option<Arc<str>>) -> Self {
        self.label = label;
        self
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn label(&self) -> Option<&Arc<str>> {
        self.label.as_ref()
    }

    pub fn set_label(&mut self, label: Arc<str>) {
        self.label = Some(label);
    }

    /// Get the observer callback, if one is attached.
    pub fn observer(&self) -> Option<&Arc<dyn Observer>> {
        self.observer.as_ref()
    }

    /// Attach the observer callback. Source nodes never get one.
    pub fn set_observer(&mut self, observer: Arc<dyn Observer>) {
        debug_assert_ne!(self.kind, NodeKind::Source, "signals do not observe");
        self.observer = Some(observer);
    }

    /// Add a dependency (a node that this node reads from).
    ///
    /// Returns `true` if the edge is new.
    pub fn add_dependency(&mut self, node_id: NodeId) -> bool {
        self.dependencies.insert(node_id)
    }

    /// Remove a dependency.
    pub fn remove_dependency(&mut self, node_id: NodeId) {
        self.dependencies.shift_remove(&node_id);
    }

    /// Get all dependencies.
    pub fn dependencies(&self) -> &IndexSet<NodeId> {
        &self.dependencies
    }

    /// Add a dependent (a node that reads from this node).
    pub fn add_dependent(&mut self, node_id: NodeId) -> bool {
        self.dependents.insert(node_id)
    }

    /// Remove a dependent.
    pub fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.shift_remove(&node_id);
    }

    /// Get all dependents.
    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }

    /// Take all dependencies, leaving the set empty.
    pub fn take_dependencies(&mut self) -> IndexSet<NodeId> {
        std::mem::take(&mut self.dependencies)
    }

    /// Take all dependents, leaving the set empty.
    pub fn take_dependents(&mut self) -> IndexSet<NodeId> {
        std::mem::take(&mut self.dependents)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("has_observer", &self.observer.is_some())
            .field("dependencies", &self.dependencies.len())
            .field("dependents", &self.dependents.len())
            .finish()
    }
}
