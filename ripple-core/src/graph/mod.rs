//! Dependency Graph
//!
//! This module implements the registry of edges between observers and the
//! dependencies they read.
//!
//! # Overview
//!
//! Every signal, computed value and subscription owns one node in a
//! generational arena. Edges are directed from a dependency to the
//! observers that read it:
//!
//! - A signal node only ever acts as a dependency.
//! - A computed node acts as both: it observes its inputs and is observed by
//!   its readers.
//! - Reaction and once nodes only observe.
//!
//! # Design Decisions
//!
//! 1. Nodes live in a `SlotMap`, so a `NodeId` carries a generation. A freed
//!    slot never aliases a handle that still refers to the old node.
//!
//! 2. Both directions of every edge are stored (dependencies and
//!    dependents), and they are always updated together.
//!
//! 3. Edge sets are `IndexSet`s. Membership is unique, and iteration follows
//!    subscription order, which keeps notification order deterministic.

mod node;
mod registry;

pub use node::{Node, NodeId, NodeKind, Observer};
pub use registry::DependencyGraph;
