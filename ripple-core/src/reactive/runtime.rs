//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computed
//! values and subscriptions. It owns the dependency graph, the observer
//! stack, the pending-effect queue and the flags that scope them.
//!
//! # How It Works
//!
//! 1. Every primitive is created from a `Runtime` and registers a node in
//!    its graph.
//!
//! 2. When an observer (computed, reaction, once) runs, it is pushed onto
//!    the observer stack. Reads record an edge from the value read to the
//!    observer on top of the stack.
//!
//! 3. When a value changes, the runtime notifies a snapshot of its
//!    observers:
//!    a. The observer currently on top of the stack is skipped
//!    b. Computed observers are invalidated inline
//!    c. Reactions are queued while a batch is open, run inline otherwise
//!    d. Computed values are lazy - they recompute on next access
//!
//! # Thread Safety
//!
//! A `Runtime` is a cheap handle (`Arc`) and is `Send + Sync`. Every public
//! entry point takes the runtime's re-entrant turn lock, so work from
//! different threads is serialized while the same thread can nest freely.
//! The inner state lock is only ever held for bookkeeping, never across user
//! code.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use slotmap::Key;
use smallvec::SmallVec;

use crate::config::RuntimeConfig;
use crate::error::BoxError;
use crate::graph::{DependencyGraph, Node, NodeId};

use super::computed::Computed;
use super::context::ReactiveContext;
use super::once::OnceBuilder;
use super::reaction::ReactionBuilder;
use super::signal::Signal;
use super::subscriber::Disposer;

/// Mutable scheduler state. Only touched through `Runtime::with_state`.
pub(crate) struct State {
    /// Every node and edge.
    pub(crate) graph: DependencyGraph,

    /// Observers currently evaluating. Only the top records reads.
    pub(crate) stack: SmallVec<[NodeId; 8]>,

    /// Effects waiting for the outermost batch to drain. `None` when no
    /// batch is open.
    pub(crate) pending: Option<IndexSet<NodeId>>,

    /// Reads are not recorded while set (inside an action).
    pub(crate) untracked: bool,

    /// Signal writes fail while set (inside a computed evaluation).
    pub(crate) writes_forbidden: bool,

    /// The queued effect being run, used to label batch errors.
    pub(crate) current_effect: Option<NodeId>,

    /// Per-reaction firing counts for the current outermost batch.
    pub(crate) reentry: HashMap<NodeId, u32>,
}

impl State {
    fn new() -> Self {
        Self {
            graph: DependencyGraph::new(),
            stack: SmallVec::new(),
            pending: None,
            untracked: false,
            writes_forbidden: false,
            current_effect: None,
            reentry: HashMap::new(),
        }
    }
}

struct RuntimeInner {
    config: RuntimeConfig,
    turn: ReentrantMutex<()>,
    state: Mutex<State>,
}

/// An independent reactive graph.
///
/// Cloning a `Runtime` yields another handle to the same graph. Primitives
/// from different runtimes never observe each other.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let count = rt.signal(1);
/// let doubled = rt.computed({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// let _disposer = rt
///     .reaction(move || Ok(doubled.get()?))
///     .effect(|doubled, _| {
///         println!("doubled: {doubled}");
///         Ok(())
///     })
///     .start();
///
/// count.set(5)?; // prints "doubled: 10"
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                turn: ReentrantMutex::new(()),
                state: Mutex::new(State::new()),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Whether both handles refer to the same graph.
    pub fn ptr_eq(a: &Runtime, b: &Runtime) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    // ------------------------------------------------------------------
    // Primitive constructors
    // ------------------------------------------------------------------

    /// Create a signal holding `value`.
    pub fn signal<T>(&self, value: T) -> Signal<T>
    where
        T: Send + Sync + 'static,
    {
        Signal::new(self, value)
    }

    /// Create a computed value from an infallible function.
    pub fn computed<T, F>(&self, compute: F) -> Computed<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Computed::new(self, move |_| Ok(compute()))
    }

    /// Create a computed value from a fallible function.
    ///
    /// The function receives the previously cached value, if any.
    pub fn try_computed<T, F>(&self, compute: F) -> Computed<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(Option<&T>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Computed::new(self, compute)
    }

    /// Start building a reaction around `action`.
    pub fn reaction<V, F>(&self, action: F) -> ReactionBuilder<V>
    where
        V: Send + Sync + 'static,
        F: Fn() -> Result<V, BoxError> + Send + Sync + 'static,
    {
        ReactionBuilder::new(self, action)
    }

    /// Start building a one-shot subscription.
    pub fn once<A, E>(&self, action: A, effect: E) -> OnceBuilder
    where
        A: FnOnce(&Disposer) -> Result<(), BoxError> + Send + 'static,
        E: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        OnceBuilder::new(self, action, effect)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Whether a read right now would be recorded as a dependency.
    pub fn is_tracking(&self) -> bool {
        self.with_state(|state| !state.untracked && !state.stack.is_empty())
    }

    /// Whether a batch is currently open.
    pub fn in_batch(&self) -> bool {
        self.with_state(|state| state.pending.is_some())
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.with_state(|state| state.graph.node_count())
    }

    /// Number of values `observer` currently depends on.
    pub fn dependency_count(&self, observer: NodeId) -> usize {
        self.with_state(|state| {
            state
                .graph
                .get(observer)
                .map(|node| node.dependencies().len())
                .unwrap_or(0)
        })
    }

    /// Number of observers currently depending on `dependency`.
    pub fn observer_count(&self, dependency: NodeId) -> usize {
        self.with_state(|state| {
            state
                .graph
                .get(dependency)
                .map(|node| node.dependents().len())
                .unwrap_or(0)
        })
    }

    /// The label used for `id` in error sources.
    ///
    /// Unlabeled nodes get `<prefix>:<kind>#<slot>`.
    pub fn label_of(&self, id: NodeId) -> String {
        self.with_state(|state| match state.graph.get(id) {
            Some(node) => match node.label() {
                Some(label) => label.to_string(),
                None => format!(
                    "{}:{}#{:?}",
                    self.inner.config.label_prefix,
                    node.kind(),
                    id.data()
                ),
            },
            None => format!("{}:disposed#{:?}", self.inner.config.label_prefix, id.data()),
        })
    }

    /// Run `f` without recording any reads.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _turn = self.turn();
        let _ctx = ReactiveContext::untracked(self);
        f()
    }

    // ------------------------------------------------------------------
    // Crate-internal plumbing
    // ------------------------------------------------------------------

    pub(crate) fn turn(&self) -> ReentrantMutexGuard<'_, ()> {
        self.inner.turn.lock()
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.inner.state.lock())
    }

    pub(crate) fn insert_node(&self, node: Node) -> NodeId {
        self.with_state(|state| state.graph.insert(node))
    }

    pub(crate) fn set_label(&self, id: NodeId, label: Arc<str>) {
        self.with_state(|state| {
            if let Some(node) = state.graph.get_mut(id) {
                node.set_label(label);
            }
        });
    }

    pub(crate) fn attach_observer(&self, id: NodeId, observer: Arc<dyn crate::graph::Observer>) {
        self.with_state(|state| {
            if let Some(node) = state.graph.get_mut(id) {
                node.set_observer(observer);
            }
        });
    }

    /// Free a node's slot and all of its edges.
    ///
    /// The removed node (and the observer it holds) is dropped after the
    /// state lock is released, since dropping captured handles may call back
    /// into the runtime.
    pub(crate) fn remove_node(&self, id: NodeId) {
        let _turn = self.turn();
        let removed = self.with_state(|state| {
            if let Some(pending) = state.pending.as_mut() {
                pending.shift_remove(&id);
            }
            state.reentry.remove(&id);
            state.graph.remove(id)
        });
        drop(removed);
    }

    /// Record a read of `dependency` by the observer on top of the stack.
    pub(crate) fn register(&self, dependency: NodeId) {
        self.with_state(|state| {
            if state.untracked {
                return;
            }
            if let Some(&observer) = state.stack.last() {
                state.graph.add_edge(dependency, observer);
            }
        });
    }

    /// Drop every edge `observer` owns.
    pub(crate) fn clear(&self, observer: NodeId) {
        self.with_state(|state| {
            state.graph.clear_dependencies(observer);
        });
    }

    /// Whether `id` is somewhere on the observer stack.
    pub(crate) fn is_evaluating(&self, id: NodeId) -> bool {
        self.with_state(|state| state.stack.contains(&id))
    }

    pub(crate) fn writes_forbidden(&self) -> bool {
        self.with_state(|state| state.writes_forbidden)
    }

    /// Count one more firing of `id` in the current outermost batch.
    pub(crate) fn bump_reentry(&self, id: NodeId) -> u32 {
        self.with_state(|state| {
            let count = state.reentry.entry(id).or_insert(0);
            *count += 1;
            *count
        })
    }

    /// Deliver a change of `dependency` to its observers.
    pub(crate) fn notify(&self, dependency: NodeId) {
        let (observers, top) = self.with_state(|state| {
            (
                state.graph.dependents_of(dependency),
                state.stack.last().copied(),
            )
        });

        for id in observers {
            // An observer never re-triggers itself mid-evaluation
            if Some(id) == top {
                continue;
            }

            let run_inline = self.with_state(|state| {
                let kind = state.graph.get(id)?.kind();
                match state.pending.as_mut() {
                    Some(pending) if kind != crate::graph::NodeKind::Derived => {
                        pending.insert(id);
                        Some(false)
                    }
                    _ => Some(true),
                }
            });

            if run_inline == Some(true) {
                self.run_observer(id);
            }
        }
    }

    /// Invoke the observer attached to `id`, if the node is still alive.
    pub(crate) fn run_observer(&self, id: NodeId) {
        let observer = self.with_state(|state| {
            state
                .graph
                .get(id)
                .and_then(|node| node.observer().cloned())
        });

        if let Some(observer) = observer {
            let _ctx = ReactiveContext::running(self, id);
            observer.notify();
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (nodes, in_batch) =
            self.with_state(|state| (state.graph.node_count(), state.pending.is_some()));
        f.debug_struct("Runtime")
            .field("nodes", &nodes)
            .field("in_batch", &in_batch)
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Observer;
    use std::sync::atomic::{AtomicI32, Ordering};

    struct MockObserver {
        calls: AtomicI32,
    }

    impl MockObserver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicI32::new(0),
            })
        }

        fn calls(&self) -> i32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Observer for MockObserver {
        fn notify(self: Arc<Self>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn observer_node(rt: &Runtime, node: Node) -> (NodeId, Arc<MockObserver>) {
        let id = rt.insert_node(node);
        let observer = MockObserver::new();
        rt.attach_observer(id, observer.clone());
        (id, observer)
    }

    fn read_as(rt: &Runtime, observer: NodeId, dependency: NodeId) {
        let _ctx = ReactiveContext::enter(rt, observer);
        rt.register(dependency);
    }

    #[test]
    fn register_records_edge_for_top_of_stack() {
        let rt = Runtime::new();
        let source = rt.insert_node(Node::source());
        let (effect, _) = observer_node(&rt, Node::effect());

        // No observer on the stack: no edge
        rt.register(source);
        assert_eq!(rt.observer_count(source), 0);

        read_as(&rt, effect, source);
        assert_eq!(rt.observer_count(source), 1);
        assert_eq!(rt.dependency_count(effect), 1);
    }

    #[test]
    fn register_is_a_no_op_when_untracked() {
        let rt = Runtime::new();
        let source = rt.insert_node(Node::source());
        let (effect, _) = observer_node(&rt, Node::effect());

        {
            let _ctx = ReactiveContext::enter(&rt, effect);
            let _untracked = ReactiveContext::untracked(&rt);
            rt.register(source);
        }
        assert_eq!(rt.observer_count(source), 0);
    }

    #[test]
    fn notify_runs_observers_inline_outside_a_batch() {
        let rt = Runtime::new();
        let source = rt.insert_node(Node::source());
        let (derived, derived_obs) = observer_node(&rt, Node::derived());
        let (effect, effect_obs) = observer_node(&rt, Node::effect());

        read_as(&rt, derived, source);
        read_as(&rt, effect, source);

        rt.notify(source);

        assert_eq!(derived_obs.calls(), 1);
        assert_eq!(effect_obs.calls(), 1);
    }

    #[test]
    fn notify_queues_effects_but_not_derived_inside_a_batch() {
        let rt = Runtime::new();
        let source = rt.insert_node(Node::source());
        let (derived, derived_obs) = observer_node(&rt, Node::derived());
        let (effect, effect_obs) = observer_node(&rt, Node::effect());

        read_as(&rt, derived, source);
        read_as(&rt, effect, source);

        rt.transaction(|| {
            rt.notify(source);
            rt.notify(source);

            // Derived ran inline each time, effect is queued once
            assert_eq!(derived_obs.calls(), 2);
            assert_eq!(effect_obs.calls(), 0);
        });

        assert_eq!(effect_obs.calls(), 1);
    }

    #[test]
    fn notify_skips_observer_on_top_of_stack() {
        let rt = Runtime::new();
        let source = rt.insert_node(Node::source());
        let (effect, effect_obs) = observer_node(&rt, Node::effect());

        read_as(&rt, effect, source);

        {
            let _ctx = ReactiveContext::enter(&rt, effect);
            rt.notify(source);
        }
        assert_eq!(effect_obs.calls(), 0);
    }

    #[test]
    fn clear_dependencies_stops_notification() {
        let rt = Runtime::new();
        let source = rt.insert_node(Node::source());
        let (effect, effect_obs) = observer_node(&rt, Node::effect());

        read_as(&rt, effect, source);
        rt.clear(effect);
        rt.notify(source);

        assert_eq!(effect_obs.calls(), 0);
    }

    #[test]
    fn remove_node_frees_slot_and_edges() {
        let rt = Runtime::new();
        let source = rt.insert_node(Node::source());
        let (effect, _) = observer_node(&rt, Node::effect());
        read_as(&rt, effect, source);

        rt.remove_node(effect);

        assert_eq!(rt.node_count(), 1);
        assert_eq!(rt.observer_count(source), 0);
        assert!(rt.label_of(effect).contains("disposed"));
    }

    #[test]
    fn labels_default_to_kind_and_slot() {
        let rt = Runtime::new();
        let id = rt.insert_node(Node::source());
        assert!(rt.label_of(id).starts_with("ripple:signal#"));

        rt.set_label(id, Arc::from("count"));
        assert_eq!(rt.label_of(id), "count");
    }

    #[test]
    fn runtimes_are_independent() {
        let a = Runtime::new();
        let b = Runtime::new();
        a.insert_node(Node::source());

        assert_eq!(a.node_count(), 1);
        assert_eq!(b.node_count(), 0);
        assert!(!Runtime::ptr_eq(&a, &b));
        assert!(Runtime::ptr_eq(&a, &a.clone()));
    }
}
