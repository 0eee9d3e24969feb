//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computed Values Work
//!
//! 1. On first access, the computed runs its function and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, the cached
//!    result is returned.
//!
//! 3. When a dependency changes, the computed drops its edges, marks itself
//!    dirty and passes the notification on to its own observers. It does
//!    not recompute.
//!
//! 4. On next access, it recomputes, re-subscribing to whatever it reads.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 computed values depend on it
//! - Only the ones actually read will recompute, and only once
//!
//! # Errors
//!
//! A failing evaluation is cached exactly like a value: it is labeled once,
//! and every read hands back the same [`Error`] until a dependency changes.
//! Signals cannot be written while a computed evaluates.

use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Serialize, Serializer};

use crate::error::{BoxError, Error, ErrorKind, Result};
use crate::graph::{Node, NodeId, Observer};

use super::context::ReactiveContext;
use super::runtime::Runtime;

type ComputeFn<T> = dyn Fn(Option<&T>) -> std::result::Result<T, BoxError> + Send + Sync;

struct ComputedState<T> {
    /// Last successful value, passed back into the next evaluation.
    value: Option<T>,

    /// Needs evaluation before the next read.
    dirty: bool,

    /// Failure of the last evaluation, if it failed.
    error: Option<Error>,
}

struct ComputedInner<T> {
    runtime: Runtime,
    id: NodeId,
    compute: Box<ComputeFn<T>>,
    state: Mutex<ComputedState<T>>,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.runtime.remove_node(self.id);
    }
}

/// The computed's observer: invalidates on any dependency change.
struct Invalidator<T> {
    computed: Weak<ComputedInner<T>>,
}

impl<T> Observer for Invalidator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn notify(self: Arc<Self>) {
        if let Some(computed) = self.computed.upgrade() {
            computed.invalidate();
        }
    }
}

impl<T> ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn invalidate(&self) {
        self.runtime.clear(self.id);
        {
            let mut state = self.state.lock();
            state.dirty = true;
            state.error = None;
        }
        self.runtime.notify(self.id);
    }

    /// Return the cached result, evaluating first if dirty.
    fn refresh(&self) -> Result<T> {
        if self.runtime.is_evaluating(self.id) {
            let label = self.runtime.label_of(self.id);
            return Err(Error::new(ErrorKind::CyclicComputed).labeled(&label));
        }

        let previous = {
            let mut state = self.state.lock();
            if !state.dirty {
                return match &state.error {
                    Some(error) => Err(error.clone()),
                    None => Ok(state
                        .value
                        .clone()
                        .expect("clean computed should have a value")),
                };
            }
            state.value.take()
        };

        self.runtime.clear(self.id);
        let outcome = {
            let _ctx = ReactiveContext::evaluate(&self.runtime, self.id);
            (self.compute)(previous.as_ref())
        };

        let mut state = self.state.lock();
        state.dirty = false;
        match outcome {
            Ok(value) => {
                state.value = Some(value.clone());
                state.error = None;
                Ok(value)
            }
            Err(cause) => {
                let label = self.runtime.label_of(self.id);
                let error = Error::from_boxed(cause).labeled(&label);
                state.value = previous;
                state.error = Some(error.clone());
                Err(error)
            }
        }
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// Clones share the same cache. The cache (and its graph node) is freed
/// when the last clone is dropped.
pub struct Computed<T> {
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new computed with the given function.
    ///
    /// The function is not run immediately. It runs on first access and
    /// receives the previously cached value on later runs.
    pub fn new<F>(runtime: &Runtime, compute: F) -> Self
    where
        F: Fn(Option<&T>) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        let id = runtime.insert_node(Node::derived());
        let inner = Arc::new(ComputedInner {
            runtime: runtime.clone(),
            id,
            compute: Box::new(compute),
            state: Mutex::new(ComputedState {
                value: None,
                dirty: true,
                error: None,
            }),
        });

        runtime.attach_observer(
            id,
            Arc::new(Invalidator {
                computed: Arc::downgrade(&inner),
            }),
        );

        Self { inner }
    }

    /// Name this computed in error sources.
    pub fn with_label(self, label: impl Into<Arc<str>>) -> Self {
        self.inner.runtime.set_label(self.inner.id, label.into());
        self
    }

    /// Get the computed's graph node.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Registers this computed as a dependency of the calling context. If
    /// the last evaluation failed, returns that same error.
    pub fn get(&self) -> Result<T> {
        let _turn = self.inner.runtime.turn();
        self.inner.runtime.register(self.inner.id);
        self.inner.refresh()
    }

    /// Like `get`, without registering a dependency.
    pub fn peek(&self) -> Result<T> {
        let _turn = self.inner.runtime.turn();
        self.inner.refresh()
    }

    /// Whether the next read will evaluate.
    pub fn is_dirty(&self) -> bool {
        self.inner.state.lock().dirty
    }

    /// Check if a successful value is cached.
    pub fn has_value(&self) -> bool {
        self.inner.state.lock().value.is_some()
    }

    /// Get the number of observers.
    pub fn observer_count(&self) -> usize {
        self.inner.runtime.observer_count(self.inner.id)
    }

    /// Get the number of values this computed currently depends on.
    pub fn dependency_count(&self) -> usize {
        self.inner.runtime.dependency_count(self.inner.id)
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("dirty", &self.is_dirty())
            .field("has_value", &self.has_value())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

/// Serializes the current value, untracked. A cached error fails the
/// serialization.
impl<T> Serialize for Computed<T>
where
    T: Clone + Send + Sync + Serialize + 'static,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::Error as _;

        match self.peek() {
            Ok(value) => value.serialize(serializer),
            Err(err) => Err(S::Error::custom(err)),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
