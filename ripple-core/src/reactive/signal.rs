//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/reaction),
//!    the runtime records an edge from the signal to that context.
//!
//! 2. When a signal's value changes, all observers are notified, inside an
//!    ad-hoc batch if none is open.
//!
//! 3. Writing a value equal to the current one is a no-op.
//!
//! 4. Writes fail while a computed value is being evaluated, and while the
//!    signal's own value is borrowed by `with`, `update` or `edit` further
//!    up the call stack.
//!
//! # Thread Safety
//!
//! Signals are `Send + Sync` when `T` is. The value is protected by a
//! `RwLock`; graph bookkeeping goes through the runtime.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Serialize, Serializer};

use crate::error::{Error, ErrorKind, Result};
use crate::graph::{Node, NodeId};

use super::runtime::Runtime;

struct SignalInner<T> {
    runtime: Runtime,
    id: NodeId,
    value: RwLock<T>,

    /// Open borrows of `value` on the thread holding the turn.
    borrows: AtomicUsize,
}

/// Marks the value as borrowed for as long as it lives.
struct Borrow<'a> {
    borrows: &'a AtomicUsize,
}

impl<'a> Borrow<'a> {
    fn new(borrows: &'a AtomicUsize) -> Self {
        borrows.fetch_add(1, Ordering::SeqCst);
        Self { borrows }
    }
}

impl Drop for Borrow<'_> {
    fn drop(&mut self) {
        self.borrows.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        self.runtime.remove_node(self.id);
    }
}

/// A reactive signal holding a value of type T.
///
/// Clones share the same cell. The cell (and its graph node) is freed when
/// the last clone is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let count = runtime.signal(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies observers)
/// count.set(5)?;
/// ```
pub struct Signal<T> {
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(runtime: &Runtime, value: T) -> Self {
        let id = runtime.insert_node(Node::source());
        Self {
            inner: Arc::new(SignalInner {
                runtime: runtime.clone(),
                id,
                value: RwLock::new(value),
                borrows: AtomicUsize::new(0),
            }),
        }
    }

    /// Name this signal in error sources.
    pub fn with_label(self, label: impl Into<Arc<str>>) -> Self {
        self.inner.runtime.set_label(self.inner.id, label.into());
        self
    }

    /// Get the signal's graph node.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as an observer.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, registering the read like `get`.
    ///
    /// Writing this signal from inside `f`, directly or through the effects
    /// such a write would run, fails with `BorrowedWrite`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let _turn = self.inner.runtime.turn();
        self.inner.runtime.register(self.inner.id);
        self.borrow(f)
    }

    fn borrow<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let _borrow = Borrow::new(&self.inner.borrows);
        let value = self.inner.value.read();
        f(&*value)
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.read().clone()
    }

    /// Set a new value and notify observers.
    ///
    /// Nothing happens if `value` equals the stored value.
    pub fn set(&self, value: T) -> Result<()>
    where
        T: PartialEq,
    {
        let _turn = self.inner.runtime.turn();
        self.check_writable()?;

        {
            let mut guard = self.inner.value.write();
            if *guard == value {
                return Ok(());
            }
            *guard = value;
        }

        self.changed();
        Ok(())
    }

    /// Update the value using a function of the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<()>
    where
        T: PartialEq,
    {
        let _turn = self.inner.runtime.turn();
        let next = self.borrow(f);
        self.set(next)
    }

    /// Mutate the value in place, then notify observers unconditionally.
    ///
    /// The mutator's return value is ignored and the access is not tracked.
    /// Writes to this signal from inside the mutator fail; reads of it must
    /// not happen there at all.
    pub fn edit<R>(&self, mutator: impl FnOnce(&mut T) -> R) -> Result<()> {
        let _turn = self.inner.runtime.turn();
        self.check_writable()?;

        {
            let _borrow = Borrow::new(&self.inner.borrows);
            let mut guard = self.inner.value.write();
            let _ = mutator(&mut *guard);
        }

        self.changed();
        Ok(())
    }

    /// Notify observers without changing the value.
    pub fn force_notify(&self) -> Result<()> {
        let _turn = self.inner.runtime.turn();
        self.check_writable()?;
        self.changed();
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        let kind = if self.inner.runtime.writes_forbidden() {
            ErrorKind::WriteViolation
        } else if self.inner.borrows.load(Ordering::SeqCst) > 0 {
            ErrorKind::BorrowedWrite
        } else {
            return Ok(());
        };

        let label = self.inner.runtime.label_of(self.inner.id);
        Err(Error::new(kind).labeled(&label))
    }

    /// Deliver the change, opening an ad-hoc batch if none is open.
    fn changed(&self) {
        let runtime = &self.inner.runtime;
        runtime.transaction(|| runtime.notify(self.inner.id));
    }

    /// Get the number of observers.
    pub fn observer_count(&self) -> usize {
        self.inner.runtime.observer_count(self.inner.id)
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

/// Serializes the current value, untracked.
impl<T> Serialize for Signal<T>
where
    T: Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.inner.value.read().serialize(serializer)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
