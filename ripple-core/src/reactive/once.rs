//! Once Implementation
//!
//! `once` is the one-shot subscription: it runs an action with tracking,
//! then waits for the first change to anything the action read. On that
//! change it disposes itself and runs the effect inside a nested batch, so
//! the effect's own writes are deduplicated.
//!
//! The action receives the subscription's [`Disposer`]. Disposing from
//! inside the action discards the subscription before it ever fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{BoxError, Error};
use crate::graph::{Node, NodeId, Observer};

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::subscriber::{deliver, Disposable, Disposer, ErrorHandler};

type OnceAction = Box<dyn FnOnce(&Disposer) -> Result<(), BoxError> + Send>;
type OnceEffect = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

/// Builder returned by [`Runtime::once`].
pub struct OnceBuilder {
    runtime: Runtime,
    action: OnceAction,
    effect: OnceEffect,
    on_error: Option<ErrorHandler>,
    label: Option<Arc<str>>,
}

impl OnceBuilder {
    pub(crate) fn new<A, E>(runtime: &Runtime, action: A, effect: E) -> Self
    where
        A: FnOnce(&Disposer) -> Result<(), BoxError> + Send + 'static,
        E: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        Self {
            runtime: runtime.clone(),
            action: Box::new(action),
            effect: Box::new(effect),
            on_error: None,
            label: None,
        }
    }

    /// Receive action and effect errors instead of having them logged.
    pub fn on_error<H>(mut self, handler: H) -> Self
    where
        H: Fn(&Error, &Disposer) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Name this subscription in error sources.
    pub fn label(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Run the action and subscribe to what it read.
    pub fn start(self) -> Disposer {
        let runtime = self.runtime;
        let _turn = runtime.turn();

        let id = runtime.insert_node(Node::effect().with_label(self.label));
        let once = Arc::new(Once {
            runtime: runtime.clone(),
            id,
            effect: Mutex::new(Some(self.effect)),
            on_error: self.on_error,
            disposed: AtomicBool::new(false),
        });
        runtime.attach_observer(id, once.clone());

        // Captured up front: the action may dispose and free the node
        let source = runtime.label_of(id);
        let disposer = Disposer::new(once.clone());
        let outcome = {
            let _ctx = ReactiveContext::enter(&runtime, id);
            (self.action)(&disposer)
        };
        if let Err(cause) = outcome {
            once.report(&source, Error::from_boxed(cause));
        }

        disposer
    }
}

struct Once {
    runtime: Runtime,
    id: NodeId,
    effect: Mutex<Option<OnceEffect>>,
    on_error: Option<ErrorHandler>,
    disposed: AtomicBool,
}

impl Once {
    /// Flip to disposed and free the node. Returns whether this call did it.
    fn retire(&self) -> bool {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.runtime.remove_node(self.id);
        true
    }

    fn report(self: &Arc<Self>, source: &str, error: Error) {
        deliver(
            source,
            error,
            self.on_error.as_ref(),
            &Disposer::new(self.clone()),
        );
    }
}

impl Observer for Once {
    fn notify(self: Arc<Self>) {
        let source = self.runtime.label_of(self.id);
        if !self.retire() {
            return;
        }

        let Some(effect) = self.effect.lock().take() else {
            return;
        };

        let outcome = self.runtime.transaction(effect);
        if let Err(cause) = outcome {
            // The node is gone; label with the source captured before retiring
            self.report(&source, Error::from_boxed(cause));
        }
    }
}

impl Disposable for Once {
    fn dispose(&self) {
        let _turn = self.runtime.turn();
        if self.retire() {
            debug!(id = ?self.id, "once disposed before firing");
            let effect = self.effect.lock().take();
            drop(effect);
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
