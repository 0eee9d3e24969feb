//! Reaction Implementation
//!
//! A Reaction is a side-effecting subscription that re-runs whenever the
//! values its action read change.
//!
//! # How Reactions Work
//!
//! 1. When started, the reaction runs its action to establish initial
//!    dependencies (and, if `immediate`, runs the effect with the result).
//!
//! 2. When any dependency changes, the reaction is queued on the open batch.
//!
//! 3. When it fires, it drops its old edges, re-runs the action to
//!    re-subscribe, then runs the effect with the new and previous results.
//!    Dependencies may differ run to run, so the subscription is rebuilt
//!    every time.
//!
//! # State Machine
//!
//! ```text
//!            start()                 dispose() / cycle detected
//!   ──────────────────▶ Active ─────────────────────────────▶ Disposed
//!                        │  ▲
//!                        └──┘ dependency changed: clear, re-run, effect
//! ```
//!
//! Each firing bumps a per-reaction counter kept by the runtime for the
//! current outermost batch. Once it passes the configured ceiling the
//! reaction reports a `CircularReaction` error and disposes itself instead
//! of looping forever.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{BoxError, Error, ErrorKind};
use crate::graph::{Node, NodeId, Observer};

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::subscriber::{deliver, Disposable, Disposer, ErrorHandler};

type ActionFn<V> = dyn Fn() -> Result<V, BoxError> + Send + Sync;
type EffectFn<V> = dyn Fn(&V, Option<&V>) -> Result<(), BoxError> + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Active,
    Disposed,
}

struct ReactionState<V> {
    status: Status,

    /// Result of the last successful action run.
    last: Option<V>,
}

/// Builder returned by [`Runtime::reaction`].
///
/// # Example
///
/// ```rust,ignore
/// let disposer = runtime
///     .reaction(move || Ok(todos.with(|t| t.len())))
///     .effect(|count, previous| {
///         println!("{previous:?} -> {count}");
///         Ok(())
///     })
///     .label("todo-count")
///     .start();
/// ```
pub struct ReactionBuilder<V> {
    runtime: Runtime,
    action: Box<ActionFn<V>>,
    effect: Option<Box<EffectFn<V>>>,
    immediate: bool,
    on_error: Option<ErrorHandler>,
    label: Option<Arc<str>>,
}

impl<V> ReactionBuilder<V>
where
    V: Send + Sync + 'static,
{
    pub(crate) fn new<F>(runtime: &Runtime, action: F) -> Self
    where
        F: Fn() -> Result<V, BoxError> + Send + Sync + 'static,
    {
        Self {
            runtime: runtime.clone(),
            action: Box::new(action),
            effect: None,
            immediate: false,
            on_error: None,
            label: None,
        }
    }

    /// Run `effect` after every re-run of the action, with the new result
    /// and the previous one. Without an effect, the action is the effect.
    pub fn effect<E>(mut self, effect: E) -> Self
    where
        E: Fn(&V, Option<&V>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.effect = Some(Box::new(effect));
        self
    }

    /// Also run the effect right after the first action run.
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Receive action and effect errors instead of having them logged.
    pub fn on_error<H>(mut self, handler: H) -> Self
    where
        H: Fn(&Error, &Disposer) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Name this reaction in error sources.
    pub fn label(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Run the action once and subscribe.
    pub fn start(self) -> Disposer {
        let runtime = self.runtime;
        let _turn = runtime.turn();

        let id = runtime.insert_node(Node::effect().with_label(self.label));
        let reaction = Arc::new(Reaction {
            runtime: runtime.clone(),
            id,
            action: self.action,
            effect: self.effect,
            immediate: self.immediate,
            on_error: self.on_error,
            state: Mutex::new(ReactionState {
                status: Status::Active,
                last: None,
            }),
        });
        runtime.attach_observer(id, reaction.clone());

        reaction.run(true);
        reaction.disposer()
    }
}

struct Reaction<V> {
    runtime: Runtime,
    id: NodeId,
    action: Box<ActionFn<V>>,
    effect: Option<Box<EffectFn<V>>>,
    immediate: bool,
    on_error: Option<ErrorHandler>,
    state: Mutex<ReactionState<V>>,
}

impl<V> Reaction<V>
where
    V: Send + Sync + 'static,
{
    fn disposer(self: &Arc<Self>) -> Disposer {
        Disposer::new(self.clone())
    }

    fn source(&self) -> String {
        self.runtime.label_of(self.id)
    }

    fn report(self: &Arc<Self>, error: Error) {
        deliver(
            &self.source(),
            error,
            self.on_error.as_ref(),
            &self.disposer(),
        );
    }

    /// Re-subscribe by running the action, then run the effect.
    fn run(self: &Arc<Self>, initial: bool) {
        self.runtime.clear(self.id);

        let outcome = {
            let _ctx = ReactiveContext::enter(&self.runtime, self.id);
            (self.action)()
        };

        // Disposed from inside the action: no effect, no edges
        if self.is_disposed() {
            return;
        }

        let value = match outcome {
            Ok(value) => value,
            Err(cause) => {
                self.report(Error::from_boxed(cause));
                return;
            }
        };

        let Some(effect) = &self.effect else {
            return;
        };

        let previous = self.state.lock().last.take();
        if !initial || self.immediate {
            let outcome = self
                .runtime
                .transaction(|| effect(&value, previous.as_ref()));
            if let Err(cause) = outcome {
                self.report(Error::from_boxed(cause));
            }
        }

        let mut state = self.state.lock();
        if state.status == Status::Active {
            state.last = Some(value);
        }
    }
}

impl<V> Observer for Reaction<V>
where
    V: Send + Sync + 'static,
{
    fn notify(self: Arc<Self>) {
        if self.is_disposed() {
            return;
        }

        let limit = self.runtime.config().reentry_limit;
        let firings = self.runtime.bump_reentry(self.id);
        if firings > limit {
            let source = self.source();
            debug!(source = %source, limit, "reaction is re-triggering itself, disposing");

            let error = Error::new(ErrorKind::CircularReaction { limit }).labeled(&source);
            self.dispose();
            self.report(error);
            return;
        }

        self.run(false);
    }
}

impl<V> Disposable for Reaction<V>
where
    V: Send + Sync + 'static,
{
    fn dispose(&self) {
        let _turn = self.runtime.turn();
        let last = {
            let mut state = self.state.lock();
            if state.status == Status::Disposed {
                return;
            }
            state.status = Status::Disposed;
            state.last.take()
        };
        drop(last);

        debug!(source = %self.source(), "reaction disposed");
        self.runtime.remove_node(self.id);
    }

    fn is_disposed(&self) -> bool {
        self.state.lock().status == Status::Disposed
    }
}

impl<V> fmt::Debug for Reaction<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.id)
            .field("status", &self.state.lock().status)
            .field("has_effect", &self.effect.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
