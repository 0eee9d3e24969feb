//! Batch Scheduler
//!
//! A batch is a transactional window: while it is open, reactions and once
//! subscriptions that see a change are queued instead of run, and the queue
//! is a set, so an observer reached through several changed values is
//! queued once. Computed values are never queued; they invalidate inline so
//! that anything reading them later sees fresh state.
//!
//! # Draining
//!
//! Only the outermost batch drains. It does so in rounds: take the whole
//! pending set, replace it with an empty one, run every member of the
//! snapshot, repeat until a round comes back empty. Effects scheduled while
//! a round runs land in the next round. Every effect pending when a round
//! starts therefore fires before anything that round schedules, which gives
//! level-order propagation through diamond-shaped graphs.
//!
//! # Entry Points
//!
//! - [`Runtime::batch`]: tracked batch; errors are logged.
//! - [`Runtime::action`]: untracked batch; errors are returned to the
//!   caller once the queue has drained.
//! - [`Runtime::create_action`]: wraps a function so each call is an action.

use indexmap::IndexSet;
use tracing::{error, trace};

use crate::error::{BoxError, Error};

use super::context::ReactiveContext;
use super::runtime::Runtime;

/// Closes the outermost batch, also when the body unwinds.
struct BatchRoot<'a> {
    runtime: &'a Runtime,
}

impl<'a> BatchRoot<'a> {
    /// Open the outermost batch, unless one is already open.
    fn open(runtime: &'a Runtime) -> Option<Self> {
        let opened = runtime.with_state(|state| {
            if state.pending.is_some() {
                return false;
            }
            state.pending = Some(IndexSet::new());
            state.reentry.clear();
            true
        });

        if opened {
            trace!("batch opened");
            Some(Self { runtime })
        } else {
            None
        }
    }

    /// Run pending effects round by round until none are left.
    fn drain(self) {
        let mut round = 0u32;
        loop {
            let snapshot = self.runtime.with_state(|state| {
                state
                    .pending
                    .as_mut()
                    .map(std::mem::take)
                    .unwrap_or_default()
            });

            if snapshot.is_empty() {
                break;
            }

            round += 1;
            trace!(round, pending = snapshot.len(), "draining batch round");

            for id in snapshot {
                self.runtime.run_observer(id);
            }
        }
    }
}

impl Drop for BatchRoot<'_> {
    fn drop(&mut self) {
        self.runtime.with_state(|state| {
            state.pending = None;
            state.reentry.clear();
        });
        trace!("batch closed");
    }
}

impl Runtime {
    /// Run `body` inside a batch, draining the queue if this call opened it.
    pub(crate) fn transaction<R>(&self, body: impl FnOnce() -> R) -> R {
        let _turn = self.turn();
        let root = BatchRoot::open(self);
        let result = body();
        if let Some(root) = root {
            root.drain();
        }
        result
    }

    /// Run a fallible `body` inside a batch.
    ///
    /// A failure is labeled with the effect currently running, or with
    /// `source` when there is none, and returned after the queue drained.
    pub(crate) fn run_batch<R>(
        &self,
        source: &str,
        body: impl FnOnce() -> Result<R, BoxError>,
    ) -> Result<R, Error> {
        self.transaction(|| {
            body().map_err(|cause| {
                let error = Error::from_boxed(cause);
                let label = self
                    .with_state(|state| state.current_effect)
                    .map(|effect| self.label_of(effect))
                    .unwrap_or_else(|| source.to_string());
                error.labeled(&label)
            })
        })
    }

    /// Run `body` as a batch.
    ///
    /// Notifications caused by `body` are deferred and deduplicated until the
    /// outermost batch closes. Reads inside `body` stay tracked by any
    /// enclosing reaction. A failure is logged and `None` returned.
    pub fn batch<R>(&self, body: impl FnOnce() -> Result<R, BoxError>) -> Option<R> {
        match self.run_batch("batch", body) {
            Ok(value) => Some(value),
            Err(err) => {
                error!(
                    source = err.source_label().unwrap_or("batch"),
                    error = %err,
                    "unhandled error in batch"
                );
                None
            }
        }
    }

    /// Run `body` as an action: an untracked batch.
    ///
    /// Reads inside `body` are not recorded by any enclosing subscription,
    /// and nested actions never re-enable tracking. Queued effects drain
    /// before this returns, including when `body` fails; the failure is then
    /// handed back to the caller.
    pub fn action<R>(&self, body: impl FnOnce() -> Result<R, BoxError>) -> Result<R, Error> {
        let _turn = self.turn();
        let _ctx = ReactiveContext::untracked(self);
        self.run_batch("action", body)
    }

    /// Wrap `f` so that every call runs as an [`action`](Runtime::action).
    ///
    /// Multiple arguments can be passed as a tuple.
    pub fn create_action<A, R, F>(&self, f: F) -> impl Fn(A) -> Result<R, Error> + Send + Sync
    where
        F: Fn(A) -> Result<R, BoxError> + Send + Sync + 'static,
    {
        let runtime = self.clone();
        move |args| runtime.action(|| f(args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Node, NodeId, Observer};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Observer that logs its name and optionally notifies further nodes.
    struct Recorder {
        runtime: Runtime,
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        then_notify: Mutex<Vec<NodeId>>,
    }

    impl Observer for Recorder {
        fn notify(self: Arc<Self>) {
            self.log.lock().push(self.name);
            let next = self.then_notify.lock().clone();
            for id in next {
                self.runtime.notify(id);
            }
        }
    }

    fn recorder(
        rt: &Runtime,
        name: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> (NodeId, Arc<Recorder>) {
        let id = rt.insert_node(Node::effect());
        let recorder = Arc::new(Recorder {
            runtime: rt.clone(),
            name,
            log: log.clone(),
            then_notify: Mutex::new(Vec::new()),
        });
        rt.attach_observer(id, recorder.clone());
        (id, recorder)
    }

    fn subscribe(rt: &Runtime, observer: NodeId, dependency: NodeId) {
        let _ctx = ReactiveContext::enter(rt, observer);
        rt.register(dependency);
    }

    #[test]
    fn only_outermost_batch_drains() {
        let rt = Runtime::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = rt.insert_node(Node::source());
        let (effect, _) = recorder(&rt, "effect", &log);
        subscribe(&rt, effect, source);

        rt.transaction(|| {
            rt.transaction(|| rt.notify(source));
            assert!(log.lock().is_empty());
            assert!(rt.in_batch());
        });

        assert_eq!(*log.lock(), vec!["effect"]);
        assert!(!rt.in_batch());
    }

    #[test]
    fn rounds_run_breadth_first() {
        let rt = Runtime::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let a = rt.insert_node(Node::source());
        let b = rt.insert_node(Node::source());

        // first -> (notifies b) -> third ; second is a sibling of first
        let (first, first_rec) = recorder(&rt, "first", &log);
        let (second, _) = recorder(&rt, "second", &log);
        let (third, _) = recorder(&rt, "third", &log);

        subscribe(&rt, first, a);
        subscribe(&rt, second, a);
        subscribe(&rt, third, b);
        first_rec.then_notify.lock().push(b);

        rt.transaction(|| rt.notify(a));

        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn action_returns_error_after_draining() {
        let rt = Runtime::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = rt.insert_node(Node::source());
        let (effect, _) = recorder(&rt, "effect", &log);
        subscribe(&rt, effect, source);

        let result: Result<(), Error> = rt.action(|| {
            rt.notify(source);
            Err("action failed".into())
        });

        let err = result.unwrap_err();
        assert_eq!(err.source_label(), Some("action"));
        assert_eq!(*log.lock(), vec!["effect"]);
    }

    #[test]
    fn batch_swallows_errors() {
        let rt = Runtime::new();
        let value: Option<i32> = rt.batch(|| Err("nope".into()));
        assert!(value.is_none());
        assert_eq!(rt.batch(|| Ok(3)), Some(3));
    }

    #[test]
    fn action_suppresses_tracking() {
        let rt = Runtime::new();
        let source = rt.insert_node(Node::source());
        let observer = rt.insert_node(Node::effect());

        {
            let _ctx = ReactiveContext::enter(&rt, observer);
            rt.action(|| {
                rt.register(source);
                rt.action(|| {
                    assert!(!rt.is_tracking());
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();
            assert!(rt.is_tracking());
        }

        assert_eq!(rt.observer_count(source), 0);
    }

    #[test]
    fn create_action_forwards_arguments() {
        let rt = Runtime::new();
        let add = rt.create_action(|(a, b): (i32, i32)| Ok(a + b));

        assert_eq!(add((2, 3)).unwrap(), 5);
        assert!(!rt.in_batch());
    }

    #[test]
    fn reentry_counts_reset_per_outermost_batch() {
        let rt = Runtime::new();
        let id = rt.insert_node(Node::effect());

        rt.transaction(|| {
            assert_eq!(rt.bump_reentry(id), 1);
            assert_eq!(rt.bump_reentry(id), 2);
        });
        rt.transaction(|| {
            assert_eq!(rt.bump_reentry(id), 1);
        });
    }
}
