//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! The runtime keeps a stack of observers. When entering a reactive context
//! (e.g., evaluating a computed or running a reaction), we push the observer
//! onto the stack. When the guard drops, we pop it.
//!
//! The same guard also saves and restores the runtime's scope flags
//! (tracking suppression, write prohibition, current effect), so nested
//! scopes always unwind to exactly the state they started from, including
//! when user code panics.

use crate::graph::NodeId;

use super::runtime::{Runtime, State};

#[derive(Debug, Clone, Copy)]
struct Saved {
    untracked: bool,
    writes_forbidden: bool,
    current_effect: Option<NodeId>,
}

/// Guard that pops the context when dropped.
pub(crate) struct ReactiveContext<'a> {
    runtime: &'a Runtime,
    observer: Option<NodeId>,
    saved: Saved,
}

impl<'a> ReactiveContext<'a> {
    /// Enter a tracking context for a reaction or once observer.
    ///
    /// Reads inside are recorded even if an enclosing action suppressed
    /// tracking.
    pub(crate) fn enter(runtime: &'a Runtime, observer: NodeId) -> Self {
        Self::push(runtime, Some(observer), |state| {
            state.untracked = false;
        })
    }

    /// Enter the evaluation context of a computed value.
    ///
    /// Like `enter`, and additionally forbids signal writes.
    pub(crate) fn evaluate(runtime: &'a Runtime, observer: NodeId) -> Self {
        Self::push(runtime, Some(observer), |state| {
            state.untracked = false;
            state.writes_forbidden = true;
        })
    }

    /// Suppress dependency tracking.
    pub(crate) fn untracked(runtime: &'a Runtime) -> Self {
        Self::push(runtime, None, |state| {
            state.untracked = true;
        })
    }

    /// Mark `effect` as the effect currently being run.
    pub(crate) fn running(runtime: &'a Runtime, effect: NodeId) -> Self {
        Self::push(runtime, None, |state| {
            state.current_effect = Some(effect);
        })
    }

    fn push(
        runtime: &'a Runtime,
        observer: Option<NodeId>,
        configure: impl FnOnce(&mut State),
    ) -> Self {
        let saved = runtime.with_state(|state| {
            let saved = Saved {
                untracked: state.untracked,
                writes_forbidden: state.writes_forbidden,
                current_effect: state.current_effect,
            };
            if let Some(id) = observer {
                state.stack.push(id);
            }
            configure(state);
            saved
        });

        Self {
            runtime,
            observer,
            saved,
        }
    }
}

impl Drop for ReactiveContext<'_> {
    fn drop(&mut self) {
        let observer = self.observer;
        let saved = self.saved;
        self.runtime.with_state(|state| {
            if let Some(expected) = observer {
                let popped = state.stack.pop();

                // Verify we're popping the right context.
                debug_assert_eq!(
                    popped,
                    Some(expected),
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    expected,
                    popped
                );
            }
            state.untracked = saved.untracked;
            state.writes_forbidden = saved.writes_forbidden;
            state.current_effect = saved.current_effect;
        });
    }
}
