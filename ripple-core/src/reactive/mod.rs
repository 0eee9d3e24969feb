//! Reactive Primitives
//!
//! This module implements the reactive system: signals, computed values,
//! reactions and one-shot subscriptions, plus the batches that group writes.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (a computed value or a subscription), the
//! signal registers that context as a dependent. When the value changes, all
//! dependents are notified.
//!
//! ## Computed Values
//!
//! A Computed is a derived value that caches its result. It is lazy: a
//! change only marks it dirty, and it re-evaluates on the next read. Errors
//! raised by the computation are cached like values.
//!
//! ## Reactions
//!
//! A Reaction runs an action whenever something it read changes, then hands
//! the result to an optional effect. It lives until disposed.
//!
//! ## Once
//!
//! A one-shot reaction: runs its effect on the first change, then disposes
//! itself.
//!
//! ## Batches
//!
//! Writes inside a batch queue their subscriptions instead of running them.
//! The queue drains when the outermost batch closes, so each subscription
//! runs at most once per round.
//!
//! # Implementation Notes
//!
//! Tracking goes through an explicit [`Runtime`] rather than thread-local
//! state. Every primitive holds a handle to the runtime it was created from,
//! and separate runtimes never observe each other.

mod batch;
mod computed;
mod context;
mod once;
mod reaction;
mod runtime;
mod signal;
mod subscriber;

pub use computed::Computed;
pub use once::OnceBuilder;
pub use reaction::ReactionBuilder;
pub use runtime::Runtime;
pub use signal::Signal;
pub use subscriber::{Disposer, ErrorHandler};
