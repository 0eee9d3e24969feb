//! Ripple Core
//!
//! This crate provides a synchronous reactive-dependency engine.
//! It implements:
//!
//! - Reactive primitives (signals, computed values, reactions, once)
//! - Automatic dependency tracking with dynamic re-tracking on every run
//! - Batched, deduplicated propagation of changes
//! - Error capture and routing for computations and subscriptions
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Reactive primitives, the runtime and batching
//! - `graph`: Dependency graph storage shared by every primitive
//! - `error`: The error type carried through computations and handlers
//! - `config`: Runtime settings
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::Runtime;
//!
//! let rt = Runtime::new();
//!
//! // Create a signal
//! let count = rt.signal(0);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     rt.computed(move || count.get() * 2)
//! };
//!
//! // Create a reaction
//! let disposer = {
//!     let count = count.clone();
//!     rt.reaction(move || Ok(count.get() + doubled.get()?))
//!         .effect(|total, _| {
//!             println!("Total: {total}");
//!             Ok(())
//!         })
//!         .start()
//! };
//!
//! // Update the signal
//! count.set(5)?;
//! // Effect runs, prints: "Total: 15"
//!
//! disposer.dispose();
//! ```

pub mod reactive;

mod config;
mod error;
mod graph;

pub use config::RuntimeConfig;
pub use error::{BoxError, Error, ErrorKind, Result};
pub use graph::{NodeId, NodeKind};
pub use reactive::{Computed, Disposer, ErrorHandler, OnceBuilder, ReactionBuilder, Runtime, Signal};
