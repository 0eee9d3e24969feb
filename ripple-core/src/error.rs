//! Error Envelope
//!
//! Every failure that crosses a reactive boundary (computed, action,
//! reaction, once) travels as an [`Error`]: a shared, immutable record of
//! what went wrong plus the label of the node it came from.
//!
//! Labeling is idempotent. The first boundary that sees an error attaches
//! its source; every later boundary leaves it alone. Because the record is
//! behind an `Arc`, a computed that caches an error hands out the very same
//! object on every read, which `Error::ptr_eq` can observe.
//!
//! User closures return `Result<_, BoxError>` so `?` works with any error
//! type. An `Error` that was boxed on the way through a closure is recovered
//! by downcasting at the next boundary rather than wrapped a second time.

use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Boxed error returned by user closures.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// What went wrong.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A computed, action, reaction or once body returned an error.
    #[error("{0}")]
    Computation(BoxError),

    /// A reaction kept re-triggering itself inside one outermost batch.
    #[error("reaction re-triggered itself more than {limit} times in one batch")]
    CircularReaction { limit: u32 },

    /// A signal was written while a computed value was being evaluated.
    #[error("signals cannot be written while a computed value is evaluating")]
    WriteViolation,

    /// A signal was written while its value was still borrowed by `with`,
    /// `update` or `edit` further up the stack.
    #[error("signal written while its value is borrowed")]
    BorrowedWrite,

    /// A computed value read itself during its own evaluation.
    #[error("computed value read itself during its own evaluation")]
    CyclicComputed,
}

#[derive(Debug)]
struct Envelope {
    kind: ErrorKind,
    source: OnceLock<Arc<str>>,
}

/// A source-labeled reactive error. Cloning shares the same record.
#[derive(Clone)]
pub struct Error {
    inner: Arc<Envelope>,
}

impl Error {
    /// Create an unlabeled error.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            inner: Arc::new(Envelope {
                kind,
                source: OnceLock::new(),
            }),
        }
    }

    /// Wrap an arbitrary failure as a computation error.
    pub fn computation(cause: impl Into<BoxError>) -> Self {
        Self::from_boxed(cause.into())
    }

    /// Recover an `Error` from a boxed error, or wrap a foreign one.
    pub fn from_boxed(error: BoxError) -> Self {
        match error.downcast::<Error>() {
            Ok(error) => *error,
            Err(cause) => Self::new(ErrorKind::Computation(cause)),
        }
    }

    /// Attach `source` unless a source is already attached.
    ///
    /// Returns the same record either way.
    pub fn labeled(self, source: &str) -> Self {
        let _ = self.inner.source.set(Arc::from(source));
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.inner.kind
    }

    /// The label of the node the error was first seen at.
    pub fn source_label(&self) -> Option<&str> {
        self.inner.source.get().map(|s| &**s)
    }

    pub fn is_labeled(&self) -> bool {
        self.inner.source.get().is_some()
    }

    pub fn is_circular(&self) -> bool {
        matches!(self.kind(), ErrorKind::CircularReaction { .. })
    }

    pub fn is_write_violation(&self) -> bool {
        matches!(self.kind(), ErrorKind::WriteViolation)
    }

    pub fn is_borrowed_write(&self) -> bool {
        matches!(self.kind(), ErrorKind::BorrowedWrite)
    }

    /// Whether both handles point at the same record.
    pub fn ptr_eq(a: &Error, b: &Error) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source_label() {
            Some(source) => write!(f, "[{}] {}", source, self.inner.kind),
            None => write!(f, "{}", self.inner.kind),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.inner.kind)
            .field("source", &self.source_label())
            .finish()
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.inner.kind {
            ErrorKind::Computation(cause) => Some(&**cause),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn labeling_is_idempotent() {
        let error = Error::computation(Boom).labeled("first");
        let relabeled = error.clone().labeled("second");

        assert_eq!(relabeled.source_label(), Some("first"));
        assert!(Error::ptr_eq(&error, &relabeled));
        assert_eq!(relabeled.to_string(), "[first] boom");
    }

    #[test]
    fn boxed_error_round_trips_without_rewrapping() {
        let original = Error::new(ErrorKind::WriteViolation).labeled("count");
        let boxed: BoxError = Box::new(original.clone());

        let recovered = Error::from_boxed(boxed);
        assert!(Error::ptr_eq(&original, &recovered));
        assert!(recovered.is_write_violation());
    }

    #[test]
    fn foreign_errors_become_computation_errors() {
        let error = Error::from_boxed("plain message".into());

        assert!(matches!(error.kind(), ErrorKind::Computation(_)));
        assert!(!error.is_labeled());
        assert_eq!(error.to_string(), "plain message");
        assert!(StdError::source(&error).is_some());
    }

    #[test]
    fn circular_error_message_names_the_limit() {
        let error = Error::new(ErrorKind::CircularReaction { limit: 100 }).labeled("loop");
        assert!(error.is_circular());
        assert_eq!(
            error.to_string(),
            "[loop] reaction re-triggered itself more than 100 times in one batch"
        );
    }
}
