//! Subscription handles shared by reactions and once.
//!
//! A subscription is any observer the user created directly and may tear
//! down: reactions and once. Each hands back a [`Disposer`], and each routes
//! its failures through [`deliver`].

use std::fmt;
use std::sync::Arc;

use tracing::error;

use crate::error::{BoxError, Error};

/// Callback receiving a subscription's errors together with its disposer.
///
/// A handler that fails is logged; it never interrupts the batch.
pub type ErrorHandler = Arc<dyn Fn(&Error, &Disposer) -> Result<(), BoxError> + Send + Sync>;

/// Something a [`Disposer`] can tear down.
pub(crate) trait Disposable: Send + Sync {
    /// Stop the subscription. Must be idempotent.
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

/// Handle that stops a subscription.
///
/// Disposing is idempotent and may happen from anywhere, including from
/// inside the subscription's own action or effect. Dropping a `Disposer`
/// does *not* dispose: a subscription lives until it is disposed.
#[derive(Clone)]
pub struct Disposer {
    target: Arc<dyn Disposable>,
}

impl Disposer {
    pub(crate) fn new(target: Arc<dyn Disposable>) -> Self {
        Self { target }
    }

    /// Stop the subscription and clear its dependency edges.
    pub fn dispose(&self) {
        self.target.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.target.is_disposed()
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Label `error` with `source` and hand it to `handler`, or log it.
pub(crate) fn deliver(
    source: &str,
    error: Error,
    handler: Option<&ErrorHandler>,
    disposer: &Disposer,
) {
    let error = error.labeled(source);

    let Some(handler) = handler else {
        error!(
            source = error.source_label().unwrap_or(source),
            error = %error,
            "unhandled error in subscription"
        );
        return;
    };

    if let Err(failure) = handler(&error, disposer) {
        error!(
            source,
            error = %failure,
            original = %error,
            "subscription error handler failed"
        );
    }
}
