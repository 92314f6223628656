//! The middleware chain.
//!
//! A middleware is an async function `(ctx, next) -> Result<(), Error>`
//! where `next` runs everything after the current middleware - the rest of
//! the chain, then the route handler. [`Next`] is deliberately not `Copy`:
//! a middleware remains free to write `next.apply(..)` twice, but only the
//! first call actually recurses - the second observes a shared "used" flag
//! already set and fails instead of silently running the downstream chain
//! twice.

mod trace;

pub use self::trace::TraceMiddleware;

use crate::{Context, Endpoint};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[async_trait::async_trait]
/// A request/context modifier sitting between the raw request and the
/// endpoint.
pub trait Middleware: std::fmt::Debug + Send + Sync + 'static {
    #[must_use]
    /// Handles the given context, calling `next.apply(ctx)` to run the rest
    /// of the chain, or returning without calling it to short-circuit.
    async fn apply(&self, ctx: &mut Context, next: Next<'_>) -> Result<(), anyhow::Error>;
}

/// The remaining middleware and terminal endpoint for a single request's
/// chain. Obtained by a [`Middleware`] implementation's `apply` and
/// consumed by (at most once) calling [`Next::apply`].
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    endpoint: Pin<&'a dyn Endpoint>,
    used: Arc<AtomicBool>,
}

impl<'a> Next<'a> {
    pub(crate) fn new(middleware: &'a [Arc<dyn Middleware>], endpoint: Pin<&'a dyn Endpoint>) -> Self {
        Next {
            middleware,
            endpoint,
            used: Arc::new(AtomicBool::new(false)),
        }
    }

    fn continuation(&self, middleware: &'a [Arc<dyn Middleware>]) -> Self {
        Next {
            middleware,
            endpoint: self.endpoint,
            used: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs the remaining middleware (if any), then the endpoint.
    ///
    /// This takes `&self` rather than consuming `self` - a middleware
    /// remains free to *write* `next.apply(ctx).await; next.apply(ctx)
    /// .await;` (the call compiles both times), but only the first call
    /// actually recurses. The second observes the shared `used` flag
    /// already set and fails instead of silently running the downstream
    /// chain twice.
    ///
    /// # Errors
    /// Returns [`crate::LoomError::NextCalledTwice`] if this is not the
    /// first call to `apply` for this particular `Next` value. Otherwise
    /// propagates whatever error the downstream chain produces.
    pub async fn apply(&self, ctx: &mut Context) -> Result<(), anyhow::Error> {
        if self.used.swap(true, Ordering::SeqCst) {
            return Err(crate::LoomError::NextCalledTwice.into());
        }

        if let Some((current, rest)) = self.middleware.split_first() {
            let next = self.continuation(rest);
            current.as_ref().apply(ctx, next).await
        } else {
            self.endpoint.apply(ctx).await
        }
    }
}
