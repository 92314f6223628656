use crate::Context;
use std::future::Future;

/// The terminal handler at the end of a route's middleware chain.
///
/// This mirrors `under::Endpoint`, generalized from `Fn(Request) ->
/// impl Future<Output = impl IntoResponse>` to `Fn(&mut Context) -> ...`,
/// since the pipeline now threads a single [`Context`] through the whole
/// chain (request, response-in-progress, params, and state together)
/// rather than handing middleware a `Request` and expecting a `Response`
/// back.
#[async_trait::async_trait]
pub trait Endpoint: Send + Sync + 'static {
    #[must_use]
    /// Runs the endpoint against `ctx`, staging its response onto it.
    async fn apply(&self, ctx: &mut Context) -> Result<(), anyhow::Error>;

    #[doc(hidden)]
    fn describe(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", std::any::type_name::<Self>())
    }
}

impl std::fmt::Debug for dyn Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.describe(f)
    }
}

#[async_trait::async_trait]
impl<F, Fut> Endpoint for F
where
    F: Fn(&mut Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
{
    async fn apply(&self, ctx: &mut Context) -> Result<(), anyhow::Error> {
        self(ctx).await
    }
}

pub(crate) struct SyncEndpoint<F>(pub(crate) F);

#[async_trait::async_trait]
impl<F> Endpoint for SyncEndpoint<F>
where
    F: Fn(&mut Context) -> Result<(), anyhow::Error> + Send + Sync + 'static,
{
    async fn apply(&self, ctx: &mut Context) -> Result<(), anyhow::Error> {
        (self.0)(ctx)
    }
}

/// Creates an endpoint that synchronously produces a response, without
/// spawning a blocking task. Useful for handlers that do no awaiting of
/// their own.
pub fn sync<F>(func: F) -> impl Endpoint
where
    F: Fn(&mut Context) -> Result<(), anyhow::Error> + Send + Sync + 'static,
{
    SyncEndpoint(func)
}

/// Creates an endpoint that ignores the context and always runs the same
/// synchronous, infallible closure - paired well with something like
/// `ctx.res_status(StatusCode::NOT_FOUND)`.
pub fn simple<F>(func: F) -> impl Endpoint
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    SyncEndpoint(move |ctx: &mut Context| {
        func(ctx);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sync_endpoint_runs_closure() {
        let endpoint = sync(|ctx: &mut Context| {
            ctx.res_text("ok");
            Ok(())
        });
        let mut ctx = Context::for_test(crate::Request::get("/").unwrap());
        endpoint.apply(&mut ctx).await.unwrap();
        assert_eq!(ctx.response().status(), http::StatusCode::OK);
    }
}
