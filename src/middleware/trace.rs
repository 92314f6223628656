use super::{Middleware, Next};
use crate::Context;

/// Logs each request's method, path, and outcome, reading both from the
/// in-flight [`Context`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct TraceMiddleware;

impl TraceMiddleware {
    pub const fn new() -> Self {
        TraceMiddleware
    }
}

#[async_trait::async_trait]
impl Middleware for TraceMiddleware {
    async fn apply(&self, ctx: &mut Context, next: Next<'_>) -> Result<(), anyhow::Error> {
        let method = ctx.method().clone();
        let path = ctx.path().to_owned();
        let id = ctx.id().to_owned();
        log::info!("--> {} {} {}", id, method, path);
        let start = std::time::Instant::now();

        let result = next.apply(ctx).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(()) => log::info!(
                "<-- {} {} {}: {} (in {}ms)",
                id,
                method,
                path,
                ctx.response().status(),
                elapsed.as_millis()
            ),
            Err(error) => log::warn!(
                "<-- {} {} {}: error ({}) (in {}ms)",
                id,
                method,
                path,
                error,
                elapsed.as_millis()
            ),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Request;

    #[tokio::test]
    async fn logs_and_forwards_to_the_endpoint() {
        let endpoint = crate::endpoint::simple(|ctx| ctx.res_text("ok"));
        let rest: [std::sync::Arc<dyn Middleware>; 0] = [];
        let next = Next::new(&rest, std::pin::Pin::new(&endpoint));
        let mut ctx = Context::for_test(Request::get("/trace").unwrap());
        TraceMiddleware::new().apply(&mut ctx, next).await.unwrap();
        assert_eq!(ctx.response().status(), http::StatusCode::OK);
    }
}
