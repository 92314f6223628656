//! The request pipeline (C4): acquire a context, run the global and then
//! route middleware chains, look the route up in between, serialize
//! whatever the chain left staged, and release the context. Kept as its
//! own module (rather than folded into route lookup) since `Context`
//! acquisition/release now bookends every request, including the
//! early-return path for a WebSocket upgrade.

use crate::middleware::Next;
use crate::router::{Lookup, Router};
use crate::{Context, Endpoint, LoomError, Request, Response};
use std::pin::Pin;

/// Runs a single request through the pipeline and returns the response to
/// hand back to the transport. The acquired [`Context`] is released back
/// to its pool on every path out of this function, including the ones
/// that return early for a WebSocket upgrade.
pub(crate) async fn dispatch(router: &Router, request: Request) -> Result<Response, anyhow::Error> {
    let mut ctx = router.pool().acquire(request);

    if let Some(response) = crate::ws::try_upgrade(router, &mut ctx).await {
        router.pool().release(ctx);
        return Ok(response);
    }

    let outcome = run_with_timeout(router, &mut ctx).await;
    if let Err(error) = outcome {
        let handled = router
            .exception_filter()
            .map(|filter| filter(&mut ctx, &error))
            .unwrap_or(false);
        if !handled {
            default_error_response(&mut ctx, &error);
        }
    }

    ensure_default_body(&mut ctx);
    let response = ctx.take_response();
    router.pool().release(ctx);
    Ok(response)
}

async fn run_with_timeout(router: &Router, ctx: &mut Context) -> Result<(), anyhow::Error> {
    match router.request_timeout() {
        Some(duration) => match tokio::time::timeout(duration, run(router, ctx)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(LoomError::Timeout.into()),
        },
        None => run(router, ctx).await,
    }
}

async fn run(router: &Router, ctx: &mut Context) -> Result<(), anyhow::Error> {
    let method = ctx.method().clone();
    let path = ctx.path().to_owned();
    let lookup_endpoint = RouterLookup { router, method, path };
    let next = Next::new(router.global_middleware(), Pin::new(&lookup_endpoint));
    next.apply(ctx).await
}

/// The terminal step of the global middleware chain: looks the route up,
/// binds params, then runs the route's own middleware chain terminating
/// in the handler.
struct RouterLookup<'a> {
    router: &'a Router,
    method: http::Method,
    path: String,
}

#[async_trait::async_trait]
impl Endpoint for RouterLookup<'_> {
    async fn apply(&self, ctx: &mut Context) -> Result<(), anyhow::Error> {
        match self.router.find(&self.method, &self.path) {
            Lookup::Matched { route, params } => {
                ctx.bind_params(params);
                let next = Next::new(&route.middleware, route.endpoint.as_ref());
                next.apply(ctx).await
            }
            Lookup::MethodNotAllowed(methods) => {
                write_method_not_allowed(ctx, &methods);
                Ok(())
            }
            Lookup::NotFound => {
                if let Some(fallback) = self.router.fallback_endpoint() {
                    fallback.apply(ctx).await
                } else {
                    write_not_found(ctx);
                    Ok(())
                }
            }
        }
    }
}

fn write_not_found(ctx: &mut Context) {
    if !ctx.is_ended() {
        let id = ctx.id().to_owned();
        let _ = ctx.res_json(&error_body("NotFound", "not found", &id));
        ctx.res_status(http::StatusCode::NOT_FOUND);
    }
}

fn write_method_not_allowed(ctx: &mut Context, methods: &[http::Method]) {
    if ctx.is_ended() {
        return;
    }
    let id = ctx.id().to_owned();
    let _ = ctx.res_json(&error_body("MethodNotAllowed", "method not allowed", &id));
    ctx.res_status(http::StatusCode::METHOD_NOT_ALLOWED);
    let allow = methods
        .iter()
        .map(http::Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let _ = ctx.res_set_header(http::header::ALLOW, allow);
}

fn default_error_response(ctx: &mut Context, error: &anyhow::Error) {
    log::error!("{} unhandled error: {:#}", ctx.id(), error);

    let status = error
        .downcast_ref::<LoomError>()
        .map(|kind| match kind {
            LoomError::Timeout => http::StatusCode::REQUEST_TIMEOUT,
            LoomError::PayloadTooLarge => http::StatusCode::PAYLOAD_TOO_LARGE,
            _ => http::StatusCode::INTERNAL_SERVER_ERROR,
        })
        .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);

    let id = ctx.id().to_owned();
    let _ = ctx.res_json(&error_body("Internal", &error.to_string(), &id));
    ctx.res_status(status);
}

/// Ensures the chain left a response behind; a handler that ran to
/// completion without ever staging a body still needs a default - treated
/// the same as a routing miss.
fn ensure_default_body(ctx: &mut Context) {
    if !ctx.is_ended() {
        write_not_found(ctx);
    }
}

fn error_body(code: &str, message: &str, correlation_id: &str) -> serde_json::Value {
    serde_json::json!({
        "error": { "message": message, "code": code },
        "correlationId": correlation_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Router;

    #[tokio::test]
    async fn not_found_renders_404_json() {
        let router = Router::default();
        let response = dispatch(&router, Request::get("/missing").unwrap()).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn handler_error_renders_500() {
        let mut router = Router::default();
        router
            .at("/boom")
            .get(|_ctx: &mut Context| async move { Err(anyhow::anyhow!("kaboom")) });
        let response = dispatch(&router, Request::get("/boom").unwrap()).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn next_called_twice_fails_the_request() {
        use crate::middleware::Middleware;

        #[derive(Debug)]
        struct DoubleCall;

        #[async_trait::async_trait]
        impl Middleware for DoubleCall {
            async fn apply(&self, ctx: &mut Context, next: Next<'_>) -> Result<(), anyhow::Error> {
                next.apply(ctx).await?;
                next.apply(ctx).await
            }
        }

        let mut router = Router::default();
        router.with(DoubleCall);
        router.at("/x").get(crate::endpoint::simple(|ctx| ctx.res_text("ok")));
        let response = dispatch(&router, Request::get("/x").unwrap()).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
