//! The `hyper`/`tower` glue that turns a built [`Router`] into a listening
//! server - grounded directly in the teacher's own `router::service`
//! (`Server::bind`/`make_service_fn`/`with_graceful_shutdown`, a thin
//! `tower::Service` wrapper that stamps the peer address into the request's
//! extensions before dispatch). The route-pattern trace line the teacher
//! logs via `pattern.regex()` has no equivalent here (this router has no
//! regex backing), so it's dropped in favor of the radix route's raw path.

use super::Router;
use crate::request::PeerAddress;
use crate::LoomError;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

impl Router {
    /// Prepares the router and binds it to `address`, serving requests
    /// until the channel returned by [`Router::termination_signal`] (if
    /// any) signals `true`.
    ///
    /// # Errors
    /// Fails if `address` doesn't parse as a socket address, or if `hyper`
    /// cannot bind/serve on it.
    ///
    /// # Examples
    /// ```rust,no_run
    /// # use loomweb::*;
    /// # #[tokio::main] async fn main() -> Result<(), anyhow::Error> {
    /// let mut http = loomweb::http();
    /// http.at("/").get(|ctx: &mut Context| async move { ctx.res_text("hello, world!"); Ok(()) });
    /// http.listen("0.0.0.0:8080").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn listen(mut self, address: &str) -> Result<(), LoomError> {
        let address: SocketAddr = address
            .parse()
            .map_err(|_| LoomError::InvalidAddress(address.to_owned()))?;
        self.prepare();

        log::info!("listen({address})");

        if log::log_enabled!(log::Level::Trace) {
            for route in self.routes() {
                log::trace!(
                    "route: {} {}",
                    route.method.as_ref().map_or("(all)", http::Method::as_str),
                    route.path,
                );
            }
        }

        let termination = self.terminate.take();
        let termination = async move {
            match termination {
                Some(mut rx) => loop {
                    if *rx.borrow() {
                        break;
                    }
                    match rx.changed().await {
                        Ok(()) => continue,
                        Err(_) => futures::future::pending().await,
                    }
                },
                None => futures::future::pending().await,
            }
        };

        let this = Arc::new(self);

        hyper::server::Server::bind(&address)
            .serve(hyper::service::make_service_fn(|connection: &hyper::server::conn::AddrStream| {
                let router = this.clone();
                let service = RouterService(router, connection.remote_addr());
                async move { Ok::<_, std::convert::Infallible>(service) }
            }))
            .with_graceful_shutdown(termination)
            .await
            .map_err(LoomError::HyperServer)?;

        Ok(())
    }
}

#[derive(Clone)]
struct RouterService(Arc<Router>, SocketAddr);

type RouterFuture<R, E> = Pin<Box<dyn Future<Output = Result<R, E>> + Send + 'static>>;

impl tower::Service<hyper::Request<hyper::Body>> for RouterService {
    type Response = hyper::Response<hyper::Body>;
    type Error = anyhow::Error;
    type Future = RouterFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut request: hyper::Request<hyper::Body>) -> Self::Future {
        let router = self.0.clone();
        request.extensions_mut().insert(PeerAddress(self.1));
        Box::pin(async move { router.handle(request.into()).await.map(Into::into) })
    }
}
