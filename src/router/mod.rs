//! The radix router (C1).
//!
//! Matches requests with a genuine radix tree of static/param/wildcard
//! children, fronted by a bounded lookup cache, and exposes the route
//! builder through `Router::at`, `Path`, `Router::with`, `Router::fallback`,
//! `Router::prepare`, `Router::listen`, and `Router::handle`.

mod cache;
mod node;
pub(crate) mod pattern;
pub(crate) mod route;
mod service;

pub(crate) use self::cache::{CachedLookup, RouteCache};
pub(crate) use self::node::{Lookup, Node};
pub(crate) use self::pattern::Pattern;
pub use self::route::Path;
pub(crate) use self::route::{Route, RouteSink};

use crate::middleware::Middleware;
use crate::ws::WsRegistry;
use crate::{Context, ContextPool, Endpoint, LoomError, Request, Response};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

/// Construction-time options for a [`Router`] - explicit, typed
/// configuration rather than a generic config-loading layer.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Whether route patterns and lookup paths are matched case-sensitively.
    pub case_sensitive: bool,
    /// Maximum number of registered routes before `register` fails with
    /// [`LoomError::Capacity`].
    pub max_routes: usize,
    /// Bounded lookup-cache capacity; see [`RouteCache`].
    pub cache_capacity: usize,
    /// Bounded [`ContextPool`] capacity.
    pub context_pool_capacity: usize,
    /// If set, a request whose pipeline hasn't finished within this
    /// duration fails with [`LoomError::Timeout`] (rendered as a 408).
    pub request_timeout: Option<std::time::Duration>,
}

impl Default for RouterOptions {
    fn default() -> Self {
        RouterOptions {
            case_sensitive: true,
            max_routes: 10_000,
            cache_capacity: RouteCache::DEFAULT_CAPACITY,
            context_pool_capacity: ContextPool::DEFAULT_CAPACITY,
            request_timeout: None,
        }
    }
}

struct Tree {
    root: Node,
    cache: RouteCache,
    routes: Vec<Arc<Route>>,
}

/// A single optional hook invoked when an error escapes the middleware/
/// handler chain, which may write a response, falling back to the
/// orchestrator's default 500 if it doesn't.
pub type ExceptionFilter = dyn Fn(&mut Context, &anyhow::Error) -> bool + Send + Sync;

/// An HTTP application: a radix-tree-backed set of routes, a global
/// middleware chain, an optional fallback endpoint, a pooled [`Context`]
/// allocator, and (if any routes were registered via [`Router::ws`]) a
/// WebSocket upgrade table.
pub struct Router {
    options: RouterOptions,
    tree: RwLock<Tree>,
    middleware: Vec<Arc<dyn Middleware>>,
    fallback: Option<Pin<Box<dyn Endpoint>>>,
    pool: ContextPool,
    exception_filter: Option<Box<ExceptionFilter>>,
    ws: WsRegistry,
    terminate: Option<watch::Receiver<bool>>,
}

impl Default for Router {
    fn default() -> Self {
        Router::new(RouterOptions::default())
    }
}

impl Router {
    /// Creates a router with the given options.
    pub fn new(options: RouterOptions) -> Self {
        Router {
            pool: ContextPool::new(options.context_pool_capacity),
            tree: RwLock::new(Tree {
                root: Node::default(),
                cache: RouteCache::new(options.cache_capacity),
                routes: Vec::new(),
            }),
            middleware: Vec::new(),
            fallback: None,
            exception_filter: None,
            ws: WsRegistry::default(),
            terminate: None,
            options,
        }
    }

    /// Whether this router matches routes case-sensitively.
    pub(crate) fn case_sensitive(&self) -> bool {
        self.options.case_sensitive
    }

    /// Creates a [`Path`] at the provided prefix. See [`Path::at`].
    pub fn at<P: AsRef<str>>(&mut self, prefix: P) -> Path<'_> {
        Path::new(join_paths("", prefix.as_ref()), self)
    }

    /// Creates a [`Path`] at the provided prefix, and runs `build` against
    /// it. See [`Path::under`].
    pub fn under<P: AsRef<str>, F: FnOnce(&mut Path<'_>)>(&mut self, prefix: P, build: F) -> &mut Self {
        let mut path = Path::new(join_paths("", prefix.as_ref()), self);
        build(&mut path);
        self
    }

    /// Appends global middleware, run (in registration order) before any
    /// route lookup.
    pub fn with<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Sets a fallback endpoint, used when no route matches and the
    /// default 404 shouldn't fire.
    pub fn fallback<E: Endpoint>(&mut self, endpoint: E) -> &mut Self {
        self.fallback = Some(Box::pin(endpoint));
        self
    }

    /// Installs the single global exception filter. Returning `true` from
    /// `filter` means it wrote a response; `false` defers to the
    /// orchestrator's default 500.
    pub fn on_error<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(&mut Context, &anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.exception_filter = Some(Box::new(filter));
        self
    }

    pub(crate) fn exception_filter(&self) -> Option<&ExceptionFilter> {
        self.exception_filter.as_deref()
    }

    pub(crate) fn fallback_endpoint(&self) -> Option<Pin<&dyn Endpoint>> {
        self.fallback.as_ref().map(|e| e.as_ref())
    }

    pub(crate) fn global_middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }

    pub(crate) fn pool(&self) -> &ContextPool {
        &self.pool
    }

    pub(crate) fn request_timeout(&self) -> Option<std::time::Duration> {
        self.options.request_timeout
    }

    pub(crate) fn ws(&self) -> &WsRegistry {
        &self.ws
    }

    pub(crate) fn ws_mut(&mut self) -> &mut WsRegistry {
        &mut self.ws
    }

    /// Sets the options used by every WebSocket route registered on this
    /// router - heartbeat/pong timing, `maxMessageSize`, `maxConnections`,
    /// origin allowlist, and `verifyClient`.
    pub fn ws_options(&mut self, options: crate::ws::WsOptions) -> &mut Self {
        self.ws.set_options(options);
        self
    }

    /// Registers a WebSocket route at `path`. `path` may
    /// end in a bare `*` segment to match any suffix, the same wildcard
    /// convention [`Path`] uses for HTTP routes. `handler` runs once per
    /// accepted connection, receiving a [`crate::ws::WsConnectionHandle`]
    /// and the original upgrade [`Request`].
    pub fn ws<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(crate::ws::WsConnectionHandle, Request) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.ws.register(path, None, handler);
        self
    }

    /// Like [`Router::ws`], but every accepted connection auto-joins `room`
    /// before the handler runs.
    pub fn ws_in_room<F, Fut>(&mut self, path: &str, room: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(crate::ws::WsConnectionHandle, Request) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.ws.register(path, Some(room.into()), handler);
        self
    }

    /// Enumerates all registered routes.
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.tree.read().unwrap_or_else(std::sync::PoisonError::into_inner).routes.clone()
    }

    /// Drops all registered routes and invalidates the cache.
    pub fn clear(&self) {
        let mut tree = self.tree.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        tree.root = Node::default();
        tree.cache.clear();
        tree.routes.clear();
    }

    /// Prepares the router for serving. This exists for parity with the
    /// teacher's `Router::prepare` (which compiled the `RegexSet` here);
    /// the radix tree is already live after each `register`, so this only
    /// clears any stale cache entries left over from route changes made
    /// without going through [`Path`] (tests rebuilding a router, mostly).
    pub fn prepare(&mut self) {
        self.tree.get_mut().unwrap_or_else(std::sync::PoisonError::into_inner).cache.clear();
    }

    /// A channel to request graceful shutdown of [`Router::listen`].
    pub fn termination_signal(&mut self) -> watch::Sender<bool> {
        let (tx, rx) = watch::channel(false);
        self.terminate = Some(rx);
        tx
    }

    /// Handles a single request against this router, without binding a
    /// socket - runs the same pipeline [`Router::listen`] would.
    pub async fn handle(&self, request: Request) -> Result<Response, anyhow::Error> {
        crate::orchestrator::dispatch(self, request).await
    }

    pub(crate) fn find(&self, method: &http::Method, path: &str) -> Lookup {
        let segments = Pattern::split_path(path, self.options.case_sensitive);
        let cache_path: Box<str> = if self.options.case_sensitive {
            Box::from(path)
        } else {
            Box::from(path.to_lowercase())
        };

        {
            let tree = self.tree.read().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(cached) = tree.cache.get(method, &cache_path) {
                return cached_to_lookup(cached);
            }
        }

        let mut tree = self.tree.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        // Re-check under the write lock: another task may have populated
        // the cache between our read-unlock and this write-lock.
        if let Some(cached) = tree.cache.get(method, &cache_path) {
            return cached_to_lookup(cached);
        }

        let lookup = tree.root.find(&segments, method);
        let cached = CachedLookup::from(&lookup);
        tree.cache.insert(method.clone(), cache_path, cached);
        lookup
    }
}

fn cached_to_lookup(cached: &CachedLookup) -> Lookup {
    match cached {
        CachedLookup::Matched { route, params } => Lookup::Matched {
            route: route.clone(),
            params: params.clone(),
        },
        CachedLookup::MethodNotAllowed(methods) => Lookup::MethodNotAllowed(methods.clone()),
        CachedLookup::NotFound => Lookup::NotFound,
    }
}

impl RouteSink for Router {
    fn insert(&mut self, route: Route) -> Result<(), LoomError> {
        let max_routes = self.options.max_routes;
        let tree = self.tree.get_mut().unwrap_or_else(std::sync::PoisonError::into_inner);
        if tree.routes.len() >= max_routes {
            return Err(LoomError::Capacity(max_routes));
        }

        let segments = route.pattern.segments.clone();
        let route = Arc::new(route);
        tree.root.insert(&segments, route.clone()).map_err(|_| {
            LoomError::DuplicateRoute(
                route.method.as_ref().map_or_else(|| "*".to_owned(), ToString::to_string),
                route.path.to_string(),
            )
        })?;
        tree.routes.push(route);
        tree.cache.clear();
        Ok(())
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let routes = self.tree.read().map(|t| t.routes.len()).unwrap_or(0);
        f.debug_struct("Router")
            .field("routes", &routes)
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

// Base *MUST* be either `""` or start with `"/"`.
fn join_paths(base: &str, extend: &str) -> String {
    let mut buffer = String::with_capacity(base.len() + extend.len());
    buffer.push_str(base);

    match (base.ends_with('/'), extend.starts_with('/')) {
        (true, true) => buffer.push_str(&extend[1..]),
        (false, true) | (true, false) => buffer.push_str(extend),
        (false, false) => {
            buffer.push('/');
            buffer.push_str(extend);
        }
    }

    buffer.shrink_to_fit();
    buffer
}

#[cfg(test)]
mod test {
    use super::*;

    fn simple_router() -> Router {
        let mut router = Router::default();
        router.at("/").get(crate::endpoint::simple(|ctx| ctx.res_status(http::StatusCode::NO_CONTENT)));
        router.at("/alpha").get(crate::endpoint::simple(|ctx| ctx.res_status(http::StatusCode::NO_CONTENT)));
        router.at("/beta/:id").get(crate::endpoint::simple(|ctx| ctx.res_status(http::StatusCode::NO_CONTENT)));
        router.at("/gamma/*").get(crate::endpoint::simple(|ctx| ctx.res_status(http::StatusCode::NO_CONTENT)));
        router
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("", "/id"), "/id");
        assert_eq!(join_paths("", "id"), "/id");
        assert_eq!(join_paths("/user", "/id"), "/user/id");
        assert_eq!(join_paths("/user/", "/id"), "/user/id");
        assert_eq!(join_paths("/user/", "id"), "/user/id");
    }

    #[test]
    fn test_build() {
        simple_router();
    }

    #[tokio::test]
    async fn test_basic_match() {
        let router = simple_router();
        let response = router.handle(Request::get("/").unwrap()).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_simple_match() {
        let router = simple_router();
        let response = router.handle(Request::get("/beta/4444").unwrap()).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_multi_match() {
        let router = simple_router();
        let response = router.handle(Request::get("/gamma/a/b/c").unwrap()).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_missing_match() {
        let router = simple_router();
        let response = router.handle(Request::get("/omega/aaa").unwrap()).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_correct_method() {
        let router = simple_router();
        let response = router.handle(Request::post("/alpha").unwrap()).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.header(http::header::ALLOW).is_some());
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut router = Router::default();
        router.at("/x").get(crate::endpoint::simple(|_| {}));
        let result = router
            .at("/x")
            .try_method(http::Method::GET, crate::endpoint::simple(|_| {}));
        assert!(result.is_err());
    }
}
