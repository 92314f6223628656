use super::pattern::Pattern;
use crate::middleware::Middleware;
use crate::Endpoint;
use std::pin::Pin;
use std::sync::Arc;

/// A single registered route: the method/pattern it was registered under,
/// the middleware chain scoped to it via [`Path::with`], and the terminal
/// endpoint. Matching is done against a radix [`Pattern`] rather than a
/// regex, and each route carries its own middleware list rather than
/// relying solely on the router's globals.
pub(crate) struct Route {
    pub(crate) path: Box<str>,
    pub(crate) pattern: Pattern,
    pub(crate) method: Option<http::Method>,
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
    pub(crate) endpoint: Pin<Box<dyn Endpoint>>,
}

impl Route {
    #[cfg(test)]
    pub(crate) fn for_test(method: Option<http::Method>, pattern: Pattern) -> Self {
        Route {
            path: pattern.raw.clone(),
            pattern,
            method,
            middleware: Vec::new(),
            endpoint: Box::pin(crate::endpoint::simple(|ctx| ctx.res_status(http::StatusCode::NO_CONTENT))),
        }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("method", &self.method)
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

/// Something that can accept a freshly-built [`Route`] - implemented by
/// [`crate::Router`] so that [`Path`] doesn't need to borrow the router's
/// internal tree/cache/routes fields directly (which would otherwise fight
/// the borrow checker across `Path::at`'s chained, re-borrowing returns).
pub(crate) trait RouteSink {
    fn insert(&mut self, route: Route) -> Result<(), crate::LoomError>;
}

macro_rules! method {
    ($($(#[$m:meta])* $v:vis fn $n:ident = $meth:expr;)+) => {
        $(
            $(#[$m])* $v fn $n<E: Endpoint>(&mut self, endpoint: E) -> &mut Self {
                self.method($meth, endpoint)
            }
        )+
    };
}

/// A path prefix under construction, returned by [`crate::Router::at`] and
/// [`crate::Router::under`]. Accumulates middleware via [`Path::with`] and
/// registers one [`Route`] per method verb called on it.
pub struct Path<'a> {
    prefix: String,
    sink: &'a mut dyn RouteSink,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl<'a> Path<'a> {
    pub(crate) fn new(prefix: impl Into<String>, sink: &'a mut dyn RouteSink) -> Self {
        Path {
            prefix: prefix.into(),
            sink,
            middleware: Vec::new(),
        }
    }

    /// Appends to the prefix, returning a new [`Path`] scoped to it. The
    /// prefix is expected to never be terminated with a forward slash, but
    /// always prefixed with one - [`join_paths`](super::join_paths) enforces
    /// this regardless of what the caller passes.
    pub fn at<P: AsRef<str>>(&mut self, path: P) -> Path<'_> {
        Path::new(super::join_paths(&self.prefix, path.as_ref()), self.sink)
    }

    /// Like [`Path::at`], but immediately hands the nested [`Path`] to `f`.
    pub fn under<P: AsRef<str>, F: FnOnce(&mut Path<'_>)>(&mut self, path: P, f: F) -> &mut Self {
        let mut base = self.at(path);
        f(&mut base);
        self
    }

    /// Adds `middleware` to every route registered on this [`Path`] from
    /// this point on - route-scoped middleware, composed by the
    /// orchestrator after the router's global middleware and before the
    /// handler.
    #[must_use]
    pub fn with<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    fn push<E: Endpoint>(&mut self, method: Option<http::Method>, endpoint: E) -> Result<(), crate::LoomError> {
        let pattern = Pattern::parse(&self.prefix, true)
            .map_err(|reason| crate::LoomError::InvalidPattern(self.prefix.clone(), reason))?;
        let route = Route {
            path: self.prefix.clone().into_boxed_str(),
            pattern,
            method,
            middleware: self.middleware.clone(),
            endpoint: Box::pin(endpoint),
        };
        self.sink.insert(route)
    }

    /// Registers `endpoint` for every HTTP method at the current prefix.
    ///
    /// # Panics
    /// Panics if the accumulated pattern is invalid or the route is a
    /// duplicate - use [`Path::try_all`] to handle the failure instead.
    pub fn all<E: Endpoint>(&mut self, endpoint: E) -> &mut Self {
        self.push(None, endpoint).expect("route registration failed");
        self
    }

    /// Fallible form of [`Path::all`].
    pub fn try_all<E: Endpoint>(&mut self, endpoint: E) -> Result<&mut Self, crate::LoomError> {
        self.push(None, endpoint)?;
        Ok(self)
    }

    /// Registers `endpoint` for the given method at the current prefix.
    ///
    /// # Panics
    /// Panics if the accumulated pattern is invalid or the route is a
    /// duplicate - use [`Path::try_method`] to handle the failure instead.
    pub fn method<E: Endpoint>(&mut self, method: http::Method, endpoint: E) -> &mut Self {
        self.push(Some(method), endpoint).expect("route registration failed");
        self
    }

    /// Fallible form of [`Path::method`].
    pub fn try_method<E: Endpoint>(
        &mut self,
        method: http::Method,
        endpoint: E,
    ) -> Result<&mut Self, crate::LoomError> {
        self.push(Some(method), endpoint)?;
        Ok(self)
    }

    method! {
        /// Registers a GET endpoint at the current prefix.
        pub fn get = http::Method::GET;
        /// Registers a POST endpoint at the current prefix.
        pub fn post = http::Method::POST;
        /// Registers a PUT endpoint at the current prefix.
        pub fn put = http::Method::PUT;
        /// Registers a DELETE endpoint at the current prefix.
        pub fn delete = http::Method::DELETE;
        /// Registers a HEAD endpoint at the current prefix.
        pub fn head = http::Method::HEAD;
        /// Registers a PATCH endpoint at the current prefix.
        pub fn patch = http::Method::PATCH;
        /// Registers an OPTIONS endpoint at the current prefix.
        pub fn options = http::Method::OPTIONS;
    }
}
