use std::convert::TryFrom;

macro_rules! forward {
    () => {};
    (
        $(#[$m:meta])* $v:vis fn $name:ident(&self $(, $pn:ident: $pt:ty)*) -> $ret:ty;
        $($tail:tt)*
    ) => {
        $(#[$m])* $v fn $name(&self $(, $pn: $pt)*) -> $ret {
            (self.0).$name($($pn),*)
        }

        forward! { $($tail)* }
    };

    (
        $(#[$m:meta])* $v:vis fn $name:ident(&mut self $(, $pn:ident: $pt:ty)*) -> $ret:ty;
        $($tail:tt)*
    ) => {
        $(#[$m])* $v fn $name(&mut self $(, $pn: $pt)*) -> $ret {
            (self.0).$name($($pn),*)
        }

        forward! { $($tail)* }
    }
}

macro_rules! construct {
    () => {};
    ($($(#[$m:meta])* $v:vis fn $method:ident = $action:expr;)+) => {
        $($(#[$m])* $v fn $method<U>(uri: U) -> Result<Self, http::Error>
        where
            http::Uri: TryFrom<U>,
            <http::Uri as TryFrom<U>>::Error: Into<http::Error>
        {
            http::request::Builder::new()
                .method($action)
                .uri(uri)
                .body(hyper::Body::empty())
                .map(Request)
        })+
    };
}

#[derive(Debug)]
/// The raw HTTP request half of an exchange.
///
/// This is a thin wrapper over [`http::Request<hyper::Body>`]; application
/// code does not usually touch this directly - it reads from
/// [`crate::Context`] instead, which owns one of these and exposes the
/// pieces the pipeline actually needs (method, path, query, headers,
/// params).
pub struct Request(http::Request<hyper::Body>);

impl Request {
    construct! {
        /// Creates a new request initialized with the GET method.
        pub fn get = http::Method::GET;
        /// Creates a new request initialized with the POST method.
        pub fn post = http::Method::POST;
        /// Creates a new request initialized with the PUT method.
        pub fn put = http::Method::PUT;
        /// Creates a new request initialized with the DELETE method.
        pub fn delete = http::Method::DELETE;
        /// Creates a new request initialized with the PATCH method.
        pub fn patch = http::Method::PATCH;
        /// Creates a new request initialized with the HEAD method.
        pub fn head = http::Method::HEAD;
        /// Creates a new request initialized with the OPTIONS method.
        pub fn options = http::Method::OPTIONS;
    }

    /// Creates a new request initialized with the given method and URI.
    ///
    /// # Errors
    /// Fails if the URI cannot be converted, or if the underlying request
    /// cannot be constructed.
    pub fn from_method<U>(uri: U, method: http::Method) -> Result<Self, http::Error>
    where
        http::Uri: TryFrom<U>,
        <http::Uri as TryFrom<U>>::Error: Into<http::Error>,
    {
        http::request::Builder::new()
            .method(method)
            .uri(uri)
            .body(hyper::Body::empty())
            .map(Request)
    }

    /// Attempts to load the peer address of the request. This is only
    /// available if the request was routed through the hyper service stack
    /// (i.e. originating from [`crate::Router::listen`]).
    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        self.ext::<PeerAddress>().map(|a| a.0)
    }

    /// Sets the peer address on this request. Useful for tests that exercise
    /// the pipeline via [`crate::Router::handle`] without binding a socket.
    #[must_use]
    pub fn with_peer_addr(mut self, addr: std::net::SocketAddr) -> Self {
        self.extensions_mut().insert(PeerAddress(addr));
        self
    }

    /// Returns a mutable reference to the underlying [`http::Request`].
    /// Used by the WebSocket plugin to pull the `OnUpgrade` future out of
    /// the request via `hyper::upgrade::on` without consuming it, so the
    /// request can still be handed to the connection's handler afterward.
    pub(crate) fn raw_mut(&mut self) -> &mut http::Request<hyper::Body> {
        &mut self.0
    }

    forward! {
        /// Returns a reference to the associated URI.
        #[inline]
        pub fn uri(&self) -> &http::Uri;
        /// Returns a reference to the associated HTTP method.
        #[inline]
        pub fn method(&self) -> &http::Method;
        /// Returns a reference to the associated extensions.
        #[inline]
        pub fn extensions(&self) -> &http::Extensions;
        /// Returns a mutable reference to the associated extensions.
        #[inline]
        pub fn extensions_mut(&mut self) -> &mut http::Extensions;
    }
}

#[derive(Debug, Copy, Clone)]
pub(crate) struct PeerAddress(pub(crate) std::net::SocketAddr);

impl crate::HttpEntity for Request {
    #[inline]
    fn body_mut(&mut self) -> &mut hyper::Body {
        self.0.body_mut()
    }
}

impl crate::HasHeaders for Request {
    #[inline]
    fn headers(&self) -> &http::HeaderMap {
        self.0.headers()
    }

    #[inline]
    fn headers_mut(&mut self) -> &mut http::HeaderMap {
        self.0.headers_mut()
    }
}

impl From<http::Request<hyper::Body>> for Request {
    fn from(r: http::Request<hyper::Body>) -> Self {
        Request(r)
    }
}

impl From<Request> for http::Request<hyper::Body> {
    fn from(r: Request) -> Self {
        r.0
    }
}

has_extensions!(Request);
