#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
/// Errors generated specifically by this library, distinct from errors
/// surfaced by user middleware or endpoints (which travel as
/// `anyhow::Error`).
pub enum LoomError {
    #[error("could not parse the given string ({:?}) as an address", .0)]
    /// Generated when attempting to parse an address (during
    /// [`crate::Router::listen`]), but the address was invalid.
    InvalidAddress(String),

    #[error("could not serve server")]
    /// Generated when attempting to bind and listen using hyper, but it
    /// failed for some underlying reason.
    HyperServer(#[source] hyper::Error),

    #[error("route pattern {:?} is invalid: {1}", .0)]
    /// Generated when a route pattern fails to parse - an empty segment,
    /// a wildcard that isn't the last segment, or a bare `:` with no name.
    InvalidPattern(String, &'static str),

    #[error("a route already exists for {0} {1}")]
    /// Generated when registering a route whose `(method, normalized
    /// pattern)` pair already exists in the router.
    DuplicateRoute(String, String),

    #[error("the router has reached its maximum of {0} routes")]
    /// Generated when registering a route would exceed the router's
    /// configured maximum route count.
    Capacity(usize),

    #[error("middleware called next() twice in the same request")]
    /// Generated when a middleware invokes its `next` more than once in
    /// the same frame.
    NextCalledTwice,

    #[error("the request exceeded its deadline")]
    /// Generated when a request's configured timeout elapses before the
    /// chain completes.
    Timeout,

    #[error("the websocket handshake failed: {0}")]
    /// Generated when an incoming upgrade request fails RFC 6455
    /// validation, origin checks, or `verify_client`.
    BadHandshake(&'static str),

    #[error("the websocket message exceeded the configured size limit")]
    /// Generated when a received frame's payload would exceed
    /// `max_message_size`; the connection is closed with code 1009.
    PayloadTooLarge,

    #[error("could not read the body of a request or response")]
    /// Generated when attempting to read the body of a request, and
    /// failing.
    ReadBody(#[source] std::io::Error),
}
