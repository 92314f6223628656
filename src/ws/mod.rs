//! The WebSocket plugin (C6): RFC 6455 handshake validation and framing,
//! connection lifecycle, and room broadcast.
//!
//! [`try_upgrade`] follows an "intercept before normal response
//! serialization and take over the connection" shape: it runs ahead of the
//! orchestrator's usual middleware/router dispatch, the same place a
//! server-sent-events upgrade would sit.

mod connection;
mod frame;
mod handshake;
mod room;

pub(crate) use self::room::RoomIndex;

use crate::{Context, HasHeaders, Request};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A text or binary message delivered to a [`WsConnectionHandle`], in
/// arrival order - messages for a given connection are always delivered
/// in the order the frames arrived on the wire.
#[derive(Debug, Clone)]
pub enum WsMessage {
    /// A `0x1` text frame's payload, already validated as a complete frame.
    Text(String),
    /// A `0x2` binary frame's payload.
    Binary(Vec<u8>),
}

/// Construction-time options for the WebSocket plugin, in the same style as
/// [`crate::RouterOptions`] - explicit, typed, with a `Default` impl rather
/// than a generic config-loading layer.
#[derive(Clone)]
pub struct WsOptions {
    /// Interval between server-initiated pings.
    pub heartbeat_interval: Duration,
    /// How long to wait for a pong before closing with code 1006.
    pub pong_timeout: Duration,
    /// Maximum decoded frame payload size in bytes; violation closes with
    /// code 1009 (message too big).
    pub max_message_size: usize,
    /// Maximum number of simultaneously open WS connections across every
    /// registered route; beyond this, upgrades are rejected with 503.
    pub max_connections: usize,
    /// If non-empty, only these exact `Origin` header values are accepted;
    /// any other origin is rejected with 403. Empty means no restriction.
    ///
    /// Only exact `Origin` strings are supported, not patterns - see
    /// DESIGN.md for why a regex dependency isn't pulled in solely for
    /// this allowlist.
    pub allowed_origins: Vec<String>,
    /// An optional synchronous predicate run over the upgrade request;
    /// returning `false` rejects the upgrade with 401.
    pub verify_client: Option<Arc<dyn Fn(&Request) -> bool + Send + Sync>>,
}

impl std::fmt::Debug for WsOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsOptions")
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("pong_timeout", &self.pong_timeout)
            .field("max_message_size", &self.max_message_size)
            .field("max_connections", &self.max_connections)
            .field("allowed_origins", &self.allowed_origins)
            .field("verify_client", &self.verify_client.is_some())
            .finish()
    }
}

impl Default for WsOptions {
    fn default() -> Self {
        WsOptions {
            heartbeat_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
            max_message_size: 1 << 20,
            max_connections: 10_000,
            allowed_origins: Vec::new(),
            verify_client: None,
        }
    }
}

type BoxHandlerFuture = std::pin::Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + 'static>>;
type WsHandlerFn = dyn Fn(WsConnectionHandle, Request) -> BoxHandlerFuture + Send + Sync + 'static;

struct WsRoute {
    /// Segments as registered - `wildcard` means "match this prefix and
    /// anything under it", set when the registered path ends in a `*`
    /// suffix.
    segments: Vec<String>,
    wildcard: bool,
    auto_join: Option<Box<str>>,
    handler: Arc<WsHandlerFn>,
}

impl WsRoute {
    fn matches(&self, path: &str) -> bool {
        let segments: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        if self.wildcard {
            segments.len() >= self.segments.len()
                && segments.iter().zip(self.segments.iter()).all(|(a, b)| *a == b.as_str())
        } else {
            segments.len() == self.segments.len()
                && segments.iter().zip(self.segments.iter()).all(|(a, b)| *a == b.as_str())
        }
    }
}

/// The set of registered WebSocket routes plus the process-local room index
/// and live-connection bookkeeping shared across all of them, scoped to one
/// [`crate::Router`].
pub(crate) struct WsRegistry {
    routes: Vec<WsRoute>,
    rooms: Arc<RoomIndex>,
    options: WsOptions,
    connections: Arc<AtomicUsize>,
}

impl Default for WsRegistry {
    fn default() -> Self {
        WsRegistry {
            routes: Vec::new(),
            rooms: Arc::new(RoomIndex::default()),
            options: WsOptions::default(),
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl WsRegistry {
    pub(crate) fn set_options(&mut self, options: WsOptions) {
        self.options = options;
    }

    pub(crate) fn register<F, Fut>(&mut self, path: &str, auto_join: Option<String>, handler: F)
    where
        F: Fn(WsConnectionHandle, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let trimmed = path.trim_matches('/');
        let wildcard = trimmed.ends_with('*');
        let body = if wildcard {
            trimmed.trim_end_matches('*').trim_end_matches('/')
        } else {
            trimmed
        };
        let segments = body.split('/').filter(|s| !s.is_empty()).map(str::to_owned).collect();
        let handler: Arc<WsHandlerFn> = Arc::new(move |conn: WsConnectionHandle, req: Request| {
            Box::pin(handler(conn, req)) as BoxHandlerFuture
        });
        self.routes.push(WsRoute {
            segments,
            wildcard,
            auto_join: auto_join.map(String::into_boxed_str),
            handler,
        });
    }

    fn find(&self, path: &str) -> Option<(Arc<WsHandlerFn>, Option<Box<str>>)> {
        self.routes
            .iter()
            .find(|route| route.matches(path))
            .map(|route| (route.handler.clone(), route.auto_join.clone()))
    }
}

/// A handle given to a registered WS handler on accept: the write/meta side
/// ([`Arc<connection::WsConnection>`]) plus the connection's private inbox
/// of decoded messages. Exactly one task reads the socket (the reader loop
/// in [`connection::run`]); this handle's [`WsConnectionHandle::recv`] only
/// ever drains the channel that loop feeds, it never touches the socket
/// directly.
pub struct WsConnectionHandle {
    conn: Arc<connection::WsConnection>,
    rooms: Arc<RoomIndex>,
    inbox: mpsc::UnboundedReceiver<WsMessage>,
}

impl WsConnectionHandle {
    /// This connection's correlation id.
    pub fn id(&self) -> Uuid {
        self.conn.id
    }

    /// The request path this connection was upgraded from.
    pub fn url(&self) -> &str {
        &self.conn.url
    }

    /// Whether this connection is still considered alive (no missed
    /// heartbeat and not yet closed).
    pub fn is_alive(&self) -> bool {
        self.conn.is_alive()
    }

    /// Receives the next message in arrival order, or `None` once the
    /// connection has closed and no further messages will arrive.
    pub async fn recv(&mut self) -> Option<WsMessage> {
        self.inbox.recv().await
    }

    /// Queues a text frame for this connection.
    pub fn send_text(&self, text: impl Into<String>) {
        self.conn.send_text(&text.into());
    }

    /// Queues a binary frame for this connection.
    pub fn send_binary(&self, payload: Vec<u8>) {
        self.conn.send_binary(payload);
    }

    /// Closes the connection with the given code and reason. Idempotent -
    /// further writes after this are discarded.
    pub fn close(&self, code: u16, reason: &str) {
        self.conn.close(code, reason);
    }

    /// Joins `room`, mirrored into both the room index and this
    /// connection's own membership set.
    pub fn join(&self, room: impl AsRef<str>) {
        self.rooms.join(self.conn.id, room.as_ref());
    }

    /// Leaves `room`.
    pub fn leave(&self, room: impl AsRef<str>) {
        self.rooms.leave(self.conn.id, room.as_ref());
    }

    /// Sends `text` to every member of `room`, optionally excluding this
    /// connection. Per-connection write errors are swallowed so one bad
    /// peer can't block the rest of the fan-out.
    pub fn broadcast_text(&self, room: &str, text: &str, exclude_self: bool) {
        let exclude = exclude_self.then_some(self.conn.id);
        self.rooms.broadcast_text(room, text, exclude);
    }

    /// Binary form of [`WsConnectionHandle::broadcast_text`].
    pub fn broadcast_binary(&self, room: &str, payload: &[u8], exclude_self: bool) {
        let exclude = exclude_self.then_some(self.conn.id);
        self.rooms.broadcast_binary(room, payload, exclude);
    }
}

/// Intercepts the HTTP upgrade path ahead of the orchestrator's usual
/// middleware/router dispatch, checking in order: route match, header
/// validation, origin allowlist, `verify_client`, `max_connections`.
/// Returns `None` (falling through to normal HTTP dispatch) when the
/// request path doesn't match any registered WS route at all; every other
/// rejection writes a response and returns `Some`.
pub(crate) async fn try_upgrade(router: &crate::Router, ctx: &mut Context) -> Option<crate::Response> {
    let registry = router.ws();
    let path = ctx.path().to_owned();
    let (route_handler, auto_join) = registry.find(&path)?;

    if handshake::validate_upgrade_headers(ctx.method(), ctx.request().headers()).is_err() {
        return Some(crate::Response::empty_status(http::StatusCode::BAD_REQUEST));
    }
    let key = ctx.request().header("Sec-WebSocket-Key").and_then(|v| v.to_str().ok())?.to_owned();

    if !registry.options.allowed_origins.is_empty() {
        let origin_ok = ctx
            .request()
            .header(http::header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(|origin| registry.options.allowed_origins.iter().any(|allowed| allowed == origin))
            .unwrap_or(false);
        if !origin_ok {
            return Some(crate::Response::empty_status(http::StatusCode::FORBIDDEN));
        }
    }

    if let Some(verify) = &registry.options.verify_client {
        if !verify(ctx.request()) {
            return Some(crate::Response::empty_status(http::StatusCode::UNAUTHORIZED));
        }
    }

    if registry.connections.load(Ordering::SeqCst) >= registry.options.max_connections {
        return Some(crate::Response::empty_status(http::StatusCode::SERVICE_UNAVAILABLE));
    }

    let accept = handshake::accept_key(&key);
    let rooms = registry.rooms.clone();
    let options = Arc::new(registry.options.clone());
    let connections = registry.connections.clone();
    let url = path;

    let mut request = std::mem::replace(ctx.request_mut(), Request::get("/").unwrap());
    let on_upgrade = hyper::upgrade::on(request.raw_mut());

    tokio::spawn(async move {
        let _counter = CounterGuard::new(connections);
        match on_upgrade.await {
            Ok(upgraded) => {
                connection::run(upgraded, url, auto_join, options, rooms, route_handler, request).await;
            }
            Err(error) => log::warn!("websocket upgrade failed: {error}"),
        }
    });

    let mut response = crate::Response::empty_status(http::StatusCode::SWITCHING_PROTOCOLS);
    let _ = response.set_header(http::header::UPGRADE, "websocket");
    let _ = response.set_header(http::header::CONNECTION, "Upgrade");
    let _ = response.set_header("Sec-WebSocket-Accept", accept);
    Some(response)
}

struct CounterGuard(Arc<AtomicUsize>);

impl CounterGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        CounterGuard(counter)
    }
}

impl Drop for CounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
