use crate::{HasHeaders, HttpEntity, Request, Response};
use std::collections::HashMap;
use std::sync::Arc;

/// A per-request mutable record threaded through the whole pipeline:
/// the in-flight request and response, route params, a lazily-parsed
/// query, caller-scoped state, and a correlation id.
///
/// New relative to the teacher, which hands middleware a bare `Request`
/// and expects a `Response` back - `under::Endpoint::apply` and
/// `under::Middleware::apply` take and return those types directly.
/// Here both take `&mut Context`, which is acquired from a
/// [`ContextPool`] at the start of a request and released once the
/// response has been flushed.
#[derive(Debug)]
pub struct Context {
    request: Request,
    response: Response,
    params: HashMap<Arc<str>, String>,
    query: Option<HashMap<String, Vec<String>>>,
    id: String,
    ended: bool,
}

impl Context {
    pub(crate) fn new(request: Request, id: String) -> Self {
        Context {
            request,
            response: Response::empty_200(),
            params: HashMap::new(),
            query: None,
            id,
            ended: false,
        }
    }

    /// Resets this context so it can be handed out again by the pool -
    /// reusing the allocation backing `params`/`query` without leaking
    /// the previous request's data into the next one.
    pub(crate) fn reset(&mut self, request: Request, id: String) {
        self.request = request;
        self.response = Response::empty_200();
        self.params.clear();
        self.query = None;
        self.id = id;
        self.ended = false;
    }

    #[cfg(test)]
    pub(crate) fn for_test(request: Request) -> Self {
        Context::new(request, "test".to_owned())
    }

    /// The correlation id assigned to this request at acquire time.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The request method.
    pub fn method(&self) -> &http::Method {
        self.request.method()
    }

    /// The request path, without the query string.
    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    /// A reference to the underlying request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// A mutable reference to the underlying request.
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// A reference to the response staged so far.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// A mutable reference to the response staged so far.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Takes the response staged so far, leaving an empty 200 in its
    /// place. Used by the orchestrator once the chain has unwound, so the
    /// [`Context`] itself can still be returned to its pool afterward.
    pub(crate) fn take_response(&mut self) -> Response {
        std::mem::replace(&mut self.response, Response::empty_200())
    }

    /// The route parameters bound by the router for this request.
    pub fn params(&self) -> &HashMap<Arc<str>, String> {
        &self.params
    }

    /// Looks up a single route parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub(crate) fn bind_params(&mut self, params: HashMap<Arc<str>, String>) {
        self.params = params;
    }

    /// The parsed query string, mapping each key to every value it
    /// appeared with (parsed lazily, on first access, from the request
    /// URI - spec.md §3 models `query` as string → string-or-string-list).
    pub fn query(&mut self) -> &HashMap<String, Vec<String>> {
        if self.query.is_none() {
            self.query = Some(parse_query(self.request.uri().query().unwrap_or("")));
        }
        self.query.as_ref().unwrap()
    }

    /// Shorthand for the first value of a query parameter, if present.
    pub fn query_one(&mut self, key: &str) -> Option<&str> {
        self.query()
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Whether a middleware or handler has already marked this response
    /// as finished via [`Context::res_end`]. The orchestrator consults
    /// this to decide whether it still owes the response a default body.
    pub(crate) fn is_ended(&self) -> bool {
        self.ended
    }

    /// Sets the response body to `value`, serialized as JSON, with an
    /// `application/json` content type.
    ///
    /// # Errors
    /// Fails if `value` cannot be serialized.
    pub fn res_json<V: serde::Serialize>(&mut self, value: &V) -> Result<(), serde_json::Error> {
        self.response = Response::json(value)?;
        self.ended = true;
        Ok(())
    }

    /// Sets the response body to plain text.
    pub fn res_text<V: Into<String>>(&mut self, value: V) {
        self.response = Response::text(value);
        self.ended = true;
    }

    /// Sets the response body to HTML.
    pub fn res_html<V: Into<String>>(&mut self, value: V) {
        self.response = Response::html(value);
        self.ended = true;
    }

    /// Sets the response status code.
    pub fn res_status<S: Into<http::StatusCode>>(&mut self, status: S) {
        self.response.set_status(status);
    }

    /// Sets a response header.
    ///
    /// # Errors
    /// Fails if the key or value cannot be converted into header types.
    pub fn res_set_header<K, V>(&mut self, key: K, value: V) -> Result<(), http::Error>
    where
        http::HeaderName: std::convert::TryFrom<K>,
        <http::HeaderName as std::convert::TryFrom<K>>::Error: Into<http::Error>,
        http::HeaderValue: std::convert::TryFrom<V>,
        <http::HeaderValue as std::convert::TryFrom<V>>::Error: Into<http::Error>,
    {
        self.response.set_header(key, value)?;
        Ok(())
    }

    /// Marks the response as complete without changing its body - for
    /// middleware that only needs to set a status/headers (e.g. a 304)
    /// and stop the chain from writing a default body over it.
    pub fn res_end(&mut self) {
        self.ended = true;
    }

    /// Replaces the response body outright, e.g. to stream a file.
    pub(crate) fn res_set_body<I: Into<hyper::Body>>(&mut self, body: I) {
        self.response.set_body(body);
        self.ended = true;
    }
}

impl Context {
    /// The request's typed state map - caller-scoped, per spec.md §3's
    /// `state` field. Reuses `http::Extensions` as a typed any-map, the
    /// same mechanism the teacher uses for its own request/response
    /// extensions.
    pub fn extensions(&self) -> &http::Extensions {
        self.request.extensions()
    }

    /// Mutable access to the state map.
    pub fn extensions_mut(&mut self) -> &mut http::Extensions {
        self.request.extensions_mut()
    }
}

has_extensions!(Context);

fn parse_query(raw: &str) -> HashMap<String, Vec<String>> {
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    if raw.is_empty() {
        return out;
    }
    for pair in raw.split('&') {
        if pair.is_empty() {
            continue;
        }
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or("");
        let value = parts.next().unwrap_or("");
        out.entry(decode_component(key))
            .or_default()
            .push(decode_component(value));
    }
    out
}

fn decode_component(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    out.push(value);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// A bounded pool of recycled [`Context`] instances, modeled on the
/// buffer-pool pattern of a bounded `Vec` behind a lock, push/pop, drop
/// on overflow.
#[derive(Debug)]
pub struct ContextPool {
    pool: std::sync::Mutex<Vec<Box<Context>>>,
    capacity: usize,
}

impl ContextPool {
    /// Default pool capacity, matching spec.md §3's "default ~50".
    pub const DEFAULT_CAPACITY: usize = 50;

    /// Creates a pool bounded at `capacity` recycled instances.
    pub fn new(capacity: usize) -> Self {
        ContextPool {
            pool: std::sync::Mutex::new(Vec::with_capacity(capacity.min(Self::DEFAULT_CAPACITY))),
            capacity,
        }
    }

    /// Acquires a context for `request`, reusing a pooled instance when
    /// one is available, or allocating a fresh one otherwise.
    pub fn acquire(&self, request: Request) -> Box<Context> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut pool = self.pool.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(mut ctx) = pool.pop() {
            ctx.reset(request, id);
            ctx
        } else {
            Box::new(Context::new(request, id))
        }
    }

    /// Returns `ctx` to the pool. If the pool is already at capacity,
    /// the instance is dropped instead.
    pub fn release(&self, ctx: Box<Context>) {
        let mut pool = self.pool.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if pool.len() < self.capacity {
            pool.push(ctx);
        }
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        ContextPool::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_parses_repeated_keys() {
        let mut ctx = Context::for_test(Request::get("/?a=1&a=2&b=x+y").unwrap());
        assert_eq!(
            ctx.query().get("a").cloned(),
            Some(vec!["1".to_owned(), "2".to_owned()])
        );
        assert_eq!(ctx.query_one("b"), Some("x y"));
    }

    #[test]
    fn res_text_marks_ended_and_sets_status_default() {
        let mut ctx = Context::for_test(Request::get("/").unwrap());
        assert!(!ctx.is_ended());
        ctx.res_text("hi");
        assert!(ctx.is_ended());
        assert_eq!(ctx.response().status(), http::StatusCode::OK);
    }

    #[test]
    fn pool_reuses_released_instance() {
        let pool = ContextPool::new(1);
        let ctx = pool.acquire(Request::get("/a").unwrap());
        let ptr = ctx.as_ref() as *const Context;
        pool.release(ctx);
        let reused = pool.acquire(Request::get("/b").unwrap());
        assert_eq!(reused.as_ref() as *const Context, ptr);
        assert_eq!(reused.path(), "/b");
    }

    #[test]
    fn pool_drops_beyond_capacity() {
        let pool = ContextPool::new(1);
        let a = pool.acquire(Request::get("/a").unwrap());
        let b = pool.acquire(Request::get("/b").unwrap());
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.pool.lock().unwrap().len(), 1);
    }
}
