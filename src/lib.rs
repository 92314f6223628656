//! loomweb is an async HTTP application framework built around a radix-tree
//! router, a cooperative middleware chain, and a pooled per-request
//! [`Context`]. It is based on Tokio and `hyper`, and is meant to keep route
//! dispatch and middleware composition fast and predictable while staying
//! small enough to read end to end.
//!
//! # Getting Started
//! ```toml
//! loomweb = "0.1.0"
//! tokio = { version = "1.26.0", features = ["full"] }
//! ```
//!
//! # Examples
//! ```rust,no_run
//! use loomweb::{Context, Router};
//!
//! async fn hello(ctx: &mut Context) -> Result<(), anyhow::Error> {
//!     ctx.res_text("hello, world!");
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), anyhow::Error> {
//!     let mut http = Router::default();
//!     http.at("/").get(hello);
//!     http.listen("0.0.0.0:8080").await?;
//!     Ok(())
//! }
//! ```
#![warn(missing_debug_implementations, rust_2018_idioms)]
#![deny(clippy::correctness, unused_must_use)]

#[macro_use]
extern crate async_trait;

#[macro_use]
mod has_extensions;
mod has_headers;

mod context;
pub mod endpoint;
mod entity;
mod error;
pub mod middleware;
mod orchestrator;
mod request;
mod response;
mod router;
#[cfg(feature = "static-files")]
pub mod static_files;
#[cfg(feature = "ws")]
pub mod ws;

pub use self::context::{Context, ContextPool};
pub use self::endpoint::Endpoint;
pub use self::entity::HttpEntity;
pub use self::error::LoomError;
pub use self::has_headers::HasHeaders;
pub use self::middleware::Middleware;
pub use self::request::Request;
pub use self::response::Response;
pub use self::router::{Path, Router, RouterOptions};

pub use ::http;
pub use hyper::Body;

/// A type alias for [`std::result::Result`] with the library's fallible
/// boundary type, mirroring the teacher's own `under::Result`. Handlers and
/// middleware most commonly return `Result<(), anyhow::Error>` directly
/// rather than naming this alias, but it is handy for helper functions.
pub type Result<R = (), E = anyhow::Error> = std::result::Result<R, E>;

#[must_use]
#[inline]
/// Creates a new, empty HTTP router. A shortcut for [`Router::default`].
pub fn http() -> Router {
    Router::default()
}
