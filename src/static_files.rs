//! Static file serving (C5), grounded in the teacher's
//! `endpoints::dir::DirEndpoint` (directory traversal rejection,
//! directory-index fallback, streamed body via `tokio_util::io::ReaderStream`,
//! `mime_guess` content typing) but reworked from an [`crate::Endpoint`] into
//! a [`crate::Middleware`] so it can mount under a prefix and fall through to
//! the rest of the chain, and generalized with the option set spec.md lists:
//! dotfiles policy, extension fallback, cache headers, conditional GET, and
//! byte ranges.

use crate::middleware::Next;
use crate::{Context, HasHeaders, Middleware};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// How dotfiles (paths whose final segment starts with `.`) are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DotFiles {
    /// Respond 404, as though the file didn't exist.
    Ignore,
    /// Respond 403.
    Deny,
    /// Serve it like any other file.
    Allow,
}

/// Construction-time options for [`StaticFiles`], in the same explicit,
/// typed style as [`crate::RouterOptions`].
#[derive(Clone)]
pub struct StaticFilesOptions {
    /// The filesystem directory files are served out of.
    pub root: PathBuf,
    /// URL mount path; requests not under this prefix fall through to
    /// `next()` untouched. Empty mounts at the router root.
    pub prefix: String,
    /// Filename served for a directory request, or `None` to respond 403
    /// for directories with no redirect applicable.
    pub index: Option<String>,
    /// When true, any 4xx outcome calls `next()` instead of responding.
    pub fallthrough: bool,
    /// When true, a directory request missing its trailing slash gets a
    /// 301 redirect to `path + "/"` instead of serving the index in place.
    pub redirect: bool,
    /// `Cache-Control: max-age` in seconds; 0 disables the header.
    pub max_age: u64,
    /// Adds `immutable` to `Cache-Control` when `max_age > 0`.
    pub immutable: bool,
    /// Policy applied to dotfiles.
    pub dotfiles: DotFiles,
    /// Extensions tried, in order, when the requested path has no direct
    /// match (e.g. `["html"]` lets `/about` serve `about.html`).
    pub extensions: Vec<String>,
    /// Invoked with `(ctx, absolute_path, metadata)` right before a
    /// successful response's body is written, so callers can set their own
    /// headers (e.g. a custom `Cache-Control` override).
    pub set_headers: Option<Arc<dyn Fn(&mut Context, &Path, &std::fs::Metadata) + Send + Sync>>,
}

impl StaticFilesOptions {
    /// Creates options rooted at `root` with the spec's defaults: `index.html`
    /// as the directory index, trailing-slash redirects on, dotfiles
    /// ignored, no extension fallback, and no caching.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        StaticFilesOptions {
            root: root.into(),
            prefix: String::new(),
            index: Some("index.html".to_owned()),
            fallthrough: false,
            redirect: true,
            max_age: 0,
            immutable: false,
            dotfiles: DotFiles::Ignore,
            extensions: Vec::new(),
            set_headers: None,
        }
    }

    /// Mounts this middleware under `prefix` instead of the router root.
    #[must_use]
    pub fn prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = prefix.into();
        self
    }
}

impl std::fmt::Debug for StaticFilesOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticFilesOptions")
            .field("root", &self.root)
            .field("prefix", &self.prefix)
            .field("index", &self.index)
            .field("fallthrough", &self.fallthrough)
            .field("redirect", &self.redirect)
            .field("max_age", &self.max_age)
            .field("immutable", &self.immutable)
            .field("dotfiles", &self.dotfiles)
            .field("extensions", &self.extensions)
            .field("set_headers", &self.set_headers.is_some())
            .finish()
    }
}

/// Serves files out of a directory - spec.md §4.5's "Static Files" plugin.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    options: Arc<StaticFilesOptions>,
}

impl StaticFiles {
    #[must_use]
    pub fn new(options: StaticFilesOptions) -> Self {
        StaticFiles {
            options: Arc::new(options),
        }
    }
}

#[async_trait::async_trait]
impl Middleware for StaticFiles {
    async fn apply(&self, ctx: &mut Context, next: Next<'_>) -> Result<(), anyhow::Error> {
        let options = &self.options;

        if ctx.method() != &http::Method::GET && ctx.method() != &http::Method::HEAD {
            return next.apply(ctx).await;
        }

        let Some(suffix) = ctx.path().strip_prefix(&*options.prefix) else {
            return next.apply(ctx).await;
        };
        // `strip_prefix` only matches bytes, not segment boundaries: a
        // `prefix` of `/static` would otherwise also swallow `/statics` or
        // `/staticfoo/bar`. Require the remainder to be empty or begin a
        // new segment before treating the request as in-scope.
        if !suffix.is_empty() && !suffix.starts_with('/') {
            return next.apply(ctx).await;
        }

        let is_directory_request = suffix.ends_with('/') || suffix.is_empty();
        let Some(relative) = sanitize(suffix) else {
            return respond(ctx, next, options.fallthrough, http::StatusCode::FORBIDDEN).await;
        };

        let mut candidate = options.root.join(&relative);
        let mut meta = tokio::fs::metadata(&candidate).await.ok();

        if meta.is_none() && !relative.as_os_str().is_empty() {
            for extension in &options.extensions {
                let mut attempt = candidate.clone();
                let file_name = attempt.file_name().map(|n| n.to_owned()).unwrap_or_default();
                let mut name = file_name.to_string_lossy().into_owned();
                name.push('.');
                name.push_str(extension);
                attempt.set_file_name(name);
                if let Ok(m) = tokio::fs::metadata(&attempt).await {
                    candidate = attempt;
                    meta = Some(m);
                    break;
                }
            }
        }

        let Some(mut meta) = meta else {
            return respond(ctx, next, options.fallthrough, http::StatusCode::NOT_FOUND).await;
        };

        if meta.is_dir() {
            if options.redirect && !is_directory_request {
                let location = format!("{}/", ctx.path());
                ctx.res_status(http::StatusCode::MOVED_PERMANENTLY);
                let _ = ctx.res_set_header(http::header::LOCATION, location);
                ctx.res_end();
                return Ok(());
            }

            let Some(index) = &options.index else {
                return respond(ctx, next, options.fallthrough, http::StatusCode::FORBIDDEN).await;
            };
            candidate.push(index);
            match tokio::fs::metadata(&candidate).await {
                Ok(m) if m.is_file() => meta = m,
                _ => return respond(ctx, next, options.fallthrough, http::StatusCode::NOT_FOUND).await,
            }
        }

        if is_dotfile(&candidate) {
            match options.dotfiles {
                DotFiles::Ignore => {
                    return respond(ctx, next, options.fallthrough, http::StatusCode::NOT_FOUND).await;
                }
                DotFiles::Deny => {
                    return respond(ctx, next, options.fallthrough, http::StatusCode::FORBIDDEN).await;
                }
                DotFiles::Allow => {}
            }
        }

        serve_file(ctx, options, &candidate, &meta).await
    }
}

async fn respond(
    ctx: &mut Context,
    next: Next<'_>,
    fallthrough: bool,
    status: http::StatusCode,
) -> Result<(), anyhow::Error> {
    if fallthrough {
        return next.apply(ctx).await;
    }
    ctx.res_status(status);
    ctx.res_end();
    Ok(())
}

/// Rejects traversal attempts and normalizes a URL-decoded request path into
/// a relative filesystem path, the way the teacher's `resolve_path` does:
/// reject any segment that is `..` or contains a backslash, drop `.` and
/// empty segments, and join the rest.
fn sanitize(path: &str) -> Option<PathBuf> {
    let decoded = percent_decode(path);
    let mut out = PathBuf::new();
    for segment in decoded.split('/') {
        if segment == ".." || segment.contains('\\') {
            return None;
        }
        if segment.is_empty() || segment == "." {
            continue;
        }
        out.push(segment);
    }
    Some(out)
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_dotfile(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

async fn serve_file(
    ctx: &mut Context,
    options: &StaticFilesOptions,
    path: &Path,
    meta: &std::fs::Metadata,
) -> Result<(), anyhow::Error> {
    let size = meta.len();
    let mtime_millis = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let etag = format!("\"{:08x}\"", fnv1a(&format!("{size}-{mtime_millis}")));

    if let Some(hook) = &options.set_headers {
        hook(ctx, path, meta);
    }

    let if_none_match = ctx.request().header(http::header::IF_NONE_MATCH).and_then(|v| v.to_str().ok());
    let if_modified_since = ctx
        .request()
        .header(http::header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date);

    let not_modified = if_none_match == Some(etag.as_str())
        || if_modified_since.map(|since| since >= mtime_millis / 1000).unwrap_or(false);

    let _ = ctx.res_set_header(http::header::ETAG, etag.clone());
    if options.max_age > 0 {
        let directive = if options.immutable {
            format!("public, max-age={}, immutable", options.max_age)
        } else {
            format!("public, max-age={}", options.max_age)
        };
        let _ = ctx.res_set_header(http::header::CACHE_CONTROL, directive);
    }

    if not_modified {
        ctx.res_status(http::StatusCode::NOT_MODIFIED);
        ctx.res_end();
        return Ok(());
    }

    let mime_type = mime_guess::MimeGuess::from_path(path).first_or_octet_stream();
    let _ = ctx.res_set_header(http::header::CONTENT_TYPE, mime_type.to_string());
    let _ = ctx.res_set_header(http::header::ACCEPT_RANGES, "bytes");

    let range = ctx
        .request()
        .header(http::header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    if let Some(raw_range) = range {
        return serve_range(ctx, path, size, &raw_range).await;
    }

    ctx.res_status(http::StatusCode::OK);
    let _ = ctx.res_set_header(http::header::CONTENT_LENGTH, size.to_string());

    if ctx.method() == &http::Method::HEAD {
        ctx.res_end();
        return Ok(());
    }

    let file = tokio::fs::File::open(path).await?;
    ctx.res_set_body(hyper::Body::wrap_stream(ReaderStream::new(file)));
    Ok(())
}

async fn serve_range(ctx: &mut Context, path: &Path, size: u64, raw_range: &str) -> Result<(), anyhow::Error> {
    match parse_range(raw_range, size) {
        Some((start, end)) => {
            let length = end - start + 1;
            let _ = ctx.res_set_header(http::header::CONTENT_RANGE, format!("bytes {start}-{end}/{size}"));
            let _ = ctx.res_set_header(http::header::CONTENT_LENGTH, length.to_string());
            ctx.res_status(http::StatusCode::PARTIAL_CONTENT);

            if ctx.method() == &http::Method::HEAD {
                ctx.res_end();
                return Ok(());
            }

            let mut file = tokio::fs::File::open(path).await?;
            file.seek(std::io::SeekFrom::Start(start)).await?;
            let body = ReaderStream::new(file.take(length));
            ctx.res_set_body(hyper::Body::wrap_stream(body));
            Ok(())
        }
        None => {
            let _ = ctx.res_set_header(http::header::CONTENT_RANGE, format!("bytes */{size}"));
            ctx.res_status(http::StatusCode::RANGE_NOT_SATISFIABLE);
            ctx.res_end();
            Ok(())
        }
    }
}

/// Parses a single `bytes=start-end` range header, per spec.md §4.5.8.
/// Multi-range requests and suffix ranges (`bytes=-N`) aren't supported; a
/// header this parser doesn't recognize is treated as absent rather than
/// invalid, matching the teacher's tolerant-parsing style elsewhere.
fn parse_range(raw: &str, size: u64) -> Option<(u64, u64)> {
    let spec = raw.strip_prefix("bytes=")?;
    let (start_str, end_str) = spec.split_once('-')?;
    let start: u64 = start_str.parse().ok()?;
    let end: u64 = if end_str.is_empty() {
        size.checked_sub(1)?
    } else {
        end_str.parse().ok()?
    };
    if start <= end && end < size {
        Some((start, end))
    } else {
        None
    }
}

fn fnv1a(s: &str) -> u32 {
    const PRIME: u32 = 16_777_619;
    let mut hash: u32 = 2_166_136_261;
    for byte in s.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Parses an RFC 7231 IMF-fixdate (e.g. `Sun, 06 Nov 1994 08:49:37 GMT`)
/// into Unix seconds. Hand-rolled for the same reason `fnv1a` is: the only
/// thing in this crate that needs an HTTP-date parser is this one
/// comparison, which doesn't justify a `chrono`/`httpdate` dependency.
fn parse_http_date(s: &str) -> Option<u64> {
    let mut parts = s.split_whitespace();
    let _weekday = parts.next()?;
    let day: u64 = parts.next()?.parse().ok()?;
    let month = month_number(parts.next()?)?;
    let year: i64 = parts.next()?.parse().ok()?;
    let time = parts.next()?;
    let mut time_parts = time.split(':');
    let hour: u64 = time_parts.next()?.parse().ok()?;
    let minute: u64 = time_parts.next()?.parse().ok()?;
    let second: u64 = time_parts.next()?.parse().ok()?;

    let days = days_from_civil(year, month, day as i64);
    let seconds = days * 86_400 + (hour * 3600 + minute * 60 + second) as i64;
    u64::try_from(seconds).ok()
}

fn month_number(name: &str) -> Option<i64> {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    MONTHS.iter().position(|m| *m == name).map(|i| i as i64 + 1)
}

/// Days since the Unix epoch for a given (proleptic Gregorian) civil date -
/// Howard Hinnant's `days_from_civil` algorithm.
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rejects_parent_traversal() {
        assert!(sanitize("../etc/passwd").is_none());
        assert!(sanitize("a/../../etc").is_none());
    }

    #[tokio::test]
    async fn prefix_match_requires_a_segment_boundary() {
        let options = StaticFilesOptions::new("/nonexistent-root").prefix("/static");
        let middleware = StaticFiles::new(options);
        let terminal = crate::endpoint::simple(|ctx| ctx.res_status(http::StatusCode::IM_A_TEAPOT));
        let rest: [Arc<dyn Middleware>; 0] = [];

        for path in ["/statics/x", "/staticfoo/bar", "/staticism"] {
            let next = Next::new(&rest, std::pin::Pin::new(&terminal));
            let mut ctx = Context::for_test(crate::Request::get(path).unwrap());
            middleware.apply(&mut ctx, next).await.unwrap();
            assert_eq!(
                ctx.response().status(),
                http::StatusCode::IM_A_TEAPOT,
                "{path} should fall through to next(), not be treated as under /static"
            );
        }
    }

    #[test]
    fn sanitize_drops_dot_and_empty_segments() {
        assert_eq!(sanitize("./a//b/").unwrap(), PathBuf::from("a/b"));
    }

    #[test]
    fn range_parses_inclusive_bounds() {
        assert_eq!(parse_range("bytes=0-99", 1000), Some((0, 99)));
        assert_eq!(parse_range("bytes=900-", 1000), Some((900, 999)));
    }

    #[test]
    fn range_rejects_out_of_bounds() {
        assert_eq!(parse_range("bytes=0-1000", 1000), None);
        assert_eq!(parse_range("bytes=50-10", 1000), None);
    }

    #[test]
    fn etag_is_quoted_hex() {
        let tag = format!("\"{:08x}\"", fnv1a("100-12345"));
        assert!(tag.starts_with('"') && tag.ends_with('"'));
    }

    #[test]
    fn http_date_round_trips_known_value() {
        // 1994-11-06T08:49:37Z, the RFC 7231 example date.
        assert_eq!(parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT"), Some(784_111_777));
    }
}
