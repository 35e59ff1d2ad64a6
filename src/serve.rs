//! HTTP front-end.
//!
//! Routes:
//! - `/` — article index.
//! - `/articles/{title}` — rendered article (the route-parameter entry
//!   point: `title` → `assets/markdown/<title>.md` → fetch → render).
//! - `/api/articles` — JSON catalog listing.
//! - `/assets/markdown/{file}` — raw markdown served as a static asset.
//! - `/assets/mdtutor.css`, `/assets/mdtutor.js` — embedded assets.
//!
//! Every response carries `X-Content-Type-Options: nosniff`. Markdown
//! responses support conditional GET (`ETag` / `If-Modified-Since`), and the
//! whole router is wrapped in gzip/brotli compression.

use std::io;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{Path as UrlPath, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use tokio::signal;
use tower_http::compression::CompressionLayer;

use crate::catalog::{self, ArticleEntry};
use crate::html::{self, RenderOptions};
use crate::route::{self, RouteParams};
use crate::view::{self, ViewError};
use crate::web_assets;

/// Maximum number of consecutive ports to try before giving up.
const MAX_PORT_ATTEMPTS: u16 = 100;

/// Maximum file size that will be read and served (16 MiB).
pub const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Shared application state passed to all request handlers via `Arc<AppState>`.
pub struct AppState {
    /// Content root containing the `assets/markdown/` tree.
    pub content_root: PathBuf,
    /// Canonicalized `content_root` used for symlink-safe containment checks.
    pub canonical_root: PathBuf,
    /// Rendering configuration (raw-HTML passthrough on or off).
    pub render: RenderOptions,
}

/// Attempt to bind a TCP listener on `bind_addr` starting at `start_port`.
///
/// On `EADDRINUSE` the port is incremented by one and the attempt is retried
/// up to `MAX_PORT_ATTEMPTS` times. Any other OS error causes an immediate
/// failure without further retries.
pub fn bind_with_retry(bind_addr: &str, start_port: u16) -> Result<(TcpListener, u16), String> {
    let mut port = start_port;
    eprintln!("[bind] trying port={}", port);
    for _ in 0..MAX_PORT_ATTEMPTS {
        let addr = format!("{}:{}", bind_addr, port);
        match TcpListener::bind(&addr) {
            Ok(listener) => {
                eprintln!("[bind] success port={}", port);
                return Ok((listener, port));
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                let next = port.wrapping_add(1);
                eprintln!("[bind] EADDRINUSE, trying {}", next);
                port = next;
            }
            Err(e) => {
                return Err(format!("bind {}:{} failed: {}", bind_addr, port, e));
            }
        }
    }
    Err(format!(
        "exhausted {} port candidates starting at {}; all ports in use",
        MAX_PORT_ATTEMPTS, start_port,
    ))
}

// ---------------------------------------------------------------------------
// Path and conditional-GET helpers
// ---------------------------------------------------------------------------

/// Normalize a decoded path fragment, stripping `.` and `..` components.
///
/// Splits on `/`, ignores empty components and `.`, resolves `..` by popping
/// the stack. Returns `None` if a `..` would escape the root (stack
/// underflow), which signals a path-traversal attempt.
pub fn normalize_path(decoded: &str) -> Option<PathBuf> {
    let mut parts: Vec<&str> = Vec::new();
    for component in decoded.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return None;
                }
            }
            name => parts.push(name),
        }
    }
    let mut path = PathBuf::new();
    for part in &parts {
        path.push(part);
    }
    Some(path)
}

/// Seconds since the epoch for a modification time, rounded down.
fn mtime_secs(mtime: SystemTime) -> u64 {
    mtime
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Strong validator derived from file metadata: `"<mtime-secs>-<len>"`.
fn compute_etag(meta: &std::fs::Metadata) -> Option<String> {
    let mtime = meta.modified().ok()?;
    Some(format!("\"{}-{}\"", mtime_secs(mtime), meta.len()))
}

/// Evaluate request preconditions against the file's validators.
///
/// `If-None-Match` wins over `If-Modified-Since` when both are present.
/// HTTP dates have one-second resolution, so the comparison truncates the
/// modification time to whole seconds.
fn is_not_modified(headers: &HeaderMap, etag: Option<&str>, mtime: Option<SystemTime>) -> bool {
    if let Some(if_none_match) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(etag) = etag {
            return if_none_match
                .split(',')
                .any(|candidate| candidate.trim() == etag);
        }
    }

    if let Some(if_modified_since) = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
    {
        if let Some(mtime) = mtime {
            return mtime_secs(mtime) <= mtime_secs(if_modified_since);
        }
    }

    false
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// 404 Not Found with mandatory security headers.
fn not_found_response() -> Response {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header("X-Content-Type-Options", "nosniff")
        .body(Body::from("Not Found"))
        .expect("not_found_response builder is infallible")
}

/// 413 Content Too Large with mandatory security headers.
fn too_large_response(content_path: &str, size: u64) -> Response {
    let body = format!(
        "Content Too Large: {} ({} bytes exceeds {} byte limit)",
        content_path, size, MAX_FILE_SIZE
    );
    Response::builder()
        .status(StatusCode::PAYLOAD_TOO_LARGE)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header("X-Content-Type-Options", "nosniff")
        .body(Body::from(body))
        .expect("too_large_response builder is infallible")
}

/// 304 Not Modified, revalidating the cached entity.
fn not_modified_response(etag: Option<&str>) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::NOT_MODIFIED)
        .header("X-Content-Type-Options", "nosniff");
    if let Some(etag) = etag {
        builder = builder.header(header::ETAG, etag);
    }
    builder
        .body(Body::empty())
        .expect("not_modified_response builder is infallible")
}

/// 200 OK with content type, security headers, and cache validators.
fn ok_response(
    content_type: &str,
    body: impl Into<Body>,
    etag: Option<&str>,
    mtime: Option<SystemTime>,
) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header("X-Content-Type-Options", "nosniff");
    if let Some(etag) = etag {
        builder = builder.header(header::ETAG, etag);
    }
    if let Some(mtime) = mtime {
        builder = builder.header(header::LAST_MODIFIED, httpdate::fmt_http_date(mtime));
    }
    builder
        .body(body.into())
        .expect("ok_response builder is infallible")
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Build the index-page body from the catalog.
fn build_index_body(entries: &[ArticleEntry]) -> String {
    let mut body = String::from("<h1>Articles</h1>\n");
    if entries.is_empty() {
        body.push_str("<p class=\"empty-catalog\">No articles found.</p>\n");
        return body;
    }
    body.push_str("<ul class=\"article-list\">\n");
    for entry in entries {
        body.push_str(&format!(
            "<li><a href=\"/articles/{}\">{}</a></li>\n",
            html::html_escape(&entry.slug),
            html::html_escape(&entry.title),
        ));
    }
    body.push_str("</ul>\n");
    body
}

/// `GET /` — list every article in the catalog.
async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let entries = match catalog::scan(&state.content_root).await {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("[request] path=/ mode=index err={}", e);
            return not_found_response();
        }
    };
    eprintln!("[request] path=/ mode=index articles={}", entries.len());
    let page = html::build_page_shell(&build_index_body(&entries), &[], "Articles");
    ok_response("text/html; charset=utf-8", page, None, None)
}

/// `GET /api/articles` — JSON catalog listing.
async fn api_articles_handler(State(state): State<Arc<AppState>>) -> Response {
    let entries = match catalog::scan(&state.content_root).await {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("[request] path=/api/articles err={}", e);
            return not_found_response();
        }
    };
    eprintln!(
        "[request] path=/api/articles mode=json articles={}",
        entries.len()
    );
    let body = catalog::to_json(&entries).to_string();
    ok_response("application/json", body, None, None)
}

/// Stat a candidate file and verify symlink-safe containment in the root.
///
/// Returns the file metadata on success, or a denial reason for logging.
async fn stat_contained(
    full_path: &Path,
    canonical_root: &Path,
) -> Result<std::fs::Metadata, &'static str> {
    let canonical = match tokio::fs::canonicalize(full_path).await {
        Ok(c) => c,
        Err(_) => return Err("not-found"),
    };
    if !canonical.starts_with(canonical_root) {
        return Err("outside-root");
    }
    match tokio::fs::metadata(&canonical).await {
        Ok(meta) if meta.is_file() => Ok(meta),
        Ok(_) => Err("not-a-file"),
        Err(_) => Err("metadata-failed"),
    }
}

/// `GET /articles/{title}` — the article-resolution and rendering pipeline.
///
/// The `title` route parameter is substituted into the content-path template
/// verbatim; containment is enforced here, after the fact, by canonicalizing
/// the candidate and checking it stays under the content root.
async fn article_handler(
    State(state): State<Arc<AppState>>,
    UrlPath(title): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    let params = RouteParams::with_title(&title);
    let content_path = route::content_path(&params);
    let full_path = state.content_root.join(&content_path);

    let meta = match stat_contained(&full_path, &state.canonical_root).await {
        Ok(meta) => meta,
        Err(reason) => {
            eprintln!("[resolve] path={} branch=denied reason={}", content_path, reason);
            return not_found_response();
        }
    };

    if meta.len() > MAX_FILE_SIZE {
        eprintln!(
            "[resolve] path={} branch=denied reason=too-large size={}",
            content_path,
            meta.len()
        );
        return too_large_response(&content_path, meta.len());
    }

    let etag = compute_etag(&meta);
    let mtime = meta.modified().ok();
    if is_not_modified(&headers, etag.as_deref(), mtime) {
        eprintln!("[request] path={} mode=not-modified", content_path);
        return not_modified_response(etag.as_deref());
    }

    let article = match view::fetch_and_render(&state.content_root, &content_path, &state.render).await
    {
        Ok(article) => article,
        Err(ViewError::NotFound { .. }) => {
            eprintln!("[resolve] path={} branch=denied reason=not-found", content_path);
            return not_found_response();
        }
        Err(e) => {
            eprintln!("[resolve] path={} branch=denied err={}", content_path, e);
            return not_found_response();
        }
    };

    eprintln!("[request] path={} mode=rendered", content_path);
    let page = html::build_page_shell(&article.html, &article.headings, article.page_title());
    ok_response("text/html; charset=utf-8", page, etag.as_deref(), mtime)
}

/// `GET /assets/markdown/{file}` — raw markdown served as a static asset.
///
/// Only `.md` files are served here; the path is normalized and containment
/// is verified before reading.
async fn raw_markdown_handler(
    State(state): State<Arc<AppState>>,
    UrlPath(file): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    let req_path = format!("{}/{}", route::CONTENT_DIR, file);

    // axum percent-decodes the capture, so an encoded traversal arrives as
    // literal dot-dot components and is caught by normalization.
    let normalized = match normalize_path(&req_path) {
        Some(n) => n,
        None => {
            eprintln!("[resolve] path={} branch=denied reason=path-traversal", req_path);
            return not_found_response();
        }
    };

    if normalized.extension().and_then(|e| e.to_str()) != Some("md") {
        eprintln!("[resolve] path={} branch=denied reason=not-markdown", req_path);
        return not_found_response();
    }

    let full_path = state.content_root.join(&normalized);
    let meta = match stat_contained(&full_path, &state.canonical_root).await {
        Ok(meta) => meta,
        Err(reason) => {
            eprintln!("[resolve] path={} branch=denied reason={}", req_path, reason);
            return not_found_response();
        }
    };

    if meta.len() > MAX_FILE_SIZE {
        eprintln!(
            "[resolve] path={} branch=denied reason=too-large size={}",
            req_path,
            meta.len()
        );
        return too_large_response(&req_path, meta.len());
    }

    let etag = compute_etag(&meta);
    let mtime = meta.modified().ok();
    if is_not_modified(&headers, etag.as_deref(), mtime) {
        eprintln!("[request] path={} mode=not-modified", req_path);
        return not_modified_response(etag.as_deref());
    }

    let content = match tokio::fs::read(&full_path).await {
        Ok(c) => c,
        Err(_) => return not_found_response(),
    };

    eprintln!("[request] path={} mode=raw", req_path);
    ok_response(
        "text/markdown; charset=utf-8",
        content,
        etag.as_deref(),
        mtime,
    )
}

/// `GET /assets/mdtutor.css` — embedded stylesheet.
async fn css_handler() -> Response {
    eprintln!("[request] path=/assets/mdtutor.css mode=asset");
    ok_response("text/css; charset=utf-8", web_assets::CSS, None, None)
}

/// `GET /assets/mdtutor.js` — embedded script.
async fn js_handler() -> Response {
    eprintln!("[request] path=/assets/mdtutor.js mode=asset");
    ok_response("text/javascript; charset=utf-8", web_assets::JS, None, None)
}

async fn fallback_handler() -> Response {
    not_found_response()
}

// ---------------------------------------------------------------------------
// Server entry point
// ---------------------------------------------------------------------------

/// Build the application router for a given state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/articles/{title}", get(article_handler))
        .route("/api/articles", get(api_articles_handler))
        .route("/assets/markdown/{file}", get(raw_markdown_handler))
        .route("/assets/mdtutor.css", get(css_handler))
        .route("/assets/mdtutor.js", get(js_handler))
        .fallback(fallback_handler)
        .layer(CompressionLayer::new())
        .with_state(state)
}

/// Start the HTTP server for the given content root.
///
/// Binds to `bind_addr` starting at `start_port`, retrying on `EADDRINUSE`
/// up to 100 times. The server shuts down cleanly when SIGINT (Ctrl+C) is
/// received.
pub async fn run_serve(
    root: String,
    bind_addr: String,
    start_port: u16,
    render: RenderOptions,
) -> io::Result<()> {
    let content_root = PathBuf::from(&root);
    let canonical_root =
        std::fs::canonicalize(&content_root).unwrap_or_else(|_| content_root.clone());

    let state = Arc::new(AppState {
        content_root: canonical_root.clone(),
        canonical_root,
        render,
    });

    let (std_listener, bound_port) = bind_with_retry(&bind_addr, start_port).map_err(|msg| {
        eprintln!("Error: {}", msg);
        io::Error::new(io::ErrorKind::AddrInUse, msg)
    })?;

    std_listener.set_nonblocking(true)?;
    let listener = tokio::net::TcpListener::from_std(std_listener)?;

    let app = build_router(state.clone());

    println!("mdtutor serve");
    println!("root:  {}", state.canonical_root.display());
    println!("url:   http://{}:{}/", bind_addr, bound_port);
    eprintln!("[serve] listening on {}:{}", bind_addr, bound_port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c()
                .await
                .expect("failed to install SIGINT handler");
            eprintln!("[shutdown] complete");
        })
        .await
        .map_err(io::Error::other)?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    // --- normalize_path ---

    #[test]
    fn normalize_simple_path() {
        assert_eq!(
            normalize_path("assets/markdown/guide.md").unwrap(),
            PathBuf::from("assets/markdown/guide.md")
        );
    }

    #[test]
    fn normalize_dot_components_stripped() {
        assert_eq!(normalize_path("a/./b").unwrap(), PathBuf::from("a/b"));
    }

    #[test]
    fn normalize_dotdot_within_root() {
        assert_eq!(normalize_path("a/b/../c").unwrap(), PathBuf::from("a/c"));
    }

    #[test]
    fn normalize_traversal_above_root_rejected() {
        assert!(normalize_path("../etc/passwd").is_none());
        assert!(normalize_path("a/../../etc/passwd").is_none());
    }

    #[test]
    fn normalize_empty_gives_empty() {
        assert_eq!(normalize_path("").unwrap(), PathBuf::new());
    }

    // --- conditional GET ---

    fn headers_with(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn etag_match_is_not_modified() {
        let headers = headers_with(header::IF_NONE_MATCH, "\"123-42\"");
        assert!(is_not_modified(&headers, Some("\"123-42\""), None));
    }

    #[test]
    fn etag_mismatch_is_modified() {
        let headers = headers_with(header::IF_NONE_MATCH, "\"other\"");
        assert!(!is_not_modified(&headers, Some("\"123-42\""), None));
    }

    #[test]
    fn etag_list_is_searched() {
        let headers = headers_with(header::IF_NONE_MATCH, "\"a\", \"123-42\"");
        assert!(is_not_modified(&headers, Some("\"123-42\""), None));
    }

    #[test]
    fn modified_since_future_is_not_modified() {
        let now = SystemTime::now();
        let future = httpdate::fmt_http_date(now + std::time::Duration::from_secs(3600));
        let headers = headers_with(header::IF_MODIFIED_SINCE, &future);
        assert!(is_not_modified(&headers, None, Some(now)));
    }

    #[test]
    fn modified_since_past_is_modified() {
        let headers = headers_with(header::IF_MODIFIED_SINCE, "Thu, 01 Jan 1970 00:00:00 GMT");
        assert!(!is_not_modified(&headers, None, Some(SystemTime::now())));
    }

    #[test]
    fn no_preconditions_is_modified() {
        assert!(!is_not_modified(
            &HeaderMap::new(),
            Some("\"1-2\""),
            Some(SystemTime::now())
        ));
    }

    #[test]
    fn unparsable_modified_since_is_ignored() {
        let headers = headers_with(header::IF_MODIFIED_SINCE, "not a date");
        assert!(!is_not_modified(&headers, None, Some(SystemTime::now())));
    }

    // --- index body ---

    #[test]
    fn index_body_lists_articles() {
        let entries = vec![ArticleEntry {
            slug: "oop-paradigm".to_owned(),
            title: "OOP <Paradigm>".to_owned(),
            content_path: "assets/markdown/oop-paradigm.md".to_owned(),
        }];
        let body = build_index_body(&entries);
        assert!(body.contains("href=\"/articles/oop-paradigm\""));
        assert!(body.contains("OOP &lt;Paradigm&gt;"));
    }

    #[test]
    fn index_body_empty_catalog() {
        let body = build_index_body(&[]);
        assert!(body.contains("No articles found"));
    }
}
