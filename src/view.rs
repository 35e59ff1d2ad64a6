//! Article view model: the fetch-and-render pipeline.
//!
//! [`ArticleView`] owns the current content path and the last rendered
//! document. A navigation (one route-parameter snapshot) derives the content
//! path, fetches the markdown file under the content root, and replaces the
//! rendered document wholesale. A failed fetch leaves the prior document in
//! place; there is no retry.
//!
//! [`ArticleView::spawn`] drives the view from a route-parameter stream on a
//! dedicated task. The returned [`ViewHandle`] unregisters the listener on
//! `shutdown()` and on drop. Because the stream is a watch channel, a
//! navigation superseded before its fetch completes is skipped rather than
//! racing a newer one.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::catalog;
use crate::html::{self, HeadingEntry, RenderOptions};
use crate::route::{self, RouteParams, RouteReceiver};

/// Error from a single fetch-and-render attempt.
#[derive(Debug)]
pub enum ViewError {
    /// No file exists at the derived content path.
    NotFound { content_path: String },
    /// The file exists but could not be read.
    Io {
        content_path: String,
        source: io::Error,
    },
}

impl fmt::Display for ViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewError::NotFound { content_path } => {
                write!(f, "no article at {content_path}")
            }
            ViewError::Io {
                content_path,
                source,
            } => write!(f, "reading {content_path}: {source}"),
        }
    }
}

impl std::error::Error for ViewError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ViewError::Io { source, .. } => Some(source),
            ViewError::NotFound { .. } => None,
        }
    }
}

/// A rendered article document. Replaced wholesale on each navigation.
#[derive(Debug, Clone)]
pub struct RenderedArticle {
    /// Content path the document was fetched from.
    pub content_path: String,
    /// Title from YAML frontmatter, if the article carried one.
    pub frontmatter_title: Option<String>,
    /// Rendered HTML fragment.
    pub html: String,
    /// Ordered headings for TOC construction.
    pub headings: Vec<HeadingEntry>,
}

impl RenderedArticle {
    /// Display title: frontmatter → first H1 → file stem of the content path.
    pub fn page_title(&self) -> &str {
        if let Some(title) = &self.frontmatter_title {
            return title;
        }
        if let Some(h1) = self.headings.iter().find(|h| h.level == 1) {
            return &h1.text;
        }
        Path::new(&self.content_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Article")
    }
}

/// Fetch the markdown file at `content_path` under `content_root` and render
/// it to HTML.
///
/// Frontmatter is stripped before rendering. This is the whole pipeline for
/// one navigation; [`ArticleView::navigate`] and the HTTP article handler
/// both go through here.
pub async fn fetch_and_render(
    content_root: &Path,
    content_path: &str,
    opts: &RenderOptions,
) -> Result<RenderedArticle, ViewError> {
    let full_path = content_root.join(content_path);

    let source = match tokio::fs::read_to_string(&full_path).await {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ViewError::NotFound {
                content_path: content_path.to_owned(),
            });
        }
        Err(e) => {
            return Err(ViewError::Io {
                content_path: content_path.to_owned(),
                source: e,
            });
        }
    };

    let (frontmatter, body) = catalog::split_frontmatter(&source);
    let frontmatter_title = catalog::frontmatter_title(frontmatter.as_ref());
    let (html, headings) = html::render_markdown(body, opts);

    Ok(RenderedArticle {
        content_path: content_path.to_owned(),
        frontmatter_title,
        html,
        headings,
    })
}

/// View state: no content path yet, or a document loaded for the current
/// path. There is no terminal state; each navigation restarts the cycle.
#[derive(Debug)]
pub enum ViewState {
    Empty,
    Loaded(RenderedArticle),
}

/// One article view instance.
///
/// The current content path is a field owned exclusively by this object; it
/// is overwritten, not merged, on each navigation.
#[derive(Debug)]
pub struct ArticleView {
    content_root: PathBuf,
    options: RenderOptions,
    current_path: Option<String>,
    state: ViewState,
}

impl ArticleView {
    pub fn new(content_root: impl Into<PathBuf>, options: RenderOptions) -> Self {
        Self {
            content_root: content_root.into(),
            options,
            current_path: None,
            state: ViewState::Empty,
        }
    }

    /// The content path derived from the most recent navigation, if any.
    pub fn current_path(&self) -> Option<&str> {
        self.current_path.as_deref()
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// The last successfully rendered document, if any.
    pub fn rendered(&self) -> Option<&RenderedArticle> {
        match &self.state {
            ViewState::Loaded(article) => Some(article),
            ViewState::Empty => None,
        }
    }

    /// Handle one navigation: derive the content path from `params`, fetch,
    /// render, and replace the current document.
    ///
    /// On failure the prior document (if any) remains displayed and the
    /// error is returned to the caller; the current path still reflects the
    /// failed navigation.
    pub async fn navigate(&mut self, params: &RouteParams) -> Result<(), ViewError> {
        let content_path = route::content_path(params);
        eprintln!("[route] title={:?} path={}", params.title(), content_path);
        self.current_path = Some(content_path.clone());

        match fetch_and_render(&self.content_root, &content_path, &self.options).await {
            Ok(article) => {
                eprintln!("[view] path={} status=loaded", content_path);
                self.state = ViewState::Loaded(article);
                Ok(())
            }
            Err(e) => {
                eprintln!("[view] path={} status=failed err={}", content_path, e);
                Err(e)
            }
        }
    }

    /// Drive this view from a route-parameter stream on a dedicated task.
    ///
    /// Each observed snapshot triggers [`navigate`](Self::navigate); after a
    /// successful navigation the rendered document is published on the
    /// handle. The task ends when the route sender is dropped or the handle
    /// shuts it down.
    pub fn spawn(mut self, mut routes: RouteReceiver) -> ViewHandle {
        let (tx, rx) = watch::channel(None::<RenderedArticle>);

        let task = tokio::spawn(async move {
            while routes.changed().await.is_ok() {
                let params = routes.borrow_and_update().clone();
                if self.navigate(&params).await.is_ok() {
                    let _ = tx.send(self.rendered().cloned());
                }
                // Failed navigation: prior published document stands.
            }
            eprintln!("[view] route stream closed");
        });

        ViewHandle { task, rendered: rx }
    }
}

/// Handle to a spawned view driver.
///
/// Dropping the handle (or calling [`shutdown`](Self::shutdown)) aborts the
/// driver task and thereby unregisters the route subscription.
#[derive(Debug)]
pub struct ViewHandle {
    task: JoinHandle<()>,
    rendered: watch::Receiver<Option<RenderedArticle>>,
}

impl ViewHandle {
    /// The most recently published document, if any navigation succeeded yet.
    pub fn rendered(&self) -> Option<RenderedArticle> {
        self.rendered.borrow().clone()
    }

    /// Wait for the next published document. Returns `false` once the driver
    /// task has ended.
    pub async fn changed(&mut self) -> bool {
        self.rendered.changed().await.is_ok()
    }

    /// Tear the view down, unregistering the route subscription.
    pub fn shutdown(self) {
        self.task.abort();
        eprintln!("[view] listener unregistered");
    }
}

impl Drop for ViewHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
