//! Markdown-to-HTML conversion.
//!
//! Converts article markdown to HTML using comrak with GFM extensions.
//! Heading metadata (level, text, anchor ID) is extracted for TOC
//! construction, fenced code blocks are syntax-highlighted server-side with
//! syntect, and relative links between articles are rewritten to article
//! routes.
//!
//! Whether raw HTML in the markdown source passes through to the output is a
//! configuration choice ([`RenderOptions::allow_raw_html`]), not a hardcoded
//! default. Article content is first-party, so passthrough is the default;
//! `--sanitize` turns it off.

use std::collections::HashMap;
use std::sync::OnceLock;

use comrak::{
    arena_tree::NodeEdge,
    format_html,
    nodes::{AstNode, NodeValue},
    parse_document, Arena, Options,
};
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Rendering configuration.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Pass raw HTML in the markdown source through to the output verbatim.
    ///
    /// `true` trusts the content as first-party (a `<script>` tag in an
    /// article renders as-is). `false` makes comrak strip raw HTML and
    /// replace it with a comment placeholder.
    pub allow_raw_html: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            allow_raw_html: true,
        }
    }
}

/// A heading extracted from the document for TOC construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingEntry {
    /// Heading level (1–6).
    pub level: u8,
    /// Plain-text content of the heading.
    pub text: String,
    /// URL-safe anchor ID, deduplicated within the document.
    ///
    /// The first occurrence of a heading slug is bare (e.g. `my-heading`);
    /// subsequent occurrences receive a numeric suffix (`my-heading-1`).
    pub anchor_id: String,
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Build comrak render options with GFM extensions.
///
/// GFM extensions: strikethrough, tables, autolinks, task lists.
/// `render.unsafe_` follows [`RenderOptions::allow_raw_html`].
fn make_options(opts: &RenderOptions) -> Options<'static> {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options.render.unsafe_ = opts.allow_raw_html;
    options
}

/// Convert heading text to a URL-safe anchor slug.
///
/// Algorithm: lowercase the text, map spaces/hyphens/underscores to `-`,
/// strip all other non-alphanumeric characters, collapse consecutive hyphens,
/// and trim leading/trailing hyphens.
fn slugify(text: &str) -> String {
    let mut slug = String::new();
    for c in text.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if c == ' ' || c == '-' || c == '_' {
            if !slug.ends_with('-') {
                slug.push('-');
            }
        }
        // all other characters are dropped
    }
    slug.trim_matches('-').to_owned()
}

/// Recursively collect plain-text content of a heading AST node.
fn collect_heading_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut text = String::new();
    for child in node.children() {
        match &child.data.borrow().value {
            NodeValue::Text(s) => text.push_str(s),
            NodeValue::Code(c) => text.push_str(&c.literal),
            NodeValue::SoftBreak | NodeValue::LineBreak => text.push(' '),
            _ => text.push_str(&collect_heading_text(child)),
        }
    }
    text
}

/// Minimal HTML entity escaping for text content and attribute values.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Inject `id` attributes into heading elements in the rendered HTML fragment.
///
/// Performs sequential first-occurrence replacements: `<hN>` → `<hN id="...">`.
/// Raw `<hN>` tags hand-written inside the article body would also match; an
/// article that hand-writes heading tags gets its anchors shifted, nothing
/// worse.
fn inject_heading_ids(html: &str, headings: &[HeadingEntry]) -> String {
    let mut result = html.to_owned();
    for heading in headings {
        let tag = format!("<h{}>", heading.level);
        let with_id = format!("<h{} id=\"{}\">", heading.level, heading.anchor_id);
        result = result.replacen(&tag, &with_id, 1);
    }
    result
}

/// Build the `<ul>…</ul>` HTML for the TOC sidebar.
///
/// Returns an empty string when `headings` is empty.
fn build_toc_html(headings: &[HeadingEntry]) -> String {
    if headings.is_empty() {
        return String::new();
    }
    let mut html = String::from("<ul>\n");
    for heading in headings {
        let class = format!("toc-h{}", heading.level);
        let anchor = heading.anchor_id.as_str(); // already a URL-safe slug
        let text = html_escape(&heading.text);
        html.push_str(&format!(
            "<li class=\"{class}\"><a href=\"#{anchor}\">{text}</a></li>\n",
        ));
    }
    html.push_str("</ul>\n");
    html
}

// ---------------------------------------------------------------------------
// Syntax highlighting
// ---------------------------------------------------------------------------

fn syntax_set() -> &'static SyntaxSet {
    static SET: OnceLock<SyntaxSet> = OnceLock::new();
    SET.get_or_init(SyntaxSet::load_defaults_newlines)
}

fn theme_set() -> &'static ThemeSet {
    static SET: OnceLock<ThemeSet> = OnceLock::new();
    SET.get_or_init(ThemeSet::load_defaults)
}

/// Theme used for server-side code highlighting.
const HIGHLIGHT_THEME: &str = "InspiredGitHub";

/// Highlight a fenced code block, returning a `<pre>`-wrapped HTML fragment.
///
/// Returns `None` when the language token is unknown to the default syntax
/// set; the caller falls back to comrak's plain `<pre><code>` rendering.
fn highlight_code(lang: &str, code: &str) -> Option<String> {
    let set = syntax_set();
    let syntax = set.find_syntax_by_token(lang)?;
    let theme = &theme_set().themes[HIGHLIGHT_THEME];
    highlighted_html_for_string(code, set, syntax, theme).ok()
}

/// Replace fenced code blocks carrying a recognised language tag with
/// syntect-highlighted HTML fragments.
///
/// The first whitespace-delimited token of the fence info string is taken as
/// the language. Blocks without an info string, or with an unrecognised
/// token, are left for comrak's default code-block rendering.
///
/// Returns the number of blocks highlighted.
fn highlight_code_blocks<'a>(root: &'a AstNode<'a>) -> usize {
    let mut highlighted = 0usize;

    for node in root.descendants() {
        let replacement = {
            let data = node.data.borrow();
            match &data.value {
                NodeValue::CodeBlock(ncb) if ncb.fenced => ncb
                    .info
                    .split_whitespace()
                    .next()
                    .and_then(|lang| highlight_code(lang, &ncb.literal)),
                _ => None,
            }
        };

        if let Some(raw_html) = replacement {
            node.data.borrow_mut().value = NodeValue::Raw(raw_html);
            highlighted += 1;
        }
    }

    highlighted
}

// ---------------------------------------------------------------------------
// Article link rewriting
// ---------------------------------------------------------------------------

/// Split a URL into its base path and trailing suffix (query string and/or
/// fragment). The suffix starts at the first `?` or `#`, whichever comes
/// first, and may be empty.
fn split_url_suffix(url: &str) -> (&str, &str) {
    match url.find(|c| c == '?' || c == '#') {
        Some(pos) => (&url[..pos], &url[pos..]),
        None => (url, ""),
    }
}

/// Rewrite a relative `other-article.md` link to its article route.
///
/// # Returns
/// - `None`: the URL is external, absolute, fragment-only, not a `.md` file,
///   or not a bare file name (the catalog is flat). Leave as-is.
/// - `Some(new_url)`: `/articles/<stem>` with any query string and fragment
///   preserved.
fn rewrite_article_url(url: &str) -> Option<String> {
    if url.starts_with("http://")
        || url.starts_with("https://")
        || url.starts_with("//")
        || url.starts_with("mailto:")
        || url.starts_with('#')
        || url.starts_with('/')
    {
        return None;
    }

    let (base, suffix) = split_url_suffix(url);
    if base.contains('/') {
        return None;
    }
    let stem = base.strip_suffix(".md")?;
    if stem.is_empty() {
        return None;
    }
    Some(format!("/articles/{stem}{suffix}"))
}

/// Traverse the comrak AST and rewrite relative article links in-place.
///
/// Only `NodeValue::Link` nodes are touched; image URLs point at real static
/// assets and must keep their file paths.
///
/// # Returns
/// `(rewritten, skipped)` — counts of links rewritten and left unchanged.
fn rewrite_article_links<'a>(root: &'a AstNode<'a>) -> (usize, usize) {
    let mut rewritten = 0usize;
    let mut skipped = 0usize;

    for node in root.descendants() {
        let mut data = node.data.borrow_mut();
        let url = match &mut data.value {
            NodeValue::Link(nl) => &mut nl.url,
            _ => continue,
        };

        match rewrite_article_url(url) {
            Some(new_url) => {
                *url = new_url;
                rewritten += 1;
            }
            None => {
                skipped += 1;
            }
        }
    }

    (rewritten, skipped)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Render article markdown to HTML and extract heading metadata.
///
/// # Returns
/// `(html, headings)` where `html` is the rendered fragment (heading `id`
/// attributes already injected) and `headings` is the ordered list of
/// [`HeadingEntry`] values for TOC construction.
pub fn render_markdown(input: &str, opts: &RenderOptions) -> (String, Vec<HeadingEntry>) {
    let arena = Arena::new();
    let options = make_options(opts);
    let root = parse_document(&arena, input, &options);

    let highlighted = highlight_code_blocks(root);
    let (rewritten, skipped) = rewrite_article_links(root);

    // Extract headings with per-document slug deduplication.
    let mut entries: Vec<HeadingEntry> = Vec::new();
    // Maps base slug → number of times it has been seen so far.
    let mut slug_counter: HashMap<String, usize> = HashMap::new();

    for edge in root.traverse() {
        if let NodeEdge::Start(node) = edge {
            if let NodeValue::Heading(nh) = &node.data.borrow().value {
                let level = nh.level;
                let text = collect_heading_text(node);
                let base_slug = slugify(&text);

                let count = slug_counter.entry(base_slug.clone()).or_insert(0);
                let anchor_id = if *count == 0 {
                    *count = 1;
                    base_slug.clone()
                } else {
                    let n = *count;
                    *count += 1;
                    format!("{}-{}", base_slug, n)
                };

                entries.push(HeadingEntry {
                    level,
                    text,
                    anchor_id,
                });
            }
        }
    }

    let mut html_bytes = Vec::new();
    format_html(root, &options, &mut html_bytes).expect("comrak HTML formatting should not fail");
    let html = String::from_utf8(html_bytes).expect("comrak output must be valid UTF-8");

    eprintln!(
        "[render] headings={} highlighted={} links_rewritten={} links_skipped={}",
        entries.len(),
        highlighted,
        rewritten,
        skipped
    );

    (inject_heading_ids(&html, &entries), entries)
}

/// Build the full HTML page shell: `<!DOCTYPE html>` with sticky TOC sidebar
/// and rendered content area.
///
/// # Parameters
/// - `body_html`: rendered article fragment from [`render_markdown`], or any
///   other HTML body (index page).
/// - `headings`: ordered heading entries for the TOC; pass `&[]` to omit it.
/// - `page_title`: plain-text page title (escaped here).
pub fn build_page_shell(body_html: &str, headings: &[HeadingEntry], page_title: &str) -> String {
    let title = html_escape(page_title);
    let toc_html = build_toc_html(headings);

    format!(
        "<!DOCTYPE html>\n\
<html lang=\"en\">\n\
<head>\n\
<meta charset=\"utf-8\">\n\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
<title>{title} · mdtutor</title>\n\
<link rel=\"stylesheet\" href=\"/assets/mdtutor.css\">\n\
</head>\n\
<body>\n\
<header class=\"site-header\"><a href=\"/\">mdtutor</a></header>\n\
<div class=\"layout\">\n\
<nav class=\"toc-sidebar\">\n\
{toc_html}</nav>\n\
<main class=\"content\">\n\
{body_html}</main>\n\
</div>\n\
<script src=\"/assets/mdtutor.js\"></script>\n\
</body>\n\
</html>\n"
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
