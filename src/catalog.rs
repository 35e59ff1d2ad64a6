//! Article catalog.
//!
//! Scans the `assets/markdown/` directory under the content root and builds
//! the list of available articles. The article slug is the file stem; the
//! display title comes from YAML frontmatter, falling back to the first H1
//! heading, falling back to the slug itself.

use std::io;
use std::path::Path;

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use serde_json::json;

use crate::route;

/// One article known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleEntry {
    /// URL slug, equal to the markdown file stem (e.g. `oop-paradigm`).
    pub slug: String,
    /// Human-readable title for listings.
    pub title: String,
    /// Root-relative content path (e.g. `assets/markdown/oop-paradigm.md`).
    pub content_path: String,
}

/// Split optional YAML frontmatter from an article source.
///
/// Frontmatter is a `---` fence on the very first line, closed by a `---`
/// line. Returns the parsed YAML (if present and valid) and the markdown
/// body. Sources without a leading fence, or with an unterminated fence, are
/// returned whole with no frontmatter.
pub fn split_frontmatter(source: &str) -> (Option<serde_yml::Value>, &str) {
    let after_open = match source
        .strip_prefix("---\n")
        .or_else(|| source.strip_prefix("---\r\n"))
    {
        Some(rest) => rest,
        None => return (None, source),
    };

    let mut offset = 0;
    for line in after_open.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &after_open[..offset];
            let body = &after_open[offset + line.len()..];
            return (serde_yml::from_str(yaml).ok(), body);
        }
        offset += line.len();
    }

    (None, source)
}

/// Extract the `title` key from parsed frontmatter, if any.
pub fn frontmatter_title(frontmatter: Option<&serde_yml::Value>) -> Option<String> {
    frontmatter?
        .get("title")
        .and_then(serde_yml::Value::as_str)
        .map(str::to_owned)
}

/// Extract the text of the first H1 heading from a markdown body.
fn first_h1(body: &str) -> Option<String> {
    let mut in_h1 = false;
    let mut text = String::new();

    for event in Parser::new(body) {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) => in_h1 = true,
            Event::End(TagEnd::Heading(HeadingLevel::H1)) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return None;
                }
                return Some(trimmed.to_owned());
            }
            Event::Text(t) | Event::Code(t) if in_h1 => text.push_str(&t),
            _ => {}
        }
    }

    None
}

/// Derive the display title for an article source.
///
/// Priority: frontmatter `title:` → first H1 heading → the slug.
pub fn display_title(source: &str, slug: &str) -> String {
    let (frontmatter, body) = split_frontmatter(source);
    frontmatter_title(frontmatter.as_ref())
        .or_else(|| first_h1(body))
        .unwrap_or_else(|| slug.to_owned())
}

/// Scan the content root for articles.
///
/// Looks at `<root>/assets/markdown/*.md` (non-recursive). Hidden files are
/// skipped, unreadable files are logged and skipped, and a missing content
/// directory yields an empty catalog rather than an error. Entries are
/// sorted by slug.
pub async fn scan(content_root: &Path) -> io::Result<Vec<ArticleEntry>> {
    let dir = content_root.join(route::CONTENT_DIR);
    let mut entries: Vec<ArticleEntry> = Vec::new();

    let mut read_dir = match tokio::fs::read_dir(&dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            eprintln!("[catalog] dir={} missing", dir.display());
            return Ok(entries);
        }
        Err(e) => return Err(e),
    };

    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with('.') {
            continue;
        }
        let Some(slug) = name.strip_suffix(".md") else {
            continue;
        };
        if !entry.file_type().await?.is_file() {
            continue;
        }

        let source = match tokio::fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(e) => {
                eprintln!("[catalog] file={} skipped err={}", path.display(), e);
                continue;
            }
        };

        entries.push(ArticleEntry {
            slug: slug.to_owned(),
            title: display_title(&source, slug),
            content_path: route::content_path_for_title(slug),
        });
    }

    entries.sort_by(|a, b| a.slug.cmp(&b.slug));
    eprintln!("[catalog] dir={} articles={}", dir.display(), entries.len());
    Ok(entries)
}

/// JSON representation of the catalog for the listing API.
pub fn to_json(entries: &[ArticleEntry]) -> serde_json::Value {
    json!({
        "articles": entries
            .iter()
            .map(|e| {
                json!({
                    "slug": e.slug,
                    "title": e.title,
                    "path": format!("/{}", e.content_path),
                })
            })
            .collect::<Vec<_>>(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    // --- split_frontmatter ---

    #[test]
    fn frontmatter_absent() {
        let (fm, body) = split_frontmatter("# Title\n\nBody.\n");
        assert!(fm.is_none());
        assert_eq!(body, "# Title\n\nBody.\n");
    }

    #[test]
    fn frontmatter_parsed_and_stripped() {
        let source = "---\ntitle: OOP Paradigm\n---\n# Heading\n";
        let (fm, body) = split_frontmatter(source);
        assert_eq!(
            frontmatter_title(fm.as_ref()).as_deref(),
            Some("OOP Paradigm")
        );
        assert_eq!(body, "# Heading\n");
    }

    #[test]
    fn frontmatter_unterminated_is_ignored() {
        let source = "---\ntitle: broken\n\n# Heading\n";
        let (fm, body) = split_frontmatter(source);
        assert!(fm.is_none());
        assert_eq!(body, source);
    }

    #[test]
    fn frontmatter_requires_fence_on_first_line() {
        let source = "\n---\ntitle: nope\n---\n";
        let (fm, body) = split_frontmatter(source);
        assert!(fm.is_none());
        assert_eq!(body, source);
    }

    #[test]
    fn frontmatter_without_title_key() {
        let source = "---\nauthor: someone\n---\nBody.\n";
        let (fm, body) = split_frontmatter(source);
        assert!(fm.is_some());
        assert!(frontmatter_title(fm.as_ref()).is_none());
        assert_eq!(body, "Body.\n");
    }

    #[test]
    fn frontmatter_invalid_yaml_is_dropped() {
        let source = "---\n[ unclosed\n---\nBody.\n";
        let (fm, body) = split_frontmatter(source);
        assert!(fm.is_none());
        assert_eq!(body, "Body.\n");
    }

    // --- display_title ---

    #[test]
    fn title_prefers_frontmatter() {
        let source = "---\ntitle: From Frontmatter\n---\n# From Heading\n";
        assert_eq!(display_title(source, "slug"), "From Frontmatter");
    }

    #[test]
    fn title_falls_back_to_first_h1() {
        assert_eq!(
            display_title("Intro text.\n\n# The Real Title\n", "slug"),
            "The Real Title"
        );
    }

    #[test]
    fn title_falls_back_to_slug() {
        assert_eq!(display_title("no headings here\n", "oop-paradigm"), "oop-paradigm");
    }

    #[test]
    fn first_h1_collects_inline_code() {
        assert_eq!(
            first_h1("# Using `async` blocks\n"),
            Some("Using async blocks".to_owned())
        );
    }

    #[test]
    fn h2_is_not_a_document_title() {
        assert_eq!(first_h1("## Only a section\n"), None);
    }

    // --- scan ---

    fn fixture_root(tag: &str) -> std::path::PathBuf {
        let root = std::env::temp_dir().join(format!("mdtutor_catalog_{}_{}", tag, std::process::id()));
        let dir = root.join(route::CONTENT_DIR);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn scan_lists_articles_sorted_by_slug() {
        let dir = fixture_root("sorted");
        let root = dir.parent().unwrap().parent().unwrap().to_path_buf();
        fs::write(dir.join("zeta.md"), "# Zeta\n").unwrap();
        fs::write(dir.join("alpha.md"), "# Alpha\n").unwrap();

        let entries = scan(&root).await.unwrap();
        let slugs: Vec<&str> = entries.iter().map(|e| e.slug.as_str()).collect();
        assert_eq!(slugs, vec!["alpha", "zeta"]);
        assert_eq!(entries[0].title, "Alpha");
        assert_eq!(entries[0].content_path, "assets/markdown/alpha.md");

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn scan_skips_hidden_and_non_markdown() {
        let dir = fixture_root("skips");
        let root = dir.parent().unwrap().parent().unwrap().to_path_buf();
        fs::write(dir.join("real.md"), "# Real\n").unwrap();
        fs::write(dir.join(".draft.md"), "# Draft\n").unwrap();
        fs::write(dir.join("notes.txt"), "not markdown").unwrap();

        let entries = scan(&root).await.unwrap();
        let slugs: Vec<&str> = entries.iter().map(|e| e.slug.as_str()).collect();
        assert_eq!(slugs, vec!["real"]);

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn scan_missing_dir_yields_empty_catalog() {
        let root = std::env::temp_dir().join(format!("mdtutor_catalog_missing_{}", std::process::id()));
        let entries = scan(&root).await.unwrap();
        assert!(entries.is_empty());
    }

    // --- to_json ---

    #[test]
    fn json_listing_shape() {
        let entries = vec![ArticleEntry {
            slug: "oop-paradigm".to_owned(),
            title: "OOP Paradigm".to_owned(),
            content_path: "assets/markdown/oop-paradigm.md".to_owned(),
        }];
        let value = to_json(&entries);
        let articles = value["articles"].as_array().unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0]["slug"], "oop-paradigm");
        assert_eq!(articles[0]["title"], "OOP Paradigm");
        assert_eq!(articles[0]["path"], "/assets/markdown/oop-paradigm.md");
    }
}
