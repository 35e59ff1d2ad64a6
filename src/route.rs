//! Route parameters and content-path derivation.
//!
//! A navigation delivers a snapshot of route parameters; the only parameter
//! this viewer consumes is `title`. The content path is derived from it by
//! plain substitution into a fixed template — no escaping, no validation.
//! Containment checks happen at the serving layer, not here.

use std::collections::HashMap;

use tokio::sync::watch;

/// Fixed location of article sources relative to the content root.
pub const CONTENT_DIR: &str = "assets/markdown";

/// Placeholder substituted when a navigation carries no `title` parameter.
///
/// The derived path (`assets/markdown/undefined.md`) points at nothing and
/// the subsequent fetch fails; no special-casing happens earlier than that.
pub const MISSING_TITLE: &str = "undefined";

/// A snapshot of route parameters delivered by one navigation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams(HashMap<String, String>);

impl RouteParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for the common single-parameter navigation.
    pub fn with_title(title: &str) -> Self {
        let mut params = Self::new();
        params.insert("title", title);
        params
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.0.insert(name.to_owned(), value.to_owned());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// The `title` parameter, if this navigation carried one.
    pub fn title(&self) -> Option<&str> {
        self.get("title")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Derive the content-file path for a parameter snapshot.
///
/// Template: `assets/markdown/<title>.md`. The title is substituted verbatim;
/// a missing title substitutes the literal [`MISSING_TITLE`] placeholder.
pub fn content_path(params: &RouteParams) -> String {
    content_path_for_title(params.title().unwrap_or(MISSING_TITLE))
}

/// Derive the content-file path for a bare title string.
pub fn content_path_for_title(title: &str) -> String {
    format!("{CONTENT_DIR}/{title}.md")
}

/// Receiving half of the route-parameter stream.
///
/// A watch channel carries one snapshot per navigation and overwrites rather
/// than queues: a consumer that falls behind observes only the latest
/// snapshot. The stream never completes on its own; it ends when the sender
/// is dropped.
pub type RouteReceiver = watch::Receiver<RouteParams>;

/// Sending half of the route-parameter stream (held by the navigation layer).
pub type RouteSender = watch::Sender<RouteParams>;

/// Create a route-parameter stream.
///
/// The initial value is an empty snapshot meaning "no navigation yet";
/// consumers must not treat it as a navigation to `undefined`.
pub fn route_channel() -> (RouteSender, RouteReceiver) {
    watch::channel(RouteParams::new())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_path_uses_fixed_template() {
        let params = RouteParams::with_title("oop-paradigm");
        assert_eq!(content_path(&params), "assets/markdown/oop-paradigm.md");
    }

    #[test]
    fn content_path_substitutes_title_verbatim() {
        // No escaping or validation of the title is performed here.
        let params = RouteParams::with_title("weird title!");
        assert_eq!(content_path(&params), "assets/markdown/weird title!.md");
    }

    #[test]
    fn missing_title_yields_undefined_placeholder() {
        let params = RouteParams::new();
        assert_eq!(content_path(&params), "assets/markdown/undefined.md");
    }

    #[test]
    fn other_parameters_are_ignored() {
        let mut params = RouteParams::with_title("rest-basics");
        params.insert("lang", "en");
        params.insert("section", "intro");
        assert_eq!(content_path(&params), "assets/markdown/rest-basics.md");
    }

    #[test]
    fn repeated_navigation_overwrites_title() {
        let mut params = RouteParams::with_title("first");
        params.insert("title", "second");
        assert_eq!(content_path(&params), "assets/markdown/second.md");
    }

    #[tokio::test]
    async fn route_channel_delivers_latest_snapshot_only() {
        let (tx, mut rx) = route_channel();

        // Two navigations before the consumer wakes up: only the second is seen.
        tx.send(RouteParams::with_title("a")).unwrap();
        tx.send(RouteParams::with_title("b")).unwrap();

        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.title(), Some("b"));
    }

    #[tokio::test]
    async fn route_channel_initial_snapshot_is_empty() {
        let (_tx, rx) = route_channel();
        assert!(rx.borrow().is_empty());
    }

    #[tokio::test]
    async fn route_channel_closes_when_sender_dropped() {
        let (tx, mut rx) = route_channel();
        drop(tx);
        assert!(rx.changed().await.is_err());
    }
}
