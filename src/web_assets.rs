//! Embedded static web assets.
//!
//! Both files are compiled into the binary via `include_str!` so the binary
//! is fully self-contained; no external asset files need to be distributed.

/// Stylesheet for the article viewer.
///
/// Loaded from `src/assets/mdtutor.css` at compile time.
pub const CSS: &str = include_str!("assets/mdtutor.css");

/// JavaScript for the article viewer.
///
/// Handles TOC active-heading highlighting via `IntersectionObserver`.
/// Loaded from `src/assets/mdtutor.js` at compile time.
pub const JS: &str = include_str!("assets/mdtutor.js");
