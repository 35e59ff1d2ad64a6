//! mdtutor: a markdown tutorial-article viewer and server.
//!
//! Articles are addressed by a `title` route parameter, resolved to
//! `assets/markdown/<title>.md` under a content root, fetched, and rendered
//! to HTML. The crate exposes the pipeline both as an embeddable view model
//! ([`view::ArticleView`] driven by a [`route`] parameter stream) and as an
//! HTTP server ([`serve::run_serve`]).

pub mod catalog;
pub mod html;
pub mod route;
pub mod serve;
pub mod view;
pub mod web_assets;
