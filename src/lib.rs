//! The library code for the `stapol` static site generator. The build
//! pipeline can be broken down into distinct steps, each owned by one
//! module:
//!
//! 1. Loading documents from source files on disk ([`crate::content`])
//! 2. Resolving each document's permalink from a template like
//!    `blog/{year}/{title}.html` ([`crate::permalink`])
//! 3. Indexing documents by tag ([`crate::tag`])
//! 4. Paginating the main collection and each tag's collection into
//!    fixed-size, navigable pages ([`crate::page`])
//! 5. Rendering every document and index page through the templating
//!    collaborator and writing the results ([`crate::render`],
//!    [`crate::build`])
//!
//! Alongside the pages themselves, a build writes an Atom feed
//! ([`crate::feed`]) and a sitemap ([`crate::sitemap`]). Production builds
//! additionally run the rendered output through post-processors
//! ([`crate::minify`]).
//!
//! The [`crate::build`] module stitches the steps together: a malformed
//! document is recorded and skipped so one bad post can't take down the
//! build, while structural problems (bad configuration, output-path
//! collisions, I/O on the content directory) abort it.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod config;
pub mod content;
pub mod feed;
pub mod minify;
pub mod page;
pub mod permalink;
pub mod render;
pub mod sitemap;
pub mod tag;
