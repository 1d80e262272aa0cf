//! Serves RSS 2.0 podcast feeds scraped from HTML program listing pages.
//!
//! - [`catalog`] - Program list loaded from JSON
//! - [`discover`] - Builds a catalog by crawling a site's podcast menu
//! - [`scrape`] - Fetch, extract, enrich and assemble a program's episodes
//! - [`feed`] - Feed model, field codecs, writer and reader
//! - [`server`] - axum routes and the per-endpoint cache gate
//! - [`config`] - TOML process configuration

pub mod catalog;
pub mod config;
pub mod discover;
pub mod feed;
pub mod scrape;
pub mod server;
pub mod util;
