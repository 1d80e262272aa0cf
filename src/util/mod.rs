//! Utility functions shared by the scraper and the feed writer.
//!
//! - **Text cleanup**: Strips characters XML 1.0 cannot carry and collapses
//!   the whitespace runs that HTML text nodes are full of.

mod text;

pub use text::{clean_text, strip_control_chars};
