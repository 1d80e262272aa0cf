//! Listing page scraping pipeline.
//!
//! Fetcher → Extractor → Enricher (fan-out/fan-in) → Assembler.
//!
//! - [`fetcher`] - Page `GET` and media `HEAD` over a shared `reqwest::Client`
//! - [`extractor`] - Channel metadata and episode candidates from listing HTML
//! - [`enricher`] - Bounded worker pool filling in enclosure length and type
//! - [`assembler`] - Per-program and master feed builders

pub mod assembler;
pub mod enricher;
pub mod extractor;
pub mod fetcher;

pub use assembler::{
    build_channel, BuildError, FeedBuilder, MasterFeedBuilder, MasterMeta, ProgramFeedBuilder,
};
pub use enricher::{enrich, EnrichOutcome, DEFAULT_WORKERS};
pub use extractor::{extract_page, split_compound_text, ChannelMeta, ExtractError, ExtractedPage};
pub use fetcher::{build_client, fetch_bytes, probe_media, FetchError, MediaProbe};
