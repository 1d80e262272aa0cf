//! Program catalog: the list of listing pages to serve as feeds.
//!
//! The catalog is a JSON array, read from a local file or fetched over
//! HTTP(S):
//!
//! ```json
//! [
//!   {
//!     "prefix": "/crime",
//!     "name": "Crime Stories",
//!     "url": "https://www.example.com/tamil/crime-stories",
//!     "imageUrl": "https://www.example.com/crime.png",
//!     "categories": ["Drama", "Tamil"]
//!   }
//! ]
//! ```
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

use crate::scrape::{fetch_bytes, FetchError};

/// Path reserved for the aggregate feed.
pub const MASTER_PATH: &str = "/master";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to fetch catalog: {0}")]
    Fetch(#[from] FetchError),

    #[error("Invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Program {program:?} has an invalid {field}: {value:?} ({source})")]
    InvalidUrl {
        program: String,
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid program path {0:?}: must be a literal '/'-prefixed route other than '/' or '/master'")]
    InvalidPath(String),

    #[error("Duplicate program path {0:?}")]
    DuplicatePath(String),
}

// ============================================================================
// Catalog Types
// ============================================================================

/// One program: a listing page served as its own feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Route the feed is served on, e.g. `/crime`
    pub path: String,
    pub name: String,
    /// Listing page URL
    pub url: Url,
    /// Catalog artwork, used when the page has none
    pub image_url: Option<Url>,
    /// Tags copied onto every episode, in order
    pub categories: Vec<String>,
}

/// One catalog JSON entry as written on disk, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub prefix: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

/// Where the catalog JSON comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogSource {
    File(PathBuf),
    Url(Url),
}

impl CatalogSource {
    /// Treats `http://` and `https://` values as URLs and anything else as a path.
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            if let Ok(url) = Url::parse(trimmed) {
                return CatalogSource::Url(url);
            }
        }
        CatalogSource::File(PathBuf::from(trimmed))
    }
}

impl std::fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogSource::File(path) => write!(f, "{}", path.display()),
            CatalogSource::Url(url) => write!(f, "{url}"),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Loads and validates the catalog.
pub async fn load_catalog(
    client: &reqwest::Client,
    source: &CatalogSource,
) -> Result<Vec<Program>, CatalogError> {
    let bytes = match source {
        CatalogSource::File(path) => tokio::fs::read(path).await?,
        CatalogSource::Url(url) => fetch_bytes(client, url).await?,
    };
    let programs = parse_catalog(&bytes)?;
    tracing::info!(source = %source, programs = programs.len(), "Loaded catalog");
    Ok(programs)
}

/// Parses catalog JSON, keeping entry order.
///
/// Paths must be literal routes (see [`is_valid_path`]), must not be `/`
/// or `/master`, and must be unique. An empty `imageUrl` means the program has no catalog artwork.
pub fn parse_catalog(bytes: &[u8]) -> Result<Vec<Program>, CatalogError> {
    let raw: Vec<CatalogEntry> = serde_json::from_slice(bytes)?;
    let mut seen = HashSet::new();

    raw.into_iter()
        .map(|entry| {
            let path = entry.prefix.trim().to_owned();
            if !is_valid_path(&path) {
                return Err(CatalogError::InvalidPath(path));
            }
            if !seen.insert(path.clone()) {
                return Err(CatalogError::DuplicatePath(path));
            }

            let url = parse_url(&entry.name, "url", &entry.url)?;
            let image_url = if entry.image_url.trim().is_empty() {
                None
            } else {
                Some(parse_url(&entry.name, "imageUrl", &entry.image_url)?)
            };

            Ok(Program {
                path,
                name: entry.name,
                url,
                image_url,
                categories: entry.categories,
            })
        })
        .collect()
}

/// A path is a literal route: `/`-prefixed, no empty segments, and no
/// router capture syntax (`:name`, `*rest`, `{name}`).
fn is_valid_path(path: &str) -> bool {
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    if rest.is_empty() || path == MASTER_PATH {
        return false;
    }
    rest.split('/').all(|segment| {
        !segment.is_empty()
            && !segment.starts_with(':')
            && !segment.starts_with('*')
            && !segment.contains(['{', '}'])
    })
}

fn parse_url(program: &str, field: &'static str, value: &str) -> Result<Url, CatalogError> {
    Url::parse(value.trim()).map_err(|source| CatalogError::InvalidUrl {
        program: program.to_owned(),
        field,
        value: value.to_owned(),
        source,
    })
}

// ============================================================================
// Tests
// ============================================================================
