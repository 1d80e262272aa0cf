//! Catalog discovery: crawls a site's `Podcast` menu and produces catalog
//! entries for every program it can reach.
//!
//! The landing page's `Podcast` menu links either straight to a program
//! (last path segment is numeric) or to a category page listing programs
//! in `.podcast_button` blocks. Each program page is then visited once for
//! its `.pod_desc_img img` artwork.
//!
//! HTML is parsed on the calling task only; worker tasks move bytes.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tokio::task::JoinSet;
use url::Url;

use crate::catalog::{CatalogEntry, MASTER_PATH};
use crate::scrape::{fetch_bytes, FetchError};
use crate::util::clean_text;

const MENU_LABEL: &str = "Podcast";
const MENU_ANCHOR: &str = "li a";
const PROGRAM_BUTTON: &str = ".podcast_button";
const ARTWORK: &str = ".pod_desc_img img";

/// Path used when a program name has no usable initials.
const FALLBACK_PATH: &str = "/podcast";

#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("No \"Podcast\" menu found on {0}")]
    MenuNotFound(String),

    #[error("Fetch of {0} did not complete")]
    Incomplete(String),
}

#[derive(Debug)]
struct Found {
    name: String,
    url: Url,
}

/// Crawls `base_url` and returns catalog entries in discovery order.
///
/// Programs linked from the menu come first, then each category's programs
/// in page order. Programs seen twice (same URL) are kept once. A category
/// page that cannot be loaded aborts discovery; a program page that cannot
/// be loaded only leaves that entry without artwork.
pub async fn discover(
    client: &reqwest::Client,
    base_url: &Url,
    workers: usize,
) -> Result<Vec<CatalogEntry>, DiscoverError> {
    let landing = fetch_bytes(client, base_url).await?;
    let (categories, mut programs) = menu_links(&String::from_utf8_lossy(&landing), base_url)?;
    tracing::info!(
        categories = categories.len(),
        programs = programs.len(),
        "Read podcast menu"
    );

    let category_pages = fetch_pages(client, &categories, workers).await;
    for (url, page) in categories.iter().zip(category_pages) {
        let bytes = page.ok_or_else(|| DiscoverError::Incomplete(url.to_string()))??;
        let listed = category_programs(&String::from_utf8_lossy(&bytes), url);
        tracing::debug!(category = %url, programs = listed.len(), "Read category page");
        programs.extend(listed);
    }

    let mut seen = HashSet::new();
    programs.retain(|p| seen.insert(p.url.clone()));

    let urls: Vec<Url> = programs.iter().map(|p| p.url.clone()).collect();
    let program_pages = fetch_pages(client, &urls, workers).await;

    let mut taken: HashSet<String> = HashSet::from([MASTER_PATH.to_string()]);
    let entries = programs
        .into_iter()
        .zip(program_pages)
        .map(|(program, page)| {
            let image_url = match page {
                Some(Ok(bytes)) => artwork(&String::from_utf8_lossy(&bytes), &program.url)
                    .map(|url| url.to_string())
                    .unwrap_or_default(),
                Some(Err(e)) => {
                    tracing::warn!(url = %program.url, error = %e, "Failed to load program page");
                    String::new()
                }
                None => String::new(),
            };
            CatalogEntry {
                prefix: unique_path(&make_path(&program.name), &mut taken),
                name: program.name,
                url: program.url.to_string(),
                image_url,
                categories: Vec::new(),
            }
        })
        .collect::<Vec<_>>();

    tracing::info!(programs = entries.len(), "Discovered catalog");
    Ok(entries)
}

/// Route path built from the lowercase ASCII initials of each word.
///
/// `"Crime Stories"` becomes `/cs`.
pub fn make_path(name: &str) -> String {
    let initials: String = name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if initials.is_empty() {
        FALLBACK_PATH.to_string()
    } else {
        format!("/{initials}")
    }
}

/// Appends `2`, `3`, ... to `path` until it is not in `taken`, then claims it.
fn unique_path(path: &str, taken: &mut HashSet<String>) -> String {
    let mut candidate = path.to_string();
    let mut n = 2;
    while taken.contains(&candidate) {
        candidate = format!("{path}{n}");
        n += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

/// Splits the `Podcast` menu into category pages and direct program links.
fn menu_links(html: &str, base_url: &Url) -> Result<(Vec<Url>, Vec<Found>), DiscoverError> {
    let document = Html::parse_document(html);
    let menu = selector(MENU_ANCHOR)
        .and_then(|anchors| {
            document
                .select(&anchors)
                .find(|a| clean_text(&a.text().collect::<String>()) == MENU_LABEL)
        })
        .and_then(|a| a.parent())
        .and_then(ElementRef::wrap)
        .ok_or_else(|| DiscoverError::MenuNotFound(base_url.to_string()))?;

    let mut categories = Vec::new();
    let mut programs = Vec::new();
    let Some(anchor) = selector("a") else {
        return Ok((categories, programs));
    };

    for a in menu.select(&anchor) {
        let Some(href) = a.value().attr("href").map(str::trim) else {
            continue;
        };
        if !href.starts_with("http") {
            continue;
        }
        let Ok(url) = Url::parse(href) else {
            tracing::warn!(href = %href, "Skipping unparseable menu link");
            continue;
        };

        if is_program_link(&url) {
            programs.push(Found {
                name: clean_text(&a.text().collect::<String>()),
                url,
            });
        } else {
            categories.push(url);
        }
    }

    Ok((categories, programs))
}

fn is_program_link(url: &Url) -> bool {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .is_some_and(|last| !last.is_empty() && last.chars().all(|c| c.is_ascii_digit()))
}

fn category_programs(html: &str, page_url: &Url) -> Vec<Found> {
    let document = Html::parse_document(html);
    let (Some(button), Some(name), Some(link)) =
        (selector(PROGRAM_BUTTON), selector("p"), selector("a"))
    else {
        return Vec::new();
    };

    document
        .select(&button)
        .filter_map(|block| {
            let name = block
                .select(&name)
                .next()
                .map(|p| clean_text(&p.text().collect::<String>()))
                .filter(|n| !n.is_empty())?;
            let href = block.select(&link).next()?.value().attr("href")?.trim();
            match page_url.join(href) {
                Ok(url) if !href.is_empty() => Some(Found { name, url }),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(href = %href, error = %e, "Skipping unparseable program link");
                    None
                }
            }
        })
        .collect()
}

fn artwork(html: &str, page_url: &Url) -> Option<Url> {
    let document = Html::parse_document(html);
    let img = selector(ARTWORK)?;
    let src = document.select(&img).next()?.value().attr("src")?.trim();
    if src.is_empty() {
        return None;
    }
    page_url.join(src).ok()
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Fetches every URL with at most `workers` requests in flight.
///
/// Results line up with `urls`. `None` marks a task that did not finish.
async fn fetch_pages(
    client: &reqwest::Client,
    urls: &[Url],
    workers: usize,
) -> Vec<Option<Result<Vec<u8>, FetchError>>> {
    let mut results: Vec<Option<Result<Vec<u8>, FetchError>>> =
        std::iter::repeat_with(|| None).take(urls.len()).collect();
    let mut pending = urls.iter().cloned().enumerate();
    let mut set = JoinSet::new();

    for (index, url) in pending.by_ref().take(workers.max(1)) {
        let client = client.clone();
        set.spawn(async move { (index, fetch_bytes(&client, &url).await) });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => tracing::error!(error = %e, "Page fetch task terminated abnormally"),
        }
        if let Some((index, url)) = pending.next() {
            let client = client.clone();
            set.spawn(async move { (index, fetch_bytes(&client, &url).await) });
        }
    }

    results
}
