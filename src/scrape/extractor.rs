//! Episode and channel metadata extraction from a program listing page.
//!
//! The listing markup is a single known dialect:
//!
//! ```html
//! <link rel="canonical" href="//www.example.com/show">
//! <div class="pod_desc_img"><img src="/art/show.png"></div>
//! <div class="pod_desc_txt"><h1>Show</h1><p>About the show</p></div>
//! <div class="podcast_button">
//!   <a data-podname="Episode 12 - A story about crime - January 5, 2020"
//!      data-podcast="https://cdn.example.com/ep12.mp3">Play</a>
//! </div>
//! ```
//!
//! Parsing is synchronous and finishes before any network work starts;
//! `scraper::Html` is not `Send` and must not live across an await point.

use chrono::{FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

use crate::catalog::Program;
use crate::feed::{Episode, FeedDate, Guid};
use crate::util::{clean_text, strip_control_chars};

/// Asia/Kolkata has no DST, so a fixed +05:30 offset is exact.
const IST_OFFSET_SECS: i32 = 5 * 3600 + 1800;

/// Long-form date layout used in episode text, e.g. `January 5, 2020`.
const EPISODE_DATE_FORMAT: &str = "%B %d, %Y";

const CHANNEL_TITLE: &str = ".pod_desc_txt h1";
const CHANNEL_DESCRIPTION: &str = ".pod_desc_txt p";
const CANONICAL_LINK: &str = r#"link[rel="canonical"]"#;
const ARTWORK: &str = ".pod_desc_img img";
const EPISODE_BUTTON: &str = ".podcast_button a";

/// Errors that make a listing page unusable.
///
/// Problems with individual episodes are never errors; they degrade to
/// fallbacks and are logged.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to parse canonical link {value:?}: {source}")]
    CanonicalLink {
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Failed to parse artwork url {value:?}: {source}")]
    Artwork {
        value: String,
        #[source]
        source: url::ParseError,
    },
}

/// Channel-level fields scraped from a listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMeta {
    pub title: String,
    pub description: String,
    pub link: Url,
    pub artwork: Option<Url>,
}

/// Everything a listing page yields before enrichment.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub meta: ChannelMeta,
    /// Every episode candidate in document order, unfiltered
    pub episodes: Vec<Episode>,
}

/// Title, description and publish date recovered from compound episode text.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundText {
    pub title: String,
    pub description: String,
    pub pub_date: FeedDate,
}

/// The fixed Asia/Kolkata offset.
pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Current time in Asia/Kolkata, truncated to whole seconds.
pub fn now_ist() -> FeedDate {
    let now = Utc::now().with_timezone(&ist());
    now - chrono::Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos()))
}

/// Parses a long-form calendar date as midnight in Asia/Kolkata.
fn parse_episode_date(value: &str) -> Option<FeedDate> {
    let date = NaiveDate::parse_from_str(value.trim(), EPISODE_DATE_FORMAT).ok()?;
    ist()
        .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
        .single()
}

/// Splits `"Title - description - Month Day, Year"` into its parts.
///
/// The last hyphen starts the date segment and the first hyphen ends the
/// title. The text strictly between them is the description; when the two
/// hyphens coincide the description repeats the title. A description that
/// itself contains hyphens is cut at the first one, which is accepted.
///
/// When there is no hyphen, or the trailing segment is not a date, the
/// whole trimmed text becomes both title and description and the date is
/// the current time.
pub fn split_compound_text(text: &str) -> CompoundText {
    let text = text.trim();
    let whole = || CompoundText {
        title: text.to_owned(),
        description: text.to_owned(),
        pub_date: now_ist(),
    };

    let (Some(first), Some(last)) = (text.find('-'), text.rfind('-')) else {
        return whole();
    };

    let date_segment = &text[last + 1..];
    let Some(pub_date) = parse_episode_date(date_segment) else {
        tracing::warn!(
            text = %text,
            segment = %date_segment.trim(),
            "Failed to parse episode date, using current time"
        );
        return whole();
    };

    let title = text[..first].trim().to_owned();
    let description = if first < last {
        text[first + 1..last].trim().to_owned()
    } else {
        title.clone()
    };

    CompoundText {
        title,
        description,
        pub_date,
    }
}

/// Parses a listing page into channel metadata and episode candidates.
///
/// Missing channel fields fall back to the program's catalog entry. Relative
/// links resolve against the program's page URL.
///
/// # Errors
///
/// Returns an error if a canonical link or artwork reference is present but
/// cannot be parsed as a URL.
pub fn extract_page(html: &str, program: &Program) -> Result<ExtractedPage, ExtractError> {
    let document = Html::parse_document(html);
    let meta = extract_channel_meta(&document, program)?;
    let episodes = extract_episodes(&document, &program.url, &program.categories);
    Ok(ExtractedPage { meta, episodes })
}

/// Reads the channel title, description, canonical link and artwork.
pub fn extract_channel_meta(
    document: &Html,
    program: &Program,
) -> Result<ChannelMeta, ExtractError> {
    let title = first_text(document, CHANNEL_TITLE)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| program.name.clone());
    let description = first_text(document, CHANNEL_DESCRIPTION).unwrap_or_default();

    let link = match first_attr(document, CANONICAL_LINK, "href") {
        Some(href) => {
            let href = if href.starts_with("//") {
                format!("http:{href}")
            } else {
                href
            };
            program
                .url
                .join(&href)
                .map_err(|source| ExtractError::CanonicalLink {
                    value: href,
                    source,
                })?
        }
        None => program.url.clone(),
    };

    let artwork = match first_attr(document, ARTWORK, "src") {
        Some(src) => Some(
            program
                .url
                .join(&src)
                .map_err(|source| ExtractError::Artwork { value: src, source })?,
        ),
        None => program.image_url.clone(),
    };

    Ok(ChannelMeta {
        title,
        description,
        link,
        artwork,
    })
}

/// Emits one episode candidate per `.podcast_button a`, in document order.
///
/// Candidates are not filtered here. A link that is empty or does not parse
/// leaves the episode without a link, which the assembler later drops.
pub fn extract_episodes(document: &Html, page_url: &Url, categories: &[String]) -> Vec<Episode> {
    let Some(selector) = Selector::parse(EPISODE_BUTTON).ok() else {
        return Vec::new();
    };

    document
        .select(&selector)
        .map(|element| {
            let text = clean_text(element.value().attr("data-podname").unwrap_or(""));
            let raw_link = strip_control_chars(element.value().attr("data-podcast").unwrap_or(""));
            let raw_link = raw_link.trim();
            let CompoundText {
                title,
                description,
                pub_date,
            } = split_compound_text(&text);

            Episode {
                title,
                description,
                link: resolve_link(page_url, raw_link),
                guid: Guid {
                    value: raw_link.to_owned(),
                    is_permalink: false,
                },
                categories: categories.to_vec(),
                pub_date: Some(pub_date),
                ..Default::default()
            }
        })
        .collect()
}

fn resolve_link(page_url: &Url, raw: &str) -> Option<Url> {
    if raw.is_empty() {
        return None;
    }
    match page_url.join(raw) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(link = %raw, error = %e, "Failed to parse episode link");
            None
        }
    }
}

fn first_element<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next()
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    first_element(document, css).map(|e| clean_text(&e.text().collect::<String>()))
}

fn first_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    first_element(document, css)
        .and_then(|e| e.value().attr(attr))
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
