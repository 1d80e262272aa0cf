//! Feed document model for RSS 2.0 output.
//!
//! A [`Feed`] is a value object: it is assembled in one go by the scrape
//! pipeline and replaced wholesale on rebuild, never patched field by field.
//!
//! - [`codec`] - Date and URL field encoders/decoders
//! - [`writer`] - Renders a [`Feed`] to an indented RSS 2.0 document
//! - [`reader`] - Parses a rendered document back into a [`Feed`]

pub mod codec;
mod reader;
mod writer;

pub use codec::{decode_date, decode_url, encode_date, encode_url, CodecError, FeedDate};
pub use reader::{read_feed, FeedReadError};
pub use writer::write_feed;

use url::Url;

/// Version attribute carried by the `<rss>` root element.
pub const RSS_VERSION: &str = "2.0";

/// Namespace bound to the `atom` prefix for the self link.
pub const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

/// Content type of a served feed, also declared on the self link.
pub const RSS_CONTENT_TYPE: &str = "application/rss+xml";

/// A complete feed document: a version tag plus one or more channels.
///
/// Per-program feeds and the master feed carry exactly one channel.
/// Multi-channel documents keep channels in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub version: String,
    pub channels: Vec<Channel>,
}

impl Feed {
    /// Creates a single-channel RSS 2.0 feed.
    pub fn new(channel: Channel) -> Self {
        Self::with_channels(vec![channel])
    }

    /// Creates an RSS 2.0 feed holding several channels in the given order.
    pub fn with_channels(channels: Vec<Channel>) -> Self {
        Self {
            version: RSS_VERSION.to_owned(),
            channels,
        }
    }

    /// The first (for single-channel feeds, the only) channel.
    pub fn channel(&self) -> Option<&Channel> {
        self.channels.first()
    }
}

/// One program's assembled feed content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Channel {
    pub title: String,
    pub description: String,
    /// Canonical web page of the program
    pub link: Option<Url>,
    /// URL this feed was served from, rendered as `atom:link`
    pub self_link: Option<AtomLink>,
    pub image: Option<Image>,
    pub last_build_date: Option<FeedDate>,
    pub pub_date: Option<FeedDate>,
    /// Episodes in source document order
    pub episodes: Vec<Episode>,
}

/// Channel artwork.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub title: String,
    pub link: Option<Url>,
    pub url: Url,
}

/// Namespaced `atom:link` element declaring where the feed was served from.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomLink {
    pub href: Url,
    pub rel: String,
    pub mime_type: String,
}

impl AtomLink {
    /// Builds a `rel="self"` link of type `application/rss+xml`.
    pub fn self_link(href: Url) -> Self {
        Self {
            href,
            rel: "self".to_owned(),
            mime_type: RSS_CONTENT_TYPE.to_owned(),
        }
    }
}

/// A single episode (RSS `<item>`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Episode {
    pub title: String,
    pub description: String,
    pub link: Option<Url>,
    pub guid: Guid,
    /// Inherited from the owning program, in catalog order
    pub categories: Vec<String>,
    pub pub_date: Option<FeedDate>,
    /// Zero-valued until enrichment completes
    pub enclosure: Enclosure,
}

impl Episode {
    /// Whether this episode may be kept in a channel.
    ///
    /// An episode needs a non-empty description and a link with a non-empty
    /// request form (path plus query). Entries failing this are dropped
    /// silently by the assembler.
    pub fn is_retainable(&self) -> bool {
        !self.description.trim().is_empty()
            && self
                .link
                .as_ref()
                .is_some_and(|link| !request_uri(link).is_empty())
    }
}

/// Stable per-episode identifier, taken from the raw source link.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Guid {
    pub value: String,
    pub is_permalink: bool,
}

/// Media file reference attached to an episode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enclosure {
    pub url: Option<Url>,
    pub mime_type: String,
    /// Byte length, 0 when unknown
    pub length: u64,
}

/// Request-target form of a URL: path plus optional `?query`.
pub fn request_uri(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(description: &str, link: Option<&str>) -> Episode {
        Episode {
            title: "Title".to_string(),
            description: description.to_string(),
            link: link.map(|l| Url::parse(l).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_feed_is_rss_2() {
        let feed = Feed::new(Channel::default());
        assert_eq!(feed.version, "2.0");
        assert_eq!(feed.channels.len(), 1);
    }

    #[test]
    fn test_retainable_requires_description_and_link() {
        assert!(episode("About crime", Some("https://example.com/a.mp3")).is_retainable());
        assert!(!episode("", Some("https://example.com/a.mp3")).is_retainable());
        assert!(!episode("   ", Some("https://example.com/a.mp3")).is_retainable());
        assert!(!episode("About crime", None).is_retainable());
    }

    #[test]
    fn test_request_uri_includes_query() {
        let url = Url::parse("https://example.com/media/ep.mp3?token=1").unwrap();
        assert_eq!(request_uri(&url), "/media/ep.mp3?token=1");

        let bare = Url::parse("https://example.com").unwrap();
        assert_eq!(request_uri(&bare), "/");
    }

    #[test]
    fn test_self_link_defaults() {
        let link = AtomLink::self_link(Url::parse("http://localhost:8080/cd").unwrap());
        assert_eq!(link.rel, "self");
        assert_eq!(link.mime_type, "application/rss+xml");
    }
}
