use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use super::codec::{decode_date, decode_url, CodecError};
use super::{AtomLink, Channel, Episode, Feed, Image};

/// Errors that can occur while reading a feed document.
#[derive(Debug, Error)]
pub enum FeedReadError {
    /// XML parsing failed.
    #[error("XML parse error: {0}")]
    Xml(String),

    /// A date or URL field did not decode.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Enclosure length was not a non-negative integer.
    #[error("Invalid enclosure length: {0:?}")]
    InvalidLength(String),

    /// No `<rss>` root element with a version attribute was found.
    #[error("Document has no rss root element")]
    MissingRoot,
}

/// Parses an RSS 2.0 document produced by [`write_feed`](super::write_feed).
///
/// Date and URL fields go through the same codecs the writer uses, so a
/// malformed value is reported instead of being silently dropped.
/// Unknown elements are skipped.
///
/// The reader relies on quick-xml 0.37 not expanding DOCTYPE entity
/// declarations (see the pin in Cargo.toml).
pub fn read_feed(xml: &str) -> Result<Feed, FeedReadError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut state = ReadState::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => state.open(&e, &reader)?,
            Ok(Event::Empty(e)) => {
                state.open(&e, &reader)?;
                state.close()?;
            }
            Ok(Event::End(_)) => state.close()?,
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| FeedReadError::Xml(e.to_string()))?;
                state.text.push_str(&text);
            }
            Ok(Event::CData(e)) => {
                state.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(FeedReadError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    state.finish()
}

#[derive(Default)]
struct ImageParts {
    title: String,
    link: Option<url::Url>,
    url: Option<url::Url>,
}

#[derive(Default)]
struct ReadState {
    version: Option<String>,
    channels: Vec<Channel>,
    channel: Option<Channel>,
    image: Option<ImageParts>,
    episode: Option<Episode>,
    stack: Vec<String>,
    text: String,
}

impl ReadState {
    fn open(&mut self, e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<(), FeedReadError> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        self.text.clear();

        match name.as_str() {
            "rss" if self.stack.is_empty() => {
                self.version = Some(attr(e, reader, b"version")?.unwrap_or_default());
            }
            "channel" => self.channel = Some(Channel::default()),
            "item" if self.channel.is_some() => self.episode = Some(Episode::default()),
            "image" if self.channel.is_some() && self.episode.is_none() => {
                self.image = Some(ImageParts::default())
            }
            "atom:link" if self.episode.is_none() => {
                if let (Some(channel), Some(href)) =
                    (self.channel.as_mut(), attr(e, reader, b"href")?)
                {
                    let mut link = AtomLink::self_link(decode_url(&href)?);
                    if let Some(rel) = attr(e, reader, b"rel")? {
                        link.rel = rel;
                    }
                    if let Some(mime_type) = attr(e, reader, b"type")? {
                        link.mime_type = mime_type;
                    }
                    channel.self_link = Some(link);
                }
            }
            "guid" => {
                if let Some(episode) = self.episode.as_mut() {
                    episode.guid.is_permalink =
                        attr(e, reader, b"isPermaLink")?.is_some_and(|v| v == "true");
                }
            }
            "enclosure" => {
                if let Some(episode) = self.episode.as_mut() {
                    if let Some(url) = attr(e, reader, b"url")? {
                        episode.enclosure.url = Some(decode_url(&url)?);
                    }
                    episode.enclosure.mime_type = attr(e, reader, b"type")?.unwrap_or_default();
                    if let Some(length) = attr(e, reader, b"length")? {
                        episode.enclosure.length = length
                            .trim()
                            .parse()
                            .map_err(|_| FeedReadError::InvalidLength(length.clone()))?;
                    }
                }
            }
            _ => {}
        }

        self.stack.push(name);
        Ok(())
    }

    fn close(&mut self) -> Result<(), FeedReadError> {
        let Some(name) = self.stack.pop() else {
            return Ok(());
        };
        let text = std::mem::take(&mut self.text);

        if let Some(image) = self.image.as_mut() {
            match name.as_str() {
                "title" => image.title = text,
                "link" => image.link = optional_url(&text)?,
                "url" => image.url = optional_url(&text)?,
                "image" => {
                    let parts = self.image.take().unwrap_or_default();
                    if let (Some(channel), Some(url)) = (self.channel.as_mut(), parts.url) {
                        channel.image = Some(Image {
                            title: parts.title,
                            link: parts.link,
                            url,
                        });
                    }
                }
                _ => {}
            }
            return Ok(());
        }

        if let Some(episode) = self.episode.as_mut() {
            match name.as_str() {
                "title" => episode.title = text,
                "description" => episode.description = text,
                "link" => episode.link = optional_url(&text)?,
                "guid" => episode.guid.value = text,
                "category" => episode.categories.push(text),
                "pubDate" => episode.pub_date = Some(decode_date(&text)?),
                "item" => {
                    if let (Some(channel), Some(episode)) = (self.channel.as_mut(), self.episode.take())
                    {
                        channel.episodes.push(episode);
                    }
                }
                _ => {}
            }
            return Ok(());
        }

        if let Some(channel) = self.channel.as_mut() {
            match name.as_str() {
                "title" => channel.title = text,
                "description" => channel.description = text,
                "link" => channel.link = optional_url(&text)?,
                "lastBuildDate" => channel.last_build_date = Some(decode_date(&text)?),
                "pubDate" => channel.pub_date = Some(decode_date(&text)?),
                "channel" => {
                    if let Some(channel) = self.channel.take() {
                        self.channels.push(channel);
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn finish(self) -> Result<Feed, FeedReadError> {
        let version = self.version.ok_or(FeedReadError::MissingRoot)?;
        Ok(Feed {
            version,
            channels: self.channels,
        })
    }
}

fn attr(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
    key: &[u8],
) -> Result<Option<String>, FeedReadError> {
    for attr_result in e.attributes() {
        let attr = attr_result.map_err(|e| FeedReadError::Xml(e.to_string()))?;
        if attr.key.as_ref() == key {
            let value = attr
                .decode_and_unescape_value(reader.decoder())
                .map_err(|e| FeedReadError::Xml(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn optional_url(text: &str) -> Result<Option<url::Url>, FeedReadError> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(decode_url(text)?))
}
