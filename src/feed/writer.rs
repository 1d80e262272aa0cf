use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

use super::codec::{encode_date, encode_url};
use super::{AtomLink, Channel, Episode, Feed, Image, ATOM_NAMESPACE};

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Renders a feed as an RSS 2.0 XML document.
///
/// Channels and episodes are written in model order with two-space
/// indentation. Optional fields that are absent are omitted. No feed-level
/// validation happens here: whatever the model holds is written.
///
/// # Errors
///
/// Returns an error only if the underlying writer fails or the output is
/// not valid UTF-8, neither of which happens for an in-memory buffer in
/// practice.
pub fn write_feed(feed: &Feed) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .context("Failed to write XML declaration")?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", feed.version.as_str()));
    rss.push_attribute(("xmlns:atom", ATOM_NAMESPACE));
    writer
        .write_event(Event::Start(rss))
        .context("Failed to write rss element")?;

    for channel in &feed.channels {
        write_channel(&mut writer, channel)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("rss")))
        .context("Failed to write rss end")?;

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).context("Generated feed contains invalid UTF-8")
}

fn write_channel(writer: &mut XmlWriter, channel: &Channel) -> Result<()> {
    start(writer, "channel")?;

    text_element(writer, "title", &channel.title)?;
    text_element(writer, "description", &channel.description)?;
    if let Some(link) = &channel.link {
        text_element(writer, "link", &encode_url(link))?;
    }
    if let Some(self_link) = &channel.self_link {
        write_atom_link(writer, self_link)?;
    }
    if let Some(image) = &channel.image {
        write_image(writer, image)?;
    }
    if let Some(date) = &channel.last_build_date {
        text_element(writer, "lastBuildDate", &encode_date(date))?;
    }
    if let Some(date) = &channel.pub_date {
        text_element(writer, "pubDate", &encode_date(date))?;
    }

    for episode in &channel.episodes {
        write_episode(writer, episode)?;
    }

    end(writer, "channel")
}

fn write_atom_link(writer: &mut XmlWriter, link: &AtomLink) -> Result<()> {
    let href = encode_url(&link.href);
    let mut element = BytesStart::new("atom:link");
    element.push_attribute(("href", href.as_str()));
    element.push_attribute(("rel", link.rel.as_str()));
    element.push_attribute(("type", link.mime_type.as_str()));
    writer
        .write_event(Event::Empty(element))
        .context("Failed to write atom:link element")?;
    Ok(())
}

fn write_image(writer: &mut XmlWriter, image: &Image) -> Result<()> {
    start(writer, "image")?;
    if let Some(link) = &image.link {
        text_element(writer, "link", &encode_url(link))?;
    }
    text_element(writer, "url", &encode_url(&image.url))?;
    text_element(writer, "title", &image.title)?;
    end(writer, "image")
}

fn write_episode(writer: &mut XmlWriter, episode: &Episode) -> Result<()> {
    start(writer, "item")?;

    text_element(writer, "title", &episode.title)?;
    text_element(writer, "description", &episode.description)?;
    if let Some(link) = &episode.link {
        text_element(writer, "link", &encode_url(link))?;
    }

    let mut guid = BytesStart::new("guid");
    guid.push_attribute((
        "isPermaLink",
        if episode.guid.is_permalink { "true" } else { "false" },
    ));
    writer
        .write_event(Event::Start(guid))
        .context("Failed to write guid element")?;
    writer
        .write_event(Event::Text(BytesText::new(&episode.guid.value)))
        .context("Failed to write guid text")?;
    end(writer, "guid")?;

    if let Some(url) = &episode.enclosure.url {
        let url = encode_url(url);
        let length = episode.enclosure.length.to_string();
        let mut enclosure = BytesStart::new("enclosure");
        enclosure.push_attribute(("type", episode.enclosure.mime_type.as_str()));
        enclosure.push_attribute(("url", url.as_str()));
        enclosure.push_attribute(("length", length.as_str()));
        writer
            .write_event(Event::Empty(enclosure))
            .context("Failed to write enclosure element")?;
    }

    for category in &episode.categories {
        text_element(writer, "category", category)?;
    }
    if let Some(date) = &episode.pub_date {
        text_element(writer, "pubDate", &encode_date(date))?;
    }

    end(writer, "item")
}

fn start(writer: &mut XmlWriter, name: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .with_context(|| format!("Failed to write {name} element"))?;
    Ok(())
}

fn end(writer: &mut XmlWriter, name: &str) -> Result<()> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .with_context(|| format!("Failed to write {name} end"))?;
    Ok(())
}

fn text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<()> {
    start(writer, name)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .with_context(|| format!("Failed to write {name} text"))?;
    end(writer, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{Enclosure, Guid};
    use chrono::{FixedOffset, TimeZone};
    use url::Url;

    fn sample_channel(title: &str, episodes: usize) -> Channel {
        let ist = FixedOffset::east_opt(19800).unwrap();
        let date = ist.with_ymd_and_hms(2020, 1, 5, 0, 0, 0).unwrap();
        Channel {
            title: title.to_string(),
            description: "Stories".to_string(),
            link: Some(Url::parse("https://example.com/show").unwrap()),
            self_link: Some(AtomLink::self_link(
                Url::parse("http://localhost:8080/show").unwrap(),
            )),
            image: Some(Image {
                title: title.to_string(),
                link: Some(Url::parse("https://example.com/show").unwrap()),
                url: Url::parse("https://example.com/art.png").unwrap(),
            }),
            last_build_date: Some(date),
            pub_date: Some(date),
            episodes: (0..episodes)
                .map(|i| {
                    let link = Url::parse(&format!("https://cdn.example.com/ep{i}.mp3")).unwrap();
                    Episode {
                        title: format!("Episode {i}"),
                        description: format!("Story {i}"),
                        guid: Guid {
                            value: link.to_string(),
                            is_permalink: false,
                        },
                        enclosure: Enclosure {
                            url: Some(link.clone()),
                            mime_type: "audio/mpeg".to_string(),
                            length: 1000 + i as u64,
                        },
                        link: Some(link),
                        categories: vec!["Comedy".to_string(), "Tamil".to_string()],
                        pub_date: Some(date),
                    }
                })
                .collect(),
        }
    }

    #[test]
    fn test_root_carries_version_and_atom_namespace() {
        let xml = write_feed(&Feed::new(sample_channel("Show", 0))).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains(
            r#"<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">"#
        ));
    }

    #[test]
    fn test_channel_fields_written() {
        let xml = write_feed(&Feed::new(sample_channel("Show", 1))).unwrap();
        assert!(xml.contains("<title>Show</title>"));
        assert!(xml.contains("<link>https://example.com/show</link>"));
        assert!(xml.contains(
            r#"<atom:link href="http://localhost:8080/show" rel="self" type="application/rss+xml"/>"#
        ));
        assert!(xml.contains("<url>https://example.com/art.png</url>"));
        assert!(xml.contains("<lastBuildDate>Sun, 05 Jan 2020 00:00:00 +0530</lastBuildDate>"));
    }

    #[test]
    fn test_item_fields_written() {
        let xml = write_feed(&Feed::new(sample_channel("Show", 1))).unwrap();
        assert!(xml.contains(r#"<guid isPermaLink="false">https://cdn.example.com/ep0.mp3</guid>"#));
        assert!(xml.contains(
            r#"<enclosure type="audio/mpeg" url="https://cdn.example.com/ep0.mp3" length="1000"/>"#
        ));
        assert!(xml.contains("<category>Comedy</category>"));
        assert!(xml.contains("<category>Tamil</category>"));
        assert!(xml.contains("<pubDate>Sun, 05 Jan 2020 00:00:00 +0530</pubDate>"));
    }

    #[test]
    fn test_indentation_is_two_spaces() {
        let xml = write_feed(&Feed::new(sample_channel("Show", 1))).unwrap();
        assert!(xml.contains("\n  <channel>"));
        assert!(xml.contains("\n    <title>Show</title>"));
        assert!(xml.contains("\n    <item>"));
    }

    #[test]
    fn test_episode_and_channel_order_preserved() {
        let feed = Feed::with_channels(vec![sample_channel("First", 3), sample_channel("Second", 1)]);
        let xml = write_feed(&feed).unwrap();

        let first = xml.find("<title>First</title>").unwrap();
        let second = xml.find("<title>Second</title>").unwrap();
        assert!(first < second);

        let ep0 = xml.find("<title>Episode 0</title>").unwrap();
        let ep1 = xml.find("<title>Episode 1</title>").unwrap();
        let ep2 = xml.find("<title>Episode 2</title>").unwrap();
        assert!(ep0 < ep1 && ep1 < ep2);
    }

    #[test]
    fn test_missing_optionals_omitted() {
        let mut channel = sample_channel("Show", 1);
        channel.image = None;
        channel.last_build_date = None;
        channel.episodes[0].enclosure = Enclosure::default();
        let xml = write_feed(&Feed::new(channel)).unwrap();
        assert!(!xml.contains("<image>"));
        assert!(!xml.contains("<lastBuildDate>"));
        assert!(!xml.contains("<enclosure"));
    }

    #[test]
    fn test_text_is_escaped() {
        let mut channel = sample_channel("Tom & Jerry <live>", 0);
        channel.description = "\"quoted\"".to_string();
        let xml = write_feed(&Feed::new(channel)).unwrap();
        assert!(xml.contains("<title>Tom &amp; Jerry &lt;live&gt;</title>"));
    }
}
