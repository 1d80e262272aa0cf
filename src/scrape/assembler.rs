use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use super::enricher::{enrich, EnrichOutcome};
use super::extractor::{extract_page, now_ist, ChannelMeta, ExtractError, ExtractedPage};
use super::fetcher::{fetch_bytes, FetchError};
use crate::catalog::Program;
use crate::feed::{AtomLink, Channel, Episode, Feed, Image};

pub const DEFAULT_MASTER_TITLE: &str = "Master Feed";
pub const DEFAULT_MASTER_DESCRIPTION: &str = "Generated master feed from a given set of podcasts";

/// Errors that abort a feed build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to load listing page for {program}: {source}")]
    Fetch {
        program: String,
        #[source]
        source: FetchError,
    },

    #[error("Failed to parse listing page for {program}: {source}")]
    Extract {
        program: String,
        #[source]
        source: ExtractError,
    },

    /// Every media probe failed in transport; the media host is unreachable.
    #[error("Failed to load any media for {program}: {source}")]
    Enrichment {
        program: String,
        #[source]
        source: FetchError,
    },
}

/// Something that can produce a complete feed on demand.
///
/// The cache gate only knows this seam, which keeps it testable with a
/// counting stand-in.
#[async_trait]
pub trait FeedBuilder: Send + Sync {
    /// Builds a fresh feed whose channel declares `self_link` as its own URL.
    async fn build(&self, self_link: AtomLink) -> Result<Feed, BuildError>;
}

#[async_trait]
impl<T: FeedBuilder + ?Sized> FeedBuilder for Box<T> {
    async fn build(&self, self_link: AtomLink) -> Result<Feed, BuildError> {
        (**self).build(self_link).await
    }
}

/// Fixed channel metadata for the aggregate feed.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterMeta {
    pub title: String,
    pub description: String,
    pub image_url: Option<Url>,
}

impl Default for MasterMeta {
    fn default() -> Self {
        Self {
            title: DEFAULT_MASTER_TITLE.to_string(),
            description: DEFAULT_MASTER_DESCRIPTION.to_string(),
            image_url: None,
        }
    }
}

// ============================================================================
// Per-program feeds
// ============================================================================

/// Builds the feed for a single program.
pub struct ProgramFeedBuilder {
    client: reqwest::Client,
    program: Program,
    workers: usize,
}

impl ProgramFeedBuilder {
    pub fn new(client: reqwest::Client, program: Program, workers: usize) -> Self {
        Self {
            client,
            program,
            workers,
        }
    }
}

#[async_trait]
impl FeedBuilder for ProgramFeedBuilder {
    async fn build(&self, self_link: AtomLink) -> Result<Feed, BuildError> {
        let channel = build_channel(&self.client, &self.program, self_link, self.workers).await?;
        Ok(Feed::new(channel))
    }
}

/// Runs the full pipeline for one program and assembles its channel.
///
/// Fetch and parse failures of the listing page are fatal. Failed media
/// probes are tolerated unless every probe failed in transport.
pub async fn build_channel(
    client: &reqwest::Client,
    program: &Program,
    self_link: AtomLink,
    workers: usize,
) -> Result<Channel, BuildError> {
    let start = Instant::now();
    let (meta, episodes) = scrape_program(client, program, workers).await?;

    let link = meta.link;
    let image = meta.artwork.map(|url| Image {
        title: meta.title.clone(),
        link: Some(link.clone()),
        url,
    });
    let now = now_ist();

    tracing::info!(
        program = %program.name,
        episodes = episodes.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Built channel"
    );

    Ok(Channel {
        title: meta.title,
        description: meta.description,
        link: Some(link),
        self_link: Some(self_link),
        image,
        last_build_date: Some(now),
        pub_date: Some(now),
        episodes,
    })
}

/// Fetch, extract, filter and enrich one program's episodes.
async fn scrape_program(
    client: &reqwest::Client,
    program: &Program,
    workers: usize,
) -> Result<(ChannelMeta, Vec<Episode>), BuildError> {
    let start = Instant::now();
    let bytes = fetch_bytes(client, &program.url)
        .await
        .map_err(|source| BuildError::Fetch {
            program: program.name.clone(),
            source,
        })?;
    tracing::debug!(
        program = %program.name,
        bytes = bytes.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Loaded listing page"
    );

    let html = String::from_utf8_lossy(&bytes);
    let ExtractedPage { meta, episodes } =
        extract_page(&html, program).map_err(|source| BuildError::Extract {
            program: program.name.clone(),
            source,
        })?;

    let candidates = episodes.len();
    let retained: Vec<Episode> = episodes.into_iter().filter(Episode::is_retainable).collect();
    if retained.len() < candidates {
        tracing::debug!(
            program = %program.name,
            dropped = candidates - retained.len(),
            "Dropped episodes without description or link"
        );
    }

    let outcome = enrich(client, retained, workers).await;
    let all_failed = outcome.all_failed();
    let EnrichOutcome {
        episodes,
        error,
        failed,
        probed,
    } = outcome;

    if let Some(source) = error {
        if all_failed {
            return Err(BuildError::Enrichment {
                program: program.name.clone(),
                source,
            });
        }
        tracing::warn!(
            program = %program.name,
            failed = failed,
            probed = probed,
            error = %source,
            "Some enclosures could not be loaded"
        );
    }

    Ok((meta, episodes))
}

// ============================================================================
// Master feed
// ============================================================================

/// Builds one channel holding every program's episodes.
///
/// Programs are scraped one after another; their episodes are concatenated
/// in catalog order without re-sorting. Any program failing aborts the
/// whole build.
pub struct MasterFeedBuilder {
    client: reqwest::Client,
    programs: Arc<[Program]>,
    meta: MasterMeta,
    workers: usize,
}

impl MasterFeedBuilder {
    pub fn new(
        client: reqwest::Client,
        programs: Arc<[Program]>,
        meta: MasterMeta,
        workers: usize,
    ) -> Self {
        Self {
            client,
            programs,
            meta,
            workers,
        }
    }
}

#[async_trait]
impl FeedBuilder for MasterFeedBuilder {
    async fn build(&self, self_link: AtomLink) -> Result<Feed, BuildError> {
        let start = Instant::now();
        let mut episodes = Vec::new();
        for program in self.programs.iter() {
            let (_, program_episodes) = scrape_program(&self.client, program, self.workers).await?;
            episodes.extend(program_episodes);
        }

        let link = self_link.href.clone();
        let image = self.meta.image_url.clone().map(|url| Image {
            title: self.meta.title.clone(),
            link: Some(link.clone()),
            url,
        });
        let now = now_ist();

        tracing::info!(
            programs = self.programs.len(),
            episodes = episodes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Built master channel"
        );

        Ok(Feed::new(Channel {
            title: self.meta.title.clone(),
            description: self.meta.description.clone(),
            link: Some(link),
            self_link: Some(self_link),
            image,
            last_build_date: Some(now),
            pub_date: Some(now),
            episodes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::fetcher::build_client;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page(show: &str, episodes: &[(&str, &str)]) -> String {
        let buttons: String = episodes
            .iter()
            .map(|(text, link)| {
                format!(
                    r#"<div class="podcast_button"><a data-podname="{text}" data-podcast="{link}">Play</a></div>"#
                )
            })
            .collect();
        format!(
            r#"<html><head><link rel="canonical" href="https://www.example.com/{show}"></head>
<body>
<div class="pod_desc_img"><img src="https://www.example.com/{show}.png"></div>
<div class="pod_desc_txt"><h1>{show}</h1><p>All about {show}</p></div>
{buttons}
</body></html>"#
        )
    }

    fn program(server: &MockServer, show: &str) -> Program {
        Program {
            path: format!("/{show}"),
            name: show.to_string(),
            url: Url::parse(&format!("{}/{show}", server.uri())).unwrap(),
            image_url: None,
            categories: vec!["Tamil".to_string()],
        }
    }

    async fn mount_page(server: &MockServer, show: &str, html: String) {
        Mock::given(method("GET"))
            .and(path(format!("/{show}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(server)
            .await;
    }

    async fn mount_media(server: &MockServer) {
        Mock::given(method("HEAD"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-length", "1234")
                    .set_body_bytes(vec![0u8; 1234]),
            )
            .mount(server)
            .await;
    }

    fn self_link(p: &str) -> AtomLink {
        AtomLink::self_link(Url::parse(&format!("http://feeds.local{p}")).unwrap())
    }

    fn client() -> reqwest::Client {
        build_client(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_build_channel_filters_and_enriches() {
        let server = MockServer::start().await;
        let media = server.uri();
        let html = page(
            "crime",
            &[
                ("Ep 3 - Third - January 5, 2020", &*format!("{media}/ep3.mp3")),
                ("Ep 2 - Second - December 29, 2019", ""),
                ("Ep 1 - First - December 22, 2019", &*format!("{media}/ep1.mp3")),
            ],
        );
        mount_page(&server, "crime", html).await;
        mount_media(&server).await;

        let channel = build_channel(&client(), &program(&server, "crime"), self_link("/crime"), 3)
            .await
            .unwrap();

        assert_eq!(channel.title, "crime");
        assert_eq!(channel.description, "All about crime");
        assert_eq!(
            channel.link.as_ref().map(Url::as_str),
            Some("https://www.example.com/crime")
        );
        let image = channel.image.unwrap();
        assert_eq!(image.title, "crime");
        assert_eq!(image.url.as_str(), "https://www.example.com/crime.png");
        assert_eq!(image.link, channel.link);
        assert_eq!(channel.self_link, Some(self_link("/crime")));

        let titles: Vec<_> = channel.episodes.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Ep 3", "Ep 1"]);
        for episode in &channel.episodes {
            assert!(episode.is_retainable());
            assert_eq!(episode.enclosure.length, 1234);
            assert_eq!(episode.enclosure.mime_type, "audio/mpeg");
            assert_eq!(episode.categories, vec!["Tamil"]);
        }
    }

    #[tokio::test]
    async fn test_page_fetch_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result =
            build_channel(&client(), &program(&server, "crime"), self_link("/crime"), 3).await;
        assert!(matches!(result, Err(BuildError::Fetch { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_media_host_is_fatal() {
        let server = MockServer::start().await;
        let html = page(
            "crime",
            &[
                ("Ep 2 - Second - January 5, 2020", "http://127.0.0.1:1/ep2.mp3"),
                ("Ep 1 - First - January 5, 2020", "http://127.0.0.1:1/ep1.mp3"),
            ],
        );
        mount_page(&server, "crime", html).await;

        let result =
            build_channel(&client(), &program(&server, "crime"), self_link("/crime"), 3).await;
        assert!(matches!(result, Err(BuildError::Enrichment { .. })));
    }

    #[tokio::test]
    async fn test_partial_media_failure_is_served() {
        let server = MockServer::start().await;
        let media = server.uri();
        let html = page(
            "crime",
            &[
                ("Ep 2 - Second - January 5, 2020", "http://127.0.0.1:1/ep2.mp3"),
                ("Ep 1 - First - January 5, 2020", &*format!("{media}/ep1.mp3")),
            ],
        );
        mount_page(&server, "crime", html).await;
        mount_media(&server).await;

        let channel = build_channel(&client(), &program(&server, "crime"), self_link("/crime"), 3)
            .await
            .unwrap();
        assert_eq!(channel.episodes.len(), 2);
        assert_eq!(channel.episodes[0].enclosure.length, 0);
        assert_eq!(channel.episodes[1].enclosure.length, 1234);
    }

    #[tokio::test]
    async fn test_master_concatenates_in_catalog_order() {
        let server = MockServer::start().await;
        let media = server.uri();
        mount_page(
            &server,
            "b",
            page("b", &[("B1 - Late - March 1, 2021", &*format!("{media}/b1.mp3"))]),
        )
        .await;
        mount_page(
            &server,
            "a",
            page(
                "a",
                &[
                    ("A2 - Early - January 1, 2019", &*format!("{media}/a2.mp3")),
                    ("A1 - Earlier - January 1, 2018", &*format!("{media}/a1.mp3")),
                ],
            ),
        )
        .await;
        mount_media(&server).await;

        let programs: Arc<[Program]> = vec![program(&server, "b"), program(&server, "a")].into();
        let builder = MasterFeedBuilder::new(client(), programs, MasterMeta::default(), 3);
        let feed = builder.build(self_link("/master")).await.unwrap();

        let channel = feed.channel().unwrap();
        assert_eq!(channel.title, DEFAULT_MASTER_TITLE);
        assert_eq!(channel.description, DEFAULT_MASTER_DESCRIPTION);
        assert_eq!(
            channel.link.as_ref().map(Url::as_str),
            Some("http://feeds.local/master")
        );
        assert!(channel.image.is_none());
        let titles: Vec<_> = channel.episodes.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["B1", "A2", "A1"]);
    }

    #[tokio::test]
    async fn test_master_aborts_when_any_program_fails() {
        let server = MockServer::start().await;
        let media = server.uri();
        mount_page(
            &server,
            "a",
            page("a", &[("A1 - Desc - January 1, 2019", &*format!("{media}/a1.mp3"))]),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        mount_media(&server).await;

        let programs: Arc<[Program]> =
            vec![program(&server, "a"), program(&server, "broken")].into();
        let builder = MasterFeedBuilder::new(client(), programs, MasterMeta::default(), 3);

        let result = builder.build(self_link("/master")).await;
        assert!(matches!(result, Err(BuildError::Fetch { program, .. }) if program == "broken"));
    }
}
