use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::task::JoinSet;
use url::Url;

use super::fetcher::{probe_media, FetchError};
use crate::feed::{Enclosure, Episode};

/// Default number of concurrent media probes per enrichment pass.
pub const DEFAULT_WORKERS: usize = 3;

/// Result of one enrichment pass.
#[derive(Debug)]
pub struct EnrichOutcome {
    /// Every input episode, in input order, with its enclosure populated
    pub episodes: Vec<Episode>,
    /// First transport failure by input position, if any probe failed
    pub error: Option<FetchError>,
    /// Number of episodes whose probe failed in transport
    pub failed: usize,
    /// Number of episodes that were probed
    pub probed: usize,
}

impl EnrichOutcome {
    /// True when probes were attempted and every one of them failed in transport.
    pub fn all_failed(&self) -> bool {
        self.probed > 0 && self.failed == self.probed
    }
}

type Queue = Arc<Mutex<VecDeque<(usize, Episode)>>>;

#[derive(Default)]
struct WorkerReport {
    enriched: Vec<(usize, Episode)>,
    failures: Vec<(usize, FetchError)>,
}

/// Populates each episode's enclosure with a `HEAD` probe of its link.
///
/// A fixed pool of `workers` tasks pulls episodes from a shared queue. The
/// pass completes once every worker has finished; a failing probe never
/// cancels its siblings. Output order matches input order regardless of
/// which worker handled which episode.
///
/// On HTTP 200 the byte length comes from `Content-Length` and the MIME
/// type from the link's file extension. A non-200 answer or a transport
/// failure leaves a zero-length, empty-type enclosure; the episode is kept.
pub async fn enrich(
    client: &reqwest::Client,
    episodes: Vec<Episode>,
    workers: usize,
) -> EnrichOutcome {
    let start = Instant::now();
    let probed = episodes.len();
    if probed == 0 {
        return EnrichOutcome {
            episodes,
            error: None,
            failed: 0,
            probed: 0,
        };
    }

    let workers = workers.clamp(1, probed);
    let queue: Queue = Arc::new(Mutex::new(episodes.into_iter().enumerate().collect()));

    let mut set = JoinSet::new();
    for worker in 0..workers {
        let client = client.clone();
        let queue = Arc::clone(&queue);
        set.spawn(run_worker(worker, client, queue));
    }

    let mut enriched = Vec::with_capacity(probed);
    let mut failures = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(report) => {
                enriched.extend(report.enriched);
                failures.extend(report.failures);
            }
            Err(e) => {
                tracing::error!(error = %e, "Enclosure worker terminated abnormally");
            }
        }
    }

    enriched.sort_by_key(|(index, _)| *index);
    failures.sort_by_key(|(index, _)| *index);

    let failed = failures.len();
    let error = failures.into_iter().next().map(|(_, e)| e);

    tracing::debug!(
        episodes = probed,
        failed = failed,
        workers = workers,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Loaded enclosures"
    );

    EnrichOutcome {
        episodes: enriched.into_iter().map(|(_, episode)| episode).collect(),
        error,
        failed,
        probed,
    }
}

async fn run_worker(worker: usize, client: reqwest::Client, queue: Queue) -> WorkerReport {
    let mut report = WorkerReport::default();

    loop {
        let next = match queue.lock() {
            Ok(mut guard) => guard.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        let Some((index, mut episode)) = next else {
            break;
        };

        let start = Instant::now();
        match enclosure_for(&client, &episode).await {
            Ok(enclosure) => episode.enclosure = enclosure,
            Err(e) => {
                tracing::warn!(worker = worker, error = %e, "Failed to load media url");
                episode.enclosure = zero_enclosure(&episode);
                report.failures.push((index, e));
            }
        }
        tracing::debug!(
            worker = worker,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded enclosure"
        );

        report.enriched.push((index, episode));
    }

    report
}

async fn enclosure_for(
    client: &reqwest::Client,
    episode: &Episode,
) -> Result<Enclosure, FetchError> {
    let Some(link) = episode.link.as_ref() else {
        return Ok(Enclosure::default());
    };

    let probe = probe_media(client, link).await?;
    if !probe.is_ok() {
        tracing::debug!(url = %link, status = probe.status, "Media probe returned non-200");
        return Ok(zero_enclosure(episode));
    }

    Ok(Enclosure {
        url: Some(link.clone()),
        mime_type: mime_for(link).to_owned(),
        length: probe.content_length.unwrap_or(0),
    })
}

fn zero_enclosure(episode: &Episode) -> Enclosure {
    Enclosure {
        url: episode.link.clone(),
        mime_type: String::new(),
        length: 0,
    }
}

/// MIME type implied by the extension of a URL's path.
///
/// Returns an empty string for unknown or missing extensions.
pub fn mime_for(url: &Url) -> &'static str {
    mime_guess::from_path(url.path()).first_raw().unwrap_or("")
}
