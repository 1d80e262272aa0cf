//! Per-endpoint feed cache and refresh gate.
//!
//! ```text
//! EMPTY ──build──▶ FRESH ──ttl elapses──▶ STALE ──build──▶ FRESH …
//!                    └──refresh=true──build──▶ FRESH
//! ```
//!
//! The read-decide-write sequence runs under one async mutex per endpoint
//! and the lock is held across the rebuild, so concurrent requests for the
//! same endpoint wait for the in-flight build instead of starting their own.
//! Expiry is a stored deadline compared on access; nothing runs in the
//! background.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::feed::{write_feed, AtomLink, Feed};
use crate::scrape::{BuildError, FeedBuilder};

/// Default staleness window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Failed to render feed: {0}")]
    Render(String),
}

/// Observable cache state of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing built yet
    Empty,
    /// Built and inside the staleness window
    Fresh,
    /// Built, but the window has elapsed; the next request rebuilds
    Stale,
}

#[derive(Default)]
struct CacheEntry {
    feed: Option<Feed>,
    /// Rendered body served verbatim while fresh
    body: Option<Arc<str>>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn state(&self, now: Instant) -> CacheState {
        match (&self.body, self.expires_at) {
            (Some(_), Some(deadline)) if now < deadline => CacheState::Fresh,
            (Some(_), _) => CacheState::Stale,
            (None, _) => CacheState::Empty,
        }
    }
}

/// Serves one endpoint's feed, rebuilding it only when needed.
pub struct FeedGate<B> {
    name: String,
    builder: B,
    ttl: Duration,
    entry: Mutex<CacheEntry>,
}

impl<B: FeedBuilder> FeedGate<B> {
    pub fn new(name: impl Into<String>, builder: B, ttl: Duration) -> Self {
        Self {
            name: name.into(),
            builder,
            ttl,
            entry: Mutex::new(CacheEntry::default()),
        }
    }

    pub async fn state(&self) -> CacheState {
        self.entry.lock().await.state(Instant::now())
    }

    /// Returns the rendered feed body, rebuilding first if required.
    ///
    /// A rebuild happens when nothing has been built, the staleness window
    /// has elapsed, or `refresh` is set. The rebuilt channel's
    /// `lastBuildDate` is the previous build's `pubDate` when there was
    /// one. On failure the previous entry is left untouched and the error
    /// is returned.
    pub async fn serve(&self, self_link: AtomLink, refresh: bool) -> Result<Arc<str>, GateError> {
        let mut entry = self.entry.lock().await;
        let state = entry.state(Instant::now());

        if let (CacheState::Fresh, false, Some(body)) = (state, refresh, &entry.body) {
            tracing::debug!(endpoint = %self.name, "Serving cached feed");
            return Ok(Arc::clone(body));
        }

        tracing::info!(endpoint = %self.name, state = ?state, refresh = refresh, "Rebuilding feed");

        let previous_pub_date = entry
            .feed
            .as_ref()
            .and_then(Feed::channel)
            .and_then(|channel| channel.pub_date);

        let mut feed = match self.builder.build(self_link).await {
            Ok(feed) => feed,
            Err(e) => {
                tracing::error!(endpoint = %self.name, error = %e, "Failed to build feed");
                return Err(e.into());
            }
        };

        if let Some(previous) = previous_pub_date {
            for channel in &mut feed.channels {
                channel.last_build_date = Some(previous);
            }
        }

        let body: Arc<str> = write_feed(&feed)
            .map_err(|e| GateError::Render(format!("{e:#}")))?
            .into();

        *entry = CacheEntry {
            feed: Some(feed),
            body: Some(Arc::clone(&body)),
            expires_at: Some(Instant::now() + self.ttl),
        };

        Ok(body)
    }
}
