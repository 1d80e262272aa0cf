//! HTTP surface: one feed route per program, `/master`, and an index page.
//!
//! - [`gate`] - Per-endpoint cache and refresh state machine

pub mod gate;

pub use gate::{CacheState, FeedGate, GateError, DEFAULT_TTL};

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use quick_xml::escape::escape;
use serde::Deserialize;
use url::Url;

use crate::catalog::{Program, MASTER_PATH};
use crate::feed::{AtomLink, RSS_CONTENT_TYPE};
use crate::scrape::{FeedBuilder, MasterFeedBuilder, MasterMeta, ProgramFeedBuilder};

/// Body returned with HTTP 500 when a build fails.
pub const BUILD_FAILURE_BODY: &str = "Failed to build RSS feed";

/// Gate over any builder, so program and master endpoints share one type.
pub type DynGate = FeedGate<Box<dyn FeedBuilder>>;

/// Settings shared by every endpoint's builder and gate.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub workers: usize,
    pub ttl: Duration,
    pub master: MasterMeta,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            workers: crate::scrape::DEFAULT_WORKERS,
            ttl: DEFAULT_TTL,
            master: MasterMeta::default(),
        }
    }
}

/// A routed feed: its path and the gate serving it.
pub struct Endpoint {
    pub path: String,
    pub gate: Arc<DynGate>,
}

#[derive(Debug, Default, Deserialize)]
struct FeedParams {
    refresh: Option<String>,
}

/// Builds one endpoint per program plus the master endpoint.
pub fn endpoints(
    client: &reqwest::Client,
    programs: &[Program],
    settings: &ServerSettings,
) -> Vec<Endpoint> {
    let mut endpoints: Vec<Endpoint> = programs
        .iter()
        .map(|program| {
            let builder: Box<dyn FeedBuilder> = Box::new(ProgramFeedBuilder::new(
                client.clone(),
                program.clone(),
                settings.workers,
            ));
            Endpoint {
                path: program.path.clone(),
                gate: Arc::new(FeedGate::new(program.path.clone(), builder, settings.ttl)),
            }
        })
        .collect();

    let master: Box<dyn FeedBuilder> = Box::new(MasterFeedBuilder::new(
        client.clone(),
        programs.to_vec().into(),
        settings.master.clone(),
        settings.workers,
    ));
    endpoints.push(Endpoint {
        path: MASTER_PATH.to_string(),
        gate: Arc::new(FeedGate::new(MASTER_PATH, master, settings.ttl)),
    });

    endpoints
}

/// Routes each endpoint to its gate; every other path gets the index page.
pub fn router(endpoints: Vec<Endpoint>, programs: &[Program]) -> Router {
    let index: Arc<str> = render_index(programs).into();

    let mut router = Router::new();
    for endpoint in endpoints {
        router = router.route(&endpoint.path, get(serve_feed).with_state(endpoint.gate));
    }

    router.fallback_service(get(serve_index).with_state(index))
}

/// Convenience wrapper: [`endpoints`] then [`router`].
pub fn app(client: &reqwest::Client, programs: &[Program], settings: &ServerSettings) -> Router {
    router(endpoints(client, programs, settings), programs)
}

/// Serves `router` on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: F,
) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn serve_feed(
    State(gate): State<Arc<DynGate>>,
    Query(params): Query<FeedParams>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let refresh = params.refresh.as_deref() == Some("true");

    let Some(self_link) = self_link(&headers, &uri) else {
        return (StatusCode::BAD_REQUEST, "Invalid Host header").into_response();
    };

    match gate.serve(self_link, refresh).await {
        Ok(body) => ([(header::CONTENT_TYPE, RSS_CONTENT_TYPE)], body.to_string()).into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, BUILD_FAILURE_BODY).into_response(),
    }
}

async fn serve_index(State(index): State<Arc<str>>) -> Html<String> {
    Html(index.to_string())
}

/// Derives the feed's own URL from how the client reached us.
///
/// Scheme comes from `X-Forwarded-Proto` (default `http`), host from the
/// `Host` header, path from the request line. The query is not included.
pub fn self_link(headers: &HeaderMap, uri: &Uri) -> Option<AtomLink> {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| uri.authority().map(|a| a.to_string()))?;

    let href = Url::parse(&format!("{proto}://{host}{}", uri.path())).ok()?;
    Some(AtomLink::self_link(href))
}

/// Renders the HTML index linking the master feed and every program.
pub fn render_index(programs: &[Program]) -> String {
    let mut items = String::from("      <li><a href=\"/master\">Master Feed</a></li>\n");
    for program in programs {
        items.push_str(&format!(
            "      <li><a href=\"{}\">{}</a></li>\n",
            escape(program.path.as_str()),
            escape(program.name.as_str())
        ));
    }

    format!(
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="UTF-8"/>
    <title>Podcasts</title>
  </head>
  <body>
    <h1>Podcasts</h1>
    <ul>
{items}    </ul>
  </body>
</html>
"#
    )
}
