use futures::StreamExt;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Upper bound on a listing page body.
const MAX_PAGE_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching a listing page or probing media.
///
/// Nothing here is retried: every variant is returned to the caller on the
/// first occurrence.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// HTTP response with a status other than 200
    #[error("{url} returned status code {status}")]
    HttpStatus { url: String, status: u16 },
    /// Request exceeded the client timeout
    #[error("Request to {0} timed out")]
    Timeout(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response from {0} too large")]
    ResponseTooLarge(String),
}

impl FetchError {
    fn from_reqwest(url: &Url, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            FetchError::Timeout(url.to_string())
        } else {
            FetchError::Network {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// Outcome of a metadata-only probe of a media URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaProbe {
    pub status: u16,
    /// Value of the `Content-Length` header, when present and numeric
    pub content_length: Option<u64>,
}

impl MediaProbe {
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK.as_u16()
    }
}

/// Builds the shared HTTP client used for page fetches and media probes.
pub fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("podscrape/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Retrieves the raw bytes of a listing page.
///
/// Only HTTP 200 counts as success; any other status is an error carrying
/// the status code.
///
/// # Errors
///
/// - [`FetchError::Network`] - Connection or TLS errors
/// - [`FetchError::Timeout`] - Request exceeded the client timeout
/// - [`FetchError::HttpStatus`] - Status other than 200
/// - [`FetchError::ResponseTooLarge`] - Body exceeded 10MB
pub async fn fetch_bytes(client: &reqwest::Client, url: &Url) -> Result<Vec<u8>, FetchError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(url, e))?;

    if response.status() != StatusCode::OK {
        return Err(FetchError::HttpStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    read_limited_bytes(url, response, MAX_PAGE_SIZE).await
}

/// Issues a `HEAD` request for a media URL.
///
/// A non-200 status is reported in the returned probe, not as an error.
/// Only transport failures produce `Err`.
pub async fn probe_media(client: &reqwest::Client, url: &Url) -> Result<MediaProbe, FetchError> {
    let response = client
        .head(url.clone())
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(url, e))?;

    // Read the header directly: for HEAD responses reqwest reports the body
    // size hint (zero), not the advertised length.
    let content_length = response
        .headers()
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());

    Ok(MediaProbe {
        status: response.status().as_u16(),
        content_length,
    })
}

async fn read_limited_bytes(
    url: &Url,
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge(url.to_string()));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::from_reqwest(url, e))?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(url.to_string()));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
