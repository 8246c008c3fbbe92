use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use std::time::Duration;
use thiserror::Error;

/// Identification sent to feed servers
pub const USER_AGENT: &str = "gator";
/// Many feed servers negotiate content on this header
pub const ACCEPT_RSS: &str = "application/rss+xml";

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving a feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP response with non-2xx status code
    #[error("failed to fetch feed: {status} {message}")]
    Status { status: u16, message: String },
    /// Transport failure (DNS, connection, TLS, timeout, ...)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
}

/// Thin HTTP boundary for feed retrieval.
///
/// Every request carries `User-Agent: gator` and `Accept: application/rss+xml`.
/// No retries; redirects follow reqwest's default policy.
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: reqwest::Client,
}

impl FetchClient {
    /// Build a client. `timeout` bounds each whole request; `None` leaves
    /// the transport default in place.
    pub fn new(timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_RSS));

        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    /// GET `url` and return the raw body.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Status`] - Non-2xx HTTP response
    /// - [`FetchError::Network`] - Connection, TLS or body read failure
    /// - [`FetchError::ResponseTooLarge`] - Body exceeded 10MB
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("").to_owned(),
            });
        }

        read_limited_bytes(response, MAX_FEED_SIZE).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
