//! Outbound page fetching for full-content extraction.
//!
//! One injected `reqwest::Client` per fetcher; no process-wide singletons.
//! Responses are size-capped, restricted to HTML, and decoded to UTF-8
//! before extraction sees them.

mod decode;
mod errors;

pub use errors::FetchError;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;
use url::Url;

const MAX_BODY_SIZE: u64 = 5 * 1024 * 1024; // 5MB
const USER_AGENT: &str = "SatchelBot/0.1 (+https://satchel.example.com)";

/// A fetched page, decoded to UTF-8 and ready for extraction.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url_final: Url,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcherTrait: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

pub struct PageFetcher {
    http: reqwest::Client,
}

impl PageFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { http })
    }

    /// Build around an existing client, e.g. one pointed at a test server.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PageFetcherTrait for PageFetcher {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let parsed = Url::parse(url)?;

        let response = self
            .http
            .get(parsed)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        // Check advertised length before downloading anything
        if let Some(length) = response.content_length()
            && length > MAX_BODY_SIZE
        {
            return Err(FetchError::BodyTooLarge(length));
        }

        let status = response.status();
        if !status.is_success() {
            let retryable =
                status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            return Err(FetchError::Http { status, retryable });
        }

        let url_final = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("text/html")
            .to_string();
        if !content_type.contains("text/html") && !content_type.contains("application/xhtml") {
            return Err(FetchError::UnsupportedContentType(content_type));
        }

        let body_bytes = response.bytes().await.map_err(FetchError::from_reqwest)?;

        // Content-Length can be absent; re-check the real size
        if body_bytes.len() as u64 > MAX_BODY_SIZE {
            return Err(FetchError::BodyTooLarge(body_bytes.len() as u64));
        }

        let body = decode::decode_body(&body_bytes, &content_type)?;
        Ok(FetchedPage {
            url_final,
            body,
            fetched_at: Utc::now(),
        })
    }
}
