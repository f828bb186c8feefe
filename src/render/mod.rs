//! Client for the browser-rendering service.
//!
//! Wraps a single outbound call that asks the service to load a URL in a
//! headless browser and return the settled DOM. Every failure maps onto one
//! error type whose `should_retry` flag drives the caller's ack/retry
//! decision; nothing else about the error matters to control flow.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub enabled: bool,
    pub account_id: String,
    pub api_token: String,
    pub timeout: Duration,
    pub api_base: String,
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("rendering is disabled")]
    Disabled,

    #[error("render service returned {status}")]
    Http {
        status: reqwest::StatusCode,
        retryable: bool,
    },

    #[error("render service returned an empty result")]
    EmptyResult,

    #[error("render timeout after {0:?}")]
    Timeout(Duration),

    #[error("render transport failure: {0}")]
    Transport(String),
}

impl RenderError {
    pub fn should_retry(&self) -> bool {
        match self {
            // Fatal: the URL will not render better on a second attempt
            Self::Disabled => false,
            Self::EmptyResult => false,
            Self::Http { retryable, .. } => *retryable,

            // Transient: the service or the network had a bad moment
            Self::Timeout(_) => true,
            Self::Transport(_) => true,
        }
    }
}

#[derive(Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct RenderEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<String>,
}

pub struct RenderClient {
    http: reqwest::Client,
    config: RenderConfig,
}

impl RenderClient {
    pub fn new(config: RenderConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, config })
    }

    /// Render `url` through the service and return the settled HTML.
    ///
    /// 429 and 5xx responses are retryable; other non-2xx statuses and a
    /// 2xx with no usable result are fatal. Timeouts and transport errors
    /// are retryable.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_rendered_html(&self, url: &str) -> Result<String, RenderError> {
        if !self.config.enabled {
            return Err(RenderError::Disabled);
        }

        let endpoint = format!(
            "{}/accounts/{}/browser-rendering/content",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_id
        );

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.config.api_token)
            .json(&RenderRequest { url })
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| classify_transport(e, self.config.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let retryable =
                status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            return Err(RenderError::Http { status, retryable });
        }

        let envelope: RenderEnvelope = response
            .json()
            .await
            .map_err(|e| classify_transport(e, self.config.timeout))?;

        if !envelope.success {
            return Err(RenderError::EmptyResult);
        }
        match envelope.result {
            Some(html) if !html.trim().is_empty() => Ok(html),
            _ => Err(RenderError::EmptyResult),
        }
    }
}

fn classify_transport(err: reqwest::Error, timeout: Duration) -> RenderError {
    if err.is_timeout() {
        RenderError::Timeout(timeout)
    } else {
        RenderError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled_config() -> RenderConfig {
        RenderConfig {
            enabled: false,
            account_id: "acct".to_string(),
            api_token: "token".to_string(),
            timeout: Duration::from_secs(5),
            api_base: "http://127.0.0.1:1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_disabled_client_fails_fast() {
        let client = RenderClient::new(disabled_config()).unwrap();
        let err = client
            .fetch_rendered_html("https://example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Disabled));
        assert!(!err.should_retry());
    }

    #[test]
    fn test_retry_classification() {
        assert!(!RenderError::Disabled.should_retry());
        assert!(!RenderError::EmptyResult.should_retry());
        assert!(RenderError::Timeout(Duration::from_secs(30)).should_retry());
        assert!(RenderError::Transport("connection reset".to_string()).should_retry());
        assert!(
            RenderError::Http {
                status: reqwest::StatusCode::TOO_MANY_REQUESTS,
                retryable: true
            }
            .should_retry()
        );
        assert!(
            !RenderError::Http {
                status: reqwest::StatusCode::NOT_FOUND,
                retryable: false
            }
            .should_retry()
        );
    }

    #[test]
    fn test_timeout_message_mentions_timeout() {
        let message = RenderError::Timeout(Duration::from_secs(30)).to_string();
        assert!(message.contains("timeout"));
    }
}
