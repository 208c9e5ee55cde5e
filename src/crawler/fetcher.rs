//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the fetch loop:
//! - Building HTTP clients with proper user agent strings
//! - Honoring the earliest start time of a request
//! - Recording every outcome in the output envelope
//! - Error classification

use crate::config::UserAgentConfig;
use crate::crawler::output::{EnvelopeWriter, FetchOutcome, FetchRecord};
use crate::SumiError;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Maximum redirect hops followed before giving up
const MAX_REDIRECTS: usize = 10;

/// A single fetch to perform
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub target: Url,

    /// The fetch must not start before this instant
    pub not_before: Instant,
}

impl FetchRequest {
    pub fn now(target: Url) -> Self {
        Self {
            target,
            not_before: Instant::now(),
        }
    }
}

/// Performs fetches and records their results
#[async_trait]
pub trait FetchService: Send + Sync {
    /// Fetches `request.target` and writes the outcome to `writer`
    ///
    /// Returns an error only when the caller should act on it; outcomes that
    /// were recorded in the envelope are `Ok`. A retryable error
    /// ([`SumiError::is_retryable`]) means the item may be requeued.
    async fn fetch_one(&self, request: &FetchRequest, writer: &EnvelopeWriter) -> Result<(), SumiError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use sumi_fetch::config::UserAgentConfig;
/// use sumi_fetch::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "SumiFetch".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`FetchService`] backed by a reqwest client
pub struct HttpFetchService {
    client: Client,
    user_agent: String,
}

impl HttpFetchService {
    /// Creates a service; `user_agent` is only used to describe requests in the envelope
    pub fn new(client: Client, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
        }
    }

    pub fn from_config(config: &UserAgentConfig) -> Result<Self, SumiError> {
        Ok(Self::new(build_http_client(config)?, config.header_value()))
    }

    fn describe_request(&self, target: &Url) -> String {
        format!(
            "GET {} HTTP/1.1\nhost: {}\nuser-agent: {}",
            target,
            target.host_str().unwrap_or_default(),
            self.user_agent
        )
    }
}

#[async_trait]
impl FetchService for HttpFetchService {
    async fn fetch_one(&self, request: &FetchRequest, writer: &EnvelopeWriter) -> Result<(), SumiError> {
        tokio::time::sleep_until(request.not_before).await;

        let target = &request.target;
        tracing::debug!("Fetching {}", target);

        let response = self
            .client
            .get(target.clone())
            .send()
            .await
            .map_err(|e| classify_error(target, e));

        let outcome = match response {
            Ok(response) => {
                let status = response.status().as_u16();
                let headers = render_headers(response.headers());
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| classify_error(target, e))?;
                FetchOutcome::Response {
                    status,
                    headers,
                    body: body.to_vec(),
                }
            }
            // Retryable failures go back to the caller for requeueing
            Err(e) if e.is_retryable() => return Err(e),
            Err(e) => FetchOutcome::Exception(e.to_string()),
        };

        writer.write_record(&FetchRecord {
            uri: target.to_string(),
            fetched_at: Utc::now(),
            request: self.describe_request(target),
            outcome,
        })
    }
}

fn render_headers(headers: &reqwest::header::HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes())))
        .collect::<Vec<_>>()
        .join("\n")
}

fn classify_error(target: &Url, error: reqwest::Error) -> SumiError {
    if error.is_timeout() {
        SumiError::Timeout {
            url: target.to_string(),
        }
    } else {
        SumiError::Http {
            url: target.to_string(),
            source: error,
        }
    }
}
