//! Robots.txt handling module
//!
//! Parsing is delegated to the robotstxt crate. Fetching goes through the
//! [`RobotsFetcher`] trait so the politeness cache can be exercised without a
//! network.

mod parser;

pub use parser::ParsedRobots;

use crate::SumiError;
use async_trait::async_trait;
use reqwest::Client;

/// Retrieves the robots.txt of a host
#[async_trait]
pub trait RobotsFetcher: Send + Sync {
    /// Fetches robots.txt for `host`
    ///
    /// # Returns
    ///
    /// * `Ok(Some(_))` - The host published a robots file
    /// * `Ok(None)` - The host has no usable robots file (no restrictions)
    /// * `Err(SumiError)` - The fetch failed
    async fn fetch_robots(&self, host: &str) -> Result<Option<ParsedRobots>, SumiError>;
}

/// Fetches robots.txt over HTTP with a shared reqwest client
pub struct HttpRobotsFetcher {
    client: Client,
    scheme: String,
}

impl HttpRobotsFetcher {
    /// Creates a fetcher that requests `http://{host}/robots.txt`
    pub fn new(client: Client) -> Self {
        Self::with_scheme(client, "http")
    }

    /// Creates a fetcher using an explicit URL scheme
    pub fn with_scheme(client: Client, scheme: &str) -> Self {
        Self {
            client,
            scheme: scheme.to_string(),
        }
    }

    fn robots_url(&self, host: &str) -> String {
        format!("{}://{}/robots.txt", self.scheme, host)
    }
}

#[async_trait]
impl RobotsFetcher for HttpRobotsFetcher {
    async fn fetch_robots(&self, host: &str) -> Result<Option<ParsedRobots>, SumiError> {
        let url = self.robots_url(host);
        tracing::debug!("Fetching {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| SumiError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("No robots.txt for {} (HTTP {})", host, status.as_u16());
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(|source| SumiError::Http { url, source })?;

        Ok(Some(ParsedRobots::from_content(&body)))
    }
}
