//! Units of crawl work

use crate::SumiError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// How work items are serialized, one per line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputFormat {
    /// One JSON object per line
    #[default]
    Structured,
    /// One bare URI per line
    Raw,
}

/// Why a work item cannot be fetched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkItemIssue {
    #[error("target is not an absolute URL")]
    Unparseable,

    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("target has no host")]
    MissingHost,
}

/// A URI to fetch, with the page it was found on and a priority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// The URI to fetch
    pub target_uri: String,

    /// The page the target was discovered on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,

    /// Priority value (lower is more urgent)
    #[serde(default)]
    pub priority: u32,
}

impl WorkItem {
    pub fn new(target_uri: impl Into<String>) -> Self {
        Self {
            target_uri: target_uri.into(),
            source_uri: None,
            priority: 0,
        }
    }

    pub fn with_source(mut self, source_uri: impl Into<String>) -> Self {
        self.source_uri = Some(source_uri.into());
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Parses one input line
    ///
    /// Returns `None` for blank or malformed lines. A line that parses but
    /// names an unfetchable target still yields an item; see
    /// [`has_an_issue`](Self::has_an_issue).
    pub fn parse_line(line: &str, format: InputFormat) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match format {
            InputFormat::Raw => Some(Self::new(line)),
            InputFormat::Structured => serde_json::from_str(line).ok(),
        }
    }

    /// Serializes the item back into a line of the given format
    pub fn to_line(&self, format: InputFormat) -> Result<String, SumiError> {
        match format {
            InputFormat::Raw => Ok(self.target_uri.clone()),
            InputFormat::Structured => Ok(serde_json::to_string(self)?),
        }
    }

    /// The target as a URL, if it is fetchable
    pub fn target_url(&self) -> Option<Url> {
        self.check().ok()
    }

    /// What is wrong with the target, if anything
    pub fn issue(&self) -> Option<WorkItemIssue> {
        self.check().err()
    }

    pub fn has_an_issue(&self) -> bool {
        self.issue().is_some()
    }

    /// The politeness key of the target: lower-cased host plus any explicit port
    pub fn host(&self) -> Option<String> {
        self.target_url().as_ref().and_then(host_key)
    }

    fn check(&self) -> Result<Url, WorkItemIssue> {
        let url = Url::parse(self.target_uri.trim()).map_err(|_| WorkItemIssue::Unparseable)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(WorkItemIssue::UnsupportedScheme(url.scheme().to_string()));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(WorkItemIssue::MissingHost);
        }
        Ok(url)
    }
}

/// Lower-cased host plus any explicit port
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}
