//! Crawler module for polite, bounded fetching
//!
//! This module contains the fetch loop and its collaborators:
//! - Work item parsing and serialization
//! - HTTP fetching and error classification
//! - Host politeness as a valve admission check
//! - The XML output envelope and the requeue stream
//! - Overall run orchestration

mod admission;
mod fetcher;
mod orchestrator;
mod output;
mod work_item;

pub use admission::HostPoliteness;
pub use fetcher::{build_http_client, FetchRequest, FetchService, HttpFetchService};
pub use orchestrator::{Orchestrator, RunPhase, RunSummary};
pub use output::{escape_xml, EnvelopeWriter, FetchOutcome, FetchRecord, RequeueWriter};
pub use work_item::{host_key, InputFormat, WorkItem, WorkItemIssue};

use crate::config::Config;
use crate::SumiError;

/// Runs a complete fetch loop from configuration
///
/// This is the main entry point. It will:
/// 1. Build the HTTP client, fetch service and robots fetcher
/// 2. Open the configured input, output and requeue streams
/// 3. Admit, check and fetch every work item
/// 4. Drain and close the outputs
pub async fn run(config: &Config) -> Result<RunSummary, SumiError> {
    let mut orchestrator = Orchestrator::from_config(config)?;
    orchestrator.run_with_io(&config.io).await
}
