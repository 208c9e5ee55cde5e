use crate::crawler::work_item::WorkItem;
use crate::politeness::HostCache;
use crate::valve::WaitPredicate;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Admits a work item once its host may be fetched again
pub struct HostPoliteness {
    hosts: Arc<HostCache>,
}

impl HostPoliteness {
    pub fn new(hosts: Arc<HostCache>) -> Self {
        Self { hosts }
    }
}

#[async_trait]
impl WaitPredicate<WorkItem> for HostPoliteness {
    async fn wait(&self, item: &WorkItem, timeout: Duration) -> bool {
        match item.host() {
            Some(host) => self.hosts.wait_to_fetch(&host, Some(timeout)).await,
            None => false,
        }
    }
}
