//! Executor and scheduler membership, as reported by the management service.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stratus_proto::{Location, ManagementMessage, MessageType};
use tracing::debug;

use crate::config::ManagementConfig;
use crate::error::{Result, SchedulerError};
use crate::transport;

/// Queries the management service.
#[async_trait]
pub trait ManagementClient: Send + Sync {
    /// Addresses of every executor node.
    async fn list_executor_nodes(&self) -> Result<Vec<String>>;

    /// Addresses of every scheduler replica, this one included.
    async fn list_schedulers(&self) -> Result<Vec<String>>;
}

/// Management client speaking the framed protocol over TCP.
#[derive(Debug, Clone)]
pub struct TcpManagementClient {
    nodes_addr: String,
    schedulers_addr: String,
    timeout: Duration,
}

impl TcpManagementClient {
    #[must_use]
    pub fn new(config: &ManagementConfig) -> Self {
        Self {
            nodes_addr: format!("{}:{}", config.address, config.nodes_port),
            schedulers_addr: format!("{}:{}", config.address, config.schedulers_port),
            timeout: config.request_timeout,
        }
    }

    async fn query(&self, addr: &str, query: ManagementMessage) -> Result<Vec<String>> {
        match transport::request(addr, MessageType::Management, query, self.timeout).await? {
            ManagementMessage::Addresses(set) => Ok(set.keys),
            other => Err(SchedulerError::UpstreamUnavailable(format!(
                "unexpected management reply: {other:?}"
            ))),
        }
    }
}

#[async_trait]
impl ManagementClient for TcpManagementClient {
    async fn list_executor_nodes(&self) -> Result<Vec<String>> {
        self.query(&self.nodes_addr, ManagementMessage::ListExecutors).await
    }

    async fn list_schedulers(&self) -> Result<Vec<String>> {
        self.query(&self.schedulers_addr, ManagementMessage::ListSchedulers)
            .await
    }
}

/// Last-fetched executor and scheduler lists.
pub struct MembershipDirectory {
    client: Arc<dyn ManagementClient>,
    threads_per_node: u32,
    executors: BTreeSet<Location>,
    schedulers: Vec<String>,
}

impl MembershipDirectory {
    #[must_use]
    pub fn new(client: Arc<dyn ManagementClient>, threads_per_node: u32) -> Self {
        Self {
            client,
            threads_per_node,
            executors: BTreeSet::new(),
            schedulers: Vec::new(),
        }
    }

    /// Fetches the executor nodes and expands each into one entry per
    /// worker-thread slot.
    ///
    /// On failure the previous list is kept and the error returned.
    pub async fn fetch_executors(&mut self) -> Result<Vec<Location>> {
        let nodes = self
            .client
            .list_executor_nodes()
            .await
            .map_err(upstream("executor membership"))?;

        self.executors = nodes
            .iter()
            .flat_map(|ip| (0..self.threads_per_node).map(move |tid| Location::new(ip.clone(), tid)))
            .collect();
        debug!(
            nodes = nodes.len(),
            executors = self.executors.len(),
            "executor membership refreshed"
        );

        Ok(self.executors.iter().cloned().collect())
    }

    /// Fetches the scheduler replica addresses.
    pub async fn fetch_schedulers(&mut self) -> Result<Vec<String>> {
        let schedulers = self
            .client
            .list_schedulers()
            .await
            .map_err(upstream("scheduler membership"))?;
        self.schedulers.clone_from(&schedulers);
        Ok(schedulers)
    }

    /// Records an executor seen through a heartbeat before the management
    /// service listed it.
    pub fn observe(&mut self, location: Location) -> bool {
        self.executors.insert(location)
    }

    pub fn executors(&self) -> impl Iterator<Item = &Location> {
        self.executors.iter()
    }

    /// Distinct node addresses among the known executors.
    #[must_use]
    pub fn executor_ips(&self) -> BTreeSet<&str> {
        self.executors.iter().map(|l| l.ip.as_str()).collect()
    }

    #[must_use]
    pub fn schedulers(&self) -> &[String] {
        &self.schedulers
    }

    #[must_use]
    pub fn contains(&self, location: &Location) -> bool {
        self.executors.contains(location)
    }
}

fn upstream(what: &'static str) -> impl Fn(SchedulerError) -> SchedulerError {
    move |e| match e {
        e @ SchedulerError::UpstreamUnavailable(_) => e,
        other => SchedulerError::UpstreamUnavailable(format!("{what}: {other}")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StaticManagement {
        nodes: Mutex<Option<Vec<String>>>,
        schedulers: Vec<String>,
    }

    #[async_trait]
    impl ManagementClient for StaticManagement {
        async fn list_executor_nodes(&self) -> Result<Vec<String>> {
            self.nodes
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| SchedulerError::Io(std::io::Error::other("down")))
        }

        async fn list_schedulers(&self) -> Result<Vec<String>> {
            Ok(self.schedulers.clone())
        }
    }

    fn directory(nodes: Option<Vec<&str>>) -> (MembershipDirectory, Arc<StaticManagement>) {
        let client = Arc::new(StaticManagement {
            nodes: Mutex::new(nodes.map(|n| n.into_iter().map(String::from).collect())),
            schedulers: vec!["10.0.1.1".into(), "10.0.1.2".into()],
        });
        (MembershipDirectory::new(client.clone(), 3), client)
    }

    #[tokio::test]
    async fn nodes_expand_per_thread() {
        let (mut dir, _) = directory(Some(vec!["10.0.0.1", "10.0.0.2"]));
        let executors = dir.fetch_executors().await.unwrap();

        assert_eq!(executors.len(), 6);
        assert!(executors.contains(&Location::new("10.0.0.2", 2)));
        assert!(!executors.contains(&Location::new("10.0.0.2", 3)));
        assert_eq!(dir.executor_ips().len(), 2);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_view() {
        let (mut dir, client) = directory(Some(vec!["10.0.0.1"]));
        dir.fetch_executors().await.unwrap();

        *client.nodes.lock().unwrap() = None;
        let err = dir.fetch_executors().await.unwrap_err();

        assert!(matches!(err, SchedulerError::UpstreamUnavailable(_)));
        assert_eq!(dir.executors().count(), 3);
    }

    #[tokio::test]
    async fn observed_executors_survive_until_next_fetch() {
        let (mut dir, _) = directory(Some(vec!["10.0.0.1"]));
        assert!(dir.observe(Location::new("10.0.0.9", 0)));
        assert!(!dir.observe(Location::new("10.0.0.9", 0)));
        assert!(dir.contains(&Location::new("10.0.0.9", 0)));

        dir.fetch_executors().await.unwrap();
        assert!(!dir.contains(&Location::new("10.0.0.9", 0)));
    }

    #[tokio::test]
    async fn scheduler_list_is_cached() {
        let (mut dir, _) = directory(None);
        let peers = dir.fetch_schedulers().await.unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(dir.schedulers(), peers.as_slice());
    }
}
