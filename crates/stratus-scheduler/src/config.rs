//! Configuration types for the scheduler.
//!
//! Loaded from `scheduler.toml` and then `STRATUS_`-prefixed environment
//! variables, where `_` separates nesting levels
//! (`STRATUS_GOSSIP_INTERVAL=5` sets `gossip.interval`).

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use stratus_proto::ports;
use stratus_state::KvConfig;

use crate::error::{Result, SchedulerError};

/// Scheduler configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Inbound channel configuration.
    pub listen: ListenConfig,
    /// Management service configuration.
    pub management: ManagementConfig,
    /// Coordination store configuration.
    pub store: StoreConfig,
    /// Replica gossip configuration.
    pub gossip: GossipConfig,
    /// Executor dispatch configuration.
    pub dispatch: DispatchConfig,
}

impl SchedulerConfig {
    /// Layered configuration sources: the TOML file, then the environment.
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("STRATUS_").split("_"))
    }

    /// Loads configuration from `path` plus the environment.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::figment(path)
            .extract()
            .map_err(|e| SchedulerError::Config(e.to_string()))
    }
}

/// Inbound channel configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Address every channel binds to.
    pub bind: IpAddr,
    /// Address peers and executors know this replica by.
    pub public_ip: String,
    /// Routing-tier address handed to connecting clients.
    pub route_addr: String,
    /// Per-channel ports.
    pub ports: PortConfig,
}

impl ListenConfig {
    /// Socket address for a channel port.
    #[must_use]
    pub const fn socket_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.bind, port)
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            public_ip: "127.0.0.1".to_owned(),
            route_addr: "127.0.0.1".to_owned(),
            ports: PortConfig::default(),
        }
    }
}

/// Per-channel ports.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    pub connect: u16,
    pub function_create: u16,
    pub function_call: u16,
    pub dag_create: u16,
    pub dag_call: u16,
    pub list: u16,
    pub executor_status: u16,
    pub scheduler_update: u16,
}

impl PortConfig {
    /// All ports set to zero, so the OS picks free ones. Used by tests.
    #[must_use]
    pub const fn ephemeral() -> Self {
        Self {
            connect: 0,
            function_create: 0,
            function_call: 0,
            dag_create: 0,
            dag_call: 0,
            list: 0,
            executor_status: 0,
            scheduler_update: 0,
        }
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            connect: ports::CONNECT,
            function_create: ports::FUNCTION_CREATE,
            function_call: ports::FUNCTION_CALL,
            dag_create: ports::DAG_CREATE,
            dag_call: ports::DAG_CALL,
            list: ports::LIST,
            executor_status: ports::EXECUTOR_STATUS,
            scheduler_update: ports::SCHEDULER_UPDATE,
        }
    }
}

/// Management service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagementConfig {
    /// Management service host.
    pub address: String,
    /// Port answering executor node queries.
    pub nodes_port: u16,
    /// Port answering scheduler replica queries.
    pub schedulers_port: u16,
    /// Worker threads per executor node.
    pub threads_per_node: u32,
    /// Request timeout, in milliseconds.
    #[serde(with = "serde_duration_millis")]
    pub request_timeout: Duration,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_owned(),
            nodes_port: ports::MANAGEMENT_NODES,
            schedulers_port: ports::MANAGEMENT_SCHEDULERS,
            threads_per_node: 3,
            request_timeout: Duration::from_secs(2),
        }
    }
}

/// Coordination store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selection.
    pub kv: KvConfig,
    /// Prefix of the per-executor key-set snapshot keys.
    pub metadata_namespace: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kv: KvConfig::default(),
            metadata_namespace: "ANNA_METADATA".to_owned(),
        }
    }
}

/// Replica gossip configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GossipConfig {
    /// Housekeeping interval (refresh plus gossip), in seconds.
    #[serde(with = "serde_duration_secs")]
    pub interval: Duration,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
        }
    }
}

/// Executor dispatch configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Admission attempts per DAG call before giving up.
    pub max_attempts: u32,
    /// Delay before a rejected DAG call is retried, in milliseconds.
    #[serde(with = "serde_duration_millis")]
    pub retry_backoff: Duration,
    /// Executor connect/reply timeout, in milliseconds.
    #[serde(with = "serde_duration_millis")]
    pub executor_timeout: Duration,
    /// Port of executor thread 0; thread `t` listens on `base + t`.
    pub executor_base_port: u16,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_backoff: Duration::from_millis(100),
            executor_timeout: Duration::from_secs(2),
            executor_base_port: ports::EXECUTOR_BASE,
        }
    }
}

/// Serde helper for Duration as seconds.
mod serde_duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde helper for Duration as milliseconds.
mod serde_duration_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.listen.ports.dag_call, 5004);
        assert_eq!(config.listen.ports.executor_status, 5007);
        assert_eq!(config.management.threads_per_node, 3);
        assert_eq!(config.store.metadata_namespace, "ANNA_METADATA");
        assert_eq!(config.gossip.interval, Duration::from_secs(15));
        assert_eq!(config.dispatch.max_attempts, 5);
        assert_eq!(config.store.kv, KvConfig::Memory);
    }

    #[test]
    fn load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[listen]
public_ip = "10.0.0.5"
route_addr = "10.0.0.9"

[listen.ports]
dag_call = 7004

[management]
address = "10.0.0.1"
threads_per_node = 4
request_timeout = 500

[gossip]
interval = 3

[dispatch]
retry_backoff = 250
"#
        )
        .unwrap();

        let config = SchedulerConfig::load(file.path()).unwrap();
        assert_eq!(config.listen.public_ip, "10.0.0.5");
        assert_eq!(config.listen.route_addr, "10.0.0.9");
        assert_eq!(config.listen.ports.dag_call, 7004);
        assert_eq!(config.listen.ports.connect, 5000);
        assert_eq!(config.management.threads_per_node, 4);
        assert_eq!(config.management.request_timeout, Duration::from_millis(500));
        assert_eq!(config.gossip.interval, Duration::from_secs(3));
        assert_eq!(config.dispatch.retry_backoff, Duration::from_millis(250));
        assert_eq!(config.dispatch.max_attempts, 5);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = SchedulerConfig::load("/nonexistent/scheduler.toml").unwrap();
        assert_eq!(config.listen.ports.list, 5005);
    }

    #[test]
    fn ephemeral_ports_are_zero() {
        let ports = PortConfig::ephemeral();
        assert_eq!(ports.connect, 0);
        assert_eq!(ports.scheduler_update, 0);
    }
}
