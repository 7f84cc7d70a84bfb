//! Stratus scheduler: function routing, DAG admission and replica gossip.
//!
//! A scheduler replica is responsible for:
//!
//! - **Membership**: tracking executor threads and peer schedulers reported
//!   by the management service
//! - **Locality**: knowing which executor nodes cache which store keys
//! - **Routing**: sending single function calls to the executor with the best
//!   key overlap
//! - **DAGs**: validating, pinning and dispatching multi-function pipelines
//!   only after every function's executor admits it
//! - **Gossip**: advertising known DAG names so replicas converge
//!
//! # Architecture
//!
//! All state lives in one [`Scheduler`] owned by a single event-loop task.
//! Per-channel TCP listeners decode frames and hand them to the loop; a
//! housekeeping timer drives membership refresh and gossip; rejected DAG
//! calls wait in a bounded retry queue.
//!
//! # Example
//!
//! ```ignore
//! use stratus_scheduler::{serve, Listeners, Scheduler, SchedulerConfig};
//!
//! let config = SchedulerConfig::load("scheduler.toml")?;
//! let listeners = Listeners::bind(&config.listen).await?;
//! let scheduler = Scheduler::new(config, store, collaborators);
//! serve(scheduler, listeners, cancel).await;
//! ```

pub mod config;
pub mod dag;
pub mod dispatch;
pub mod error;
pub mod gossip;
pub mod key_index;
pub mod membership;
pub mod placement;
pub mod registry;
pub mod server;
pub mod service;
pub mod store;
pub mod transport;

pub use config::{DispatchConfig, GossipConfig, ListenConfig, ManagementConfig, PortConfig, SchedulerConfig, StoreConfig};
pub use dag::{DagEntry, DagRegistry};
pub use dispatch::{ExecutorClient, TcpExecutorClient};
pub use error::{Result, SchedulerError};
pub use gossip::{PeerClient, TcpPeerClient};
pub use key_index::KeyLocationIndex;
pub use membership::{ManagementClient, MembershipDirectory, TcpManagementClient};
pub use placement::{LocalityPlacement, RandomPlacement};
pub use registry::{ExecutorRegistry, StatusChange};
pub use server::{serve, Channel, Listeners};
pub use service::{Collaborators, Inbound, Scheduler};
pub use store::CoordinationStore;
