//! Scheduler gossip and management-service messages.

use rkyv::{Archive, Deserialize, Serialize};

use crate::types::KeySet;

/// Scheduler-to-scheduler gossip.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum GossipMessage {
    /// Names of every DAG the sender knows about.
    KnownDags(KeySet),
}

/// Management-service membership queries.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ManagementMessage {
    /// Ask for the executor node addresses.
    ListExecutors,
    /// Ask for the scheduler replica addresses.
    ListSchedulers,
    /// Reply to either query.
    Addresses(KeySet),
}
