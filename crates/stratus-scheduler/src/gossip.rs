//! Scheduler-to-scheduler DAG gossip.
//!
//! Replicas advertise the names of the DAGs they know; a receiver pulls each
//! unknown DAG from the coordination store. Pulled DAGs are trusted as-is:
//! the advertising replica already validated them, and a function unknown
//! here may still be served elsewhere in the cluster.

use std::time::Duration;

use async_trait::async_trait;
use stratus_proto::{GossipMessage, KeySet, MessageType};
use tracing::{debug, warn};

use crate::dag::DagRegistry;
use crate::error::Result;
use crate::store::CoordinationStore;
use crate::transport;

/// Pushes advertisements to peer schedulers.
#[async_trait]
pub trait PeerClient: Send + Sync {
    async fn advertise(&self, peer: &str, dags: KeySet) -> Result<()>;
}

/// Peer client over TCP, targeting each peer's scheduler-update port.
#[derive(Debug, Clone)]
pub struct TcpPeerClient {
    port: u16,
    timeout: Duration,
}

impl TcpPeerClient {
    #[must_use]
    pub const fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

#[async_trait]
impl PeerClient for TcpPeerClient {
    async fn advertise(&self, peer: &str, dags: KeySet) -> Result<()> {
        transport::send(
            &format!("{peer}:{}", self.port),
            MessageType::Gossip,
            GossipMessage::KnownDags(dags),
            self.timeout,
        )
        .await
    }
}

/// Sends `dags` to every peer except `self_addr`.
///
/// A failing peer is logged and skipped. Returns how many peers were
/// reached.
pub async fn advertise(client: &dyn PeerClient, peers: &[String], self_addr: &str, dags: &[String]) -> usize {
    let mut reached = 0;
    for peer in peers.iter().filter(|p| p.as_str() != self_addr) {
        match client.advertise(peer, KeySet::new(dags.to_vec())).await {
            Ok(()) => reached += 1,
            Err(e) => warn!(peer = %peer, error = %e, "gossip advertisement failed"),
        }
    }
    debug!(peers = reached, dags = dags.len(), "gossip round complete");
    reached
}

/// Pulls every advertised DAG this replica does not know yet.
///
/// Missing or unreadable records are skipped; the next advertisement
/// retries them. Returns how many DAGs were added.
pub async fn on_update(advertised: &KeySet, dags: &mut DagRegistry, store: &CoordinationStore) -> usize {
    let mut added = 0;
    for name in &advertised.keys {
        if dags.contains(name) {
            continue;
        }
        match store.get_dag(name).await {
            Ok(Some(dag)) => {
                if dags.insert_gossiped(dag) {
                    added += 1;
                }
            }
            Ok(None) => debug!(dag = %name, "advertised DAG not in store yet"),
            Err(e) => warn!(dag = %name, error = %e, "failed to fetch advertised DAG"),
        }
    }
    added
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use stratus_proto::Dag;
    use stratus_state::{KvBackend, MemoryKv, Versioned};

    use crate::error::SchedulerError;

    #[derive(Default)]
    struct Recorder {
        down: Vec<String>,
        sent: Mutex<Vec<(String, KeySet)>>,
    }

    #[async_trait]
    impl PeerClient for Recorder {
        async fn advertise(&self, peer: &str, dags: KeySet) -> Result<()> {
            if self.down.iter().any(|d| d == peer) {
                return Err(SchedulerError::UpstreamUnavailable(peer.to_owned()));
            }
            self.sent.lock().unwrap().push((peer.to_owned(), dags));
            Ok(())
        }
    }

    #[tokio::test]
    async fn advertises_to_every_other_peer() {
        let client = Recorder {
            down: vec!["10.0.1.3".into()],
            ..Recorder::default()
        };
        let peers = vec!["10.0.1.1".into(), "10.0.1.2".into(), "10.0.1.3".into()];

        let reached = advertise(&client, &peers, "10.0.1.1", &["d1".into()]).await;

        assert_eq!(reached, 1);
        let sent = client.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "10.0.1.2");
        assert_eq!(sent[0].1.keys, vec!["d1"]);
    }

    #[tokio::test]
    async fn update_pulls_only_unknown_dags() {
        let kv = Arc::new(MemoryKv::new());
        let store = CoordinationStore::new(kv.clone(), "ANNA_METADATA");
        store.put_dag(&Dag::new("remote", vec!["f".into()], vec![])).await.unwrap();
        kv.put("garbled", Versioned::now(vec![0xff])).await.unwrap();

        let mut dags = DagRegistry::new();
        dags.insert_gossiped(Dag::new("local", vec!["g".into()], vec![]));

        let advertised = KeySet::new(vec![
            "local".into(),
            "remote".into(),
            "garbled".into(),
            "not-yet-written".into(),
        ]);
        let added = on_update(&advertised, &mut dags, &store).await;

        assert_eq!(added, 1);
        assert_eq!(dags.names(), vec!["local", "remote"]);
    }
}
