//! Common test utilities for scheduler integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

pub mod fixtures;

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stratus_proto::{
    Argument, DagSchedule, DagTrigger, FunctionInvocation, KeySet, Location, ScheduleAck,
};
use stratus_scheduler::config::PortConfig;
use stratus_scheduler::{
    Collaborators, CoordinationStore, ExecutorClient, Inbound, ManagementClient, PeerClient,
    RandomPlacement, Result, Scheduler, SchedulerConfig, SchedulerError,
};
use stratus_state::MemoryKv;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Management service with a settable membership view.
#[derive(Default)]
pub struct StaticManagement {
    executors: Mutex<Vec<String>>,
    schedulers: Mutex<Vec<String>>,
    unreachable: AtomicBool,
}

impl StaticManagement {
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SchedulerError::UpstreamUnavailable("management down".into()));
        }
        Ok(())
    }

    pub fn set_executors(&self, ips: &[&str]) {
        *self.executors.lock().unwrap() = ips.iter().map(|ip| (*ip).to_owned()).collect();
    }

    pub fn set_schedulers(&self, ips: &[&str]) {
        *self.schedulers.lock().unwrap() = ips.iter().map(|ip| (*ip).to_owned()).collect();
    }
}

#[async_trait]
impl ManagementClient for StaticManagement {
    async fn list_executor_nodes(&self) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.executors.lock().unwrap().clone())
    }

    async fn list_schedulers(&self) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.schedulers.lock().unwrap().clone())
    }
}

/// Executors that really run `incr` and `square` over decimal strings and
/// write sink results to the store.
pub struct FakeCluster {
    store: CoordinationStore,
    refusals_left: AtomicUsize,
    invocations: Mutex<Vec<(Location, FunctionInvocation)>>,
    schedules: Mutex<Vec<(Location, DagSchedule)>>,
    admitted: Mutex<HashMap<(String, String), DagSchedule>>,
    triggers: Mutex<Vec<(Location, DagTrigger)>>,
}

impl FakeCluster {
    pub fn new(store: CoordinationStore) -> Self {
        Self {
            store,
            refusals_left: AtomicUsize::new(0),
            invocations: Mutex::default(),
            schedules: Mutex::default(),
            admitted: Mutex::default(),
            triggers: Mutex::default(),
        }
    }

    /// Makes the next `n` schedule requests get refused.
    pub fn refuse_next(&self, n: usize) {
        self.refusals_left.store(n, Ordering::SeqCst);
    }

    pub fn invocations(&self) -> Vec<(Location, FunctionInvocation)> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn schedule_count(&self) -> usize {
        self.schedules.lock().unwrap().len()
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.lock().unwrap().len()
    }

    fn apply(function: &str, value: i64) -> Result<i64> {
        match function {
            "incr" => Ok(value + 1),
            "square" => Ok(value * value),
            other => Err(SchedulerError::Internal(format!("cluster cannot run {other}"))),
        }
    }

    fn input(args: &[Argument]) -> Result<i64> {
        match args.first() {
            Some(Argument::Value(bytes)) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| SchedulerError::Internal("argument is not a number".into())),
            Some(Argument::Reference(key)) => Err(SchedulerError::Internal(format!(
                "references are not resolved here: {key}"
            ))),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl ExecutorClient for FakeCluster {
    async fn invoke(&self, location: &Location, invocation: FunctionInvocation) -> Result<()> {
        self.invocations
            .lock()
            .unwrap()
            .push((location.clone(), invocation.clone()));

        let value = Self::apply(&invocation.name, Self::input(&invocation.args)?)?;
        self.store
            .put_result(&invocation.response_id, value.to_string().into_bytes())
            .await
    }

    async fn schedule(&self, location: &Location, schedule: DagSchedule) -> Result<ScheduleAck> {
        self.schedules
            .lock()
            .unwrap()
            .push((location.clone(), schedule.clone()));

        let refused = self
            .refusals_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Ok(ScheduleAck::reject("busy"));
        }

        self.admitted
            .lock()
            .unwrap()
            .insert((schedule.id.clone(), schedule.target_function.clone()), schedule);
        Ok(ScheduleAck::accept())
    }

    async fn trigger(&self, location: &Location, trigger: DagTrigger) -> Result<()> {
        self.triggers
            .lock()
            .unwrap()
            .push((location.clone(), trigger.clone()));

        let schedule = self
            .admitted
            .lock()
            .unwrap()
            .get(&(trigger.id.clone(), trigger.target_function.clone()))
            .cloned()
            .ok_or_else(|| SchedulerError::Internal("trigger before admission".into()))?;

        let mut pending = vec![(
            trigger.target_function.clone(),
            Self::input(&schedule.arguments)?,
        )];
        while let Some((function, input)) = pending.pop() {
            let output = Self::apply(&function, input)?;
            let downstream = schedule.dag.downstream(&function);
            if downstream.is_empty() {
                self.store
                    .put_result(&schedule.response_id, output.to_string().into_bytes())
                    .await?;
            }
            pending.extend(downstream.into_iter().map(|f| (f.to_owned(), output)));
        }
        Ok(())
    }
}

/// Peer client that records advertisements instead of sending them.
#[derive(Default)]
pub struct RecordingPeers {
    sent: Mutex<Vec<(String, KeySet)>>,
}

impl RecordingPeers {
    pub fn sent(&self) -> Vec<(String, KeySet)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_to(&self, peer: &str) -> Option<KeySet> {
        self.sent()
            .into_iter()
            .rev()
            .find(|(p, _)| p == peer)
            .map(|(_, set)| set)
    }
}

#[async_trait]
impl PeerClient for RecordingPeers {
    async fn advertise(&self, peer: &str, dags: KeySet) -> Result<()> {
        self.sent.lock().unwrap().push((peer.to_owned(), dags));
        Ok(())
    }
}

/// Fast-moving configuration for tests.
pub fn test_config(public_ip: &str) -> SchedulerConfig {
    let mut config = SchedulerConfig::default();
    config.listen.bind = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config.listen.public_ip = public_ip.to_owned();
    config.listen.ports = PortConfig::ephemeral();
    config.management.threads_per_node = 1;
    config.gossip.interval = Duration::from_secs(60);
    config.dispatch.max_attempts = 3;
    config.dispatch.retry_backoff = Duration::from_millis(10);
    config
}

/// A scheduler wired to in-process fakes.
pub struct TestScheduler {
    pub scheduler: Scheduler,
    pub kv: Arc<MemoryKv>,
    pub store: CoordinationStore,
    pub management: Arc<StaticManagement>,
    pub cluster: Arc<FakeCluster>,
    pub peers: Arc<RecordingPeers>,
}

impl TestScheduler {
    pub fn new() -> Self {
        Self::with_store("10.0.1.1", Arc::new(MemoryKv::new()))
    }

    /// A replica at `public_ip` sharing `kv` with any other replica built on it.
    pub fn with_store(public_ip: &str, kv: Arc<MemoryKv>) -> Self {
        Self::with_config(test_config(public_ip), kv)
    }

    pub fn with_config(config: SchedulerConfig, kv: Arc<MemoryKv>) -> Self {
        let store = CoordinationStore::new(kv.clone(), config.store.metadata_namespace.clone());
        let management = Arc::new(StaticManagement::default());
        let cluster = Arc::new(FakeCluster::new(store.clone()));
        let peers = Arc::new(RecordingPeers::default());

        let scheduler = Scheduler::new(
            config,
            store.clone(),
            Collaborators {
                management: management.clone(),
                executors: cluster.clone(),
                peers: peers.clone(),
            },
        )
        .with_random(RandomPlacement::seeded(11));

        Self {
            scheduler,
            kv,
            store,
            management,
            cluster,
            peers,
        }
    }

    /// Moves the scheduler onto its event loop.
    pub fn spawn(self) -> RunningScheduler {
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.scheduler.run(rx, cancel.clone()));
        RunningScheduler {
            tx,
            cancel,
            task,
            store: self.store,
            management: self.management,
            cluster: self.cluster,
        }
    }
}

impl Default for TestScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// A scheduler running on its own task.
pub struct RunningScheduler {
    pub tx: mpsc::Sender<Inbound>,
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
    pub store: CoordinationStore,
    pub management: Arc<StaticManagement>,
    pub cluster: Arc<FakeCluster>,
}

impl RunningScheduler {
    pub async fn ask(&self, request: stratus_proto::ClientRequest) -> stratus_proto::ClientResponse {
        let (reply, answer) = tokio::sync::oneshot::channel();
        self.tx.send(Inbound::Client { request, reply }).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), answer)
            .await
            .expect("scheduler did not answer in time")
            .unwrap()
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        self.task.await.unwrap();
    }
}

/// Polls the store until `response_id` has a result.
pub async fn wait_for_result(store: &CoordinationStore, response_id: &str) -> String {
    for _ in 0..100 {
        if let Some(bytes) = store.get_result(response_id).await.unwrap() {
            return String::from_utf8(bytes).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no result for {response_id}");
}
