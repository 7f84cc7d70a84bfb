//! The scheduler process: owned state plus the single event loop driving it.
//!
//! All indexes and registries live in [`Scheduler`] and are touched only by
//! the task running [`Scheduler::run`]. Listener tasks decode frames and
//! forward them as [`Inbound`] messages; replies travel back over oneshot
//! channels.
//!
//! Rejected DAG calls are not retried inline. They are queued with an
//! attempt count and a not-before instant, the loop keeps serving other
//! traffic, and due entries are retried against refreshed indexes until
//! they are admitted or run out of attempts.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use stratus_proto::{
    ClientRequest, ClientResponse, Dag, DagCall, FunctionCall, FunctionInvocation, GenericResponse,
    KeySet, Location, ThreadStatus,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::dag::DagRegistry;
use crate::dispatch::{self, ExecutorClient};
use crate::error::{Result, SchedulerError};
use crate::gossip::{self, PeerClient};
use crate::key_index::KeyLocationIndex;
use crate::membership::{ManagementClient, MembershipDirectory};
use crate::placement::{LocalityPlacement, RandomPlacement};
use crate::registry::{ExecutorRegistry, StatusChange};
use crate::store::CoordinationStore;

/// A message for the event loop.
#[derive(Debug)]
pub enum Inbound {
    /// A client request and where to send the answer.
    Client {
        request: ClientRequest,
        reply: oneshot::Sender<ClientResponse>,
    },
    /// Executor heartbeat.
    Status(ThreadStatus),
    /// Peer advertisement of known DAG names.
    Gossip(KeySet),
}

/// External services the scheduler talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub management: Arc<dyn ManagementClient>,
    pub executors: Arc<dyn ExecutorClient>,
    pub peers: Arc<dyn PeerClient>,
}

struct PendingDagCall {
    call: DagCall,
    response_id: String,
    attempts: u32,
    not_before: Instant,
    reply: oneshot::Sender<ClientResponse>,
}

/// Scheduler state.
pub struct Scheduler {
    config: SchedulerConfig,
    store: CoordinationStore,
    membership: MembershipDirectory,
    key_index: KeyLocationIndex,
    executors: ExecutorRegistry,
    dags: DagRegistry,
    locality: LocalityPlacement,
    random: RandomPlacement,
    executor_client: Arc<dyn ExecutorClient>,
    peer_client: Arc<dyn PeerClient>,
    retries: VecDeque<PendingDagCall>,
    refresh_before_retry: bool,
}

/// Fresh response id for a call whose caller supplied none.
#[must_use]
pub fn new_response_id() -> String {
    ulid::Ulid::new().to_string()
}

impl Scheduler {
    #[must_use]
    pub fn new(config: SchedulerConfig, store: CoordinationStore, collaborators: Collaborators) -> Self {
        let membership = MembershipDirectory::new(
            collaborators.management,
            config.management.threads_per_node,
        );
        Self {
            config,
            store,
            membership,
            key_index: KeyLocationIndex::new(),
            executors: ExecutorRegistry::new(),
            dags: DagRegistry::new(),
            locality: LocalityPlacement::new(),
            random: RandomPlacement::new(),
            executor_client: collaborators.executors,
            peer_client: collaborators.peers,
            retries: VecDeque::new(),
            refresh_before_retry: false,
        }
    }

    /// Replaces the random source, for deterministic pinning.
    #[must_use]
    pub fn with_random(mut self, random: RandomPlacement) -> Self {
        self.random = random;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    #[must_use]
    pub const fn store(&self) -> &CoordinationStore {
        &self.store
    }

    #[must_use]
    pub const fn executors(&self) -> &ExecutorRegistry {
        &self.executors
    }

    #[must_use]
    pub const fn dags(&self) -> &DagRegistry {
        &self.dags
    }

    #[must_use]
    pub const fn key_index(&self) -> &KeyLocationIndex {
        &self.key_index
    }

    #[must_use]
    pub const fn membership(&self) -> &MembershipDirectory {
        &self.membership
    }

    /// DAG calls waiting for another admission attempt.
    #[must_use]
    pub fn pending_retries(&self) -> usize {
        self.retries.len()
    }

    /// Persists a function body.
    pub async fn create_function(&mut self, name: &str, body: Vec<u8>) -> Result<()> {
        if name.is_empty() {
            return Err(SchedulerError::InvalidRequest("empty function name".into()));
        }
        self.store.put_function(name, body).await?;
        info!(function = %name, "function registered");
        Ok(())
    }

    /// Registered function names starting with `prefix`.
    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        self.store.list_functions(prefix.unwrap_or_default()).await
    }

    /// Routes one function call and returns its response id without waiting
    /// for completion.
    pub async fn call_function(&mut self, call: FunctionCall) -> Result<String> {
        let candidates = self
            .executors
            .locations(&call.name)
            .ok_or_else(|| SchedulerError::NoExecutorAvailable(call.name.clone()))?;
        let keys: Vec<&str> = call.referenced_keys().collect();
        let location = self
            .locality
            .select(candidates, keys.iter().copied(), &self.key_index)
            .ok_or_else(|| SchedulerError::NoExecutorAvailable(call.name.clone()))?;

        let response_id = call.response_key.clone().unwrap_or_else(new_response_id);
        let invocation = FunctionInvocation {
            name: call.name.clone(),
            args: call.args,
            response_id: response_id.clone(),
        };
        self.executor_client.invoke(&location, invocation).await?;

        debug!(function = %call.name, executor = %location, response_id = %response_id, "function dispatched");
        Ok(response_id)
    }

    /// Validates and registers a DAG.
    pub async fn create_dag(&mut self, dag: Dag) -> Result<()> {
        self.dags
            .create_dag(dag, &self.executors, &self.store, self.random.rng())
            .await
    }

    /// One admission attempt for a DAG call; returns its response id.
    pub async fn call_dag(&mut self, call: &DagCall) -> Result<String> {
        if !self.dags.contains(&call.name) {
            return Err(SchedulerError::DagNotFound(call.name.clone()));
        }
        let response_id = call.response_key.clone().unwrap_or_else(new_response_id);
        self.admit_dag(call, &response_id).await?;
        Ok(response_id)
    }

    async fn admit_dag(&mut self, call: &DagCall, response_id: &str) -> Result<()> {
        let entry = self
            .dags
            .lookup(&call.name)
            .ok_or_else(|| SchedulerError::DagNotFound(call.name.clone()))?;
        let locations = dispatch::resolve_locations(entry, &self.executors, &mut self.random)?;
        dispatch::dispatch_dag(self.executor_client.as_ref(), entry, &locations, call, response_id)
            .await?;

        info!(dag = %call.name, response_id = %response_id, "DAG dispatched");
        Ok(())
    }

    /// Applies an executor heartbeat.
    pub fn on_status(&mut self, status: &ThreadStatus) -> StatusChange {
        let change = self.executors.on_status(status);
        match change {
            StatusChange::New => {
                self.membership.observe(status.location());
                debug!(executor = %status.location(), functions = status.functions.len(), "executor joined");
            }
            StatusChange::Updated { added, removed } => {
                debug!(executor = %status.location(), added, removed, "executor functions changed");
            }
            StatusChange::Unchanged => {}
        }
        change
    }

    /// Pulls DAGs a peer advertised that this replica lacks.
    pub async fn on_gossip(&mut self, advertised: &KeySet) -> usize {
        gossip::on_update(advertised, &mut self.dags, &self.store).await
    }

    /// Re-fetches executor membership and rebuilds the key-location index.
    ///
    /// Executors missing from a successful fetch are pruned. On failure the
    /// stale view is kept.
    pub async fn refresh(&mut self) -> Result<()> {
        let live: HashSet<Location> = self.membership.fetch_executors().await?.into_iter().collect();
        let pruned = self.executors.retain_executors(|l| live.contains(l));
        self.locality.forget(|l| live.contains(l));
        if pruned > 0 {
            info!(pruned, "departed executors removed");
        }

        self.key_index
            .refresh(&self.membership.executor_ips(), &self.store)
            .await
    }

    /// Periodic work: refresh, peer discovery and gossip.
    ///
    /// A successful refresh here also satisfies any refresh owed to queued
    /// retries.
    pub async fn housekeeping(&mut self) {
        match self.refresh().await {
            Ok(()) => self.refresh_before_retry = false,
            Err(e) => warn!(error = %e, "refresh failed, keeping stale view"),
        }

        let peers = match self.membership.fetch_schedulers().await {
            Ok(peers) => peers,
            Err(e) => {
                warn!(error = %e, "scheduler discovery failed");
                self.membership.schedulers().to_vec()
            }
        };

        let names = self.dags.names();
        gossip::advertise(
            self.peer_client.as_ref(),
            &peers,
            &self.config.listen.public_ip,
            &names,
        )
        .await;
    }

    /// Handles one inbound message.
    pub async fn handle(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Client { request, reply } => self.handle_client(request, reply).await,
            Inbound::Status(status) => {
                self.on_status(&status);
            }
            Inbound::Gossip(advertised) => {
                let added = self.on_gossip(&advertised).await;
                if added > 0 {
                    info!(added, "DAGs learned from peer");
                }
            }
        }
    }

    async fn handle_client(&mut self, request: ClientRequest, reply: oneshot::Sender<ClientResponse>) {
        let kind = request.kind();
        let response = match request {
            ClientRequest::Connect => ClientResponse::Connected {
                route_addr: self.config.listen.route_addr.clone(),
            },
            ClientRequest::CreateFunction { name, body } => {
                generic(self.create_function(&name, body).await.map(|()| None))
            }
            ClientRequest::CallFunction(call) => generic(self.call_function(call).await.map(Some)),
            ClientRequest::CreateDag(dag) => generic(self.create_dag(dag).await.map(|()| None)),
            ClientRequest::List { prefix } => match self.list(prefix.as_deref()).await {
                Ok(names) => ClientResponse::FunctionList { names },
                Err(e) => generic(Err(e)),
            },
            ClientRequest::CallDag(call) => {
                if !self.dags.contains(&call.name) {
                    generic(Err(SchedulerError::DagNotFound(call.name)))
                } else {
                    let response_id = call.response_key.clone().unwrap_or_else(new_response_id);
                    match self.admit_dag(&call, &response_id).await {
                        Ok(()) => generic(Ok(Some(response_id))),
                        Err(e) if e.is_admission_rejection() && self.config.dispatch.max_attempts > 1 => {
                            self.defer(call, response_id, 1, reply, &e);
                            return;
                        }
                        Err(e) => generic(Err(e)),
                    }
                }
            }
        };

        if let ClientResponse::Generic(GenericResponse { error: Some(code), .. }) = &response {
            debug!(request = kind, error = %code, "client request failed");
        }
        respond(reply, response);
    }

    fn defer(
        &mut self,
        call: DagCall,
        response_id: String,
        attempts: u32,
        reply: oneshot::Sender<ClientResponse>,
        error: &SchedulerError,
    ) {
        debug!(dag = %call.name, attempts, error = %error, "DAG admission deferred");
        self.retries.push_back(PendingDagCall {
            call,
            response_id,
            attempts,
            not_before: Instant::now() + self.config.dispatch.retry_backoff,
            reply,
        });
        self.refresh_before_retry = true;
    }

    /// Retries every queued DAG call whose backoff elapsed.
    ///
    /// Indexes are refreshed first when a rejection happened since the last
    /// refresh.
    pub async fn run_due_retries(&mut self) {
        let now = Instant::now();
        if !self.retries.iter().any(|p| p.not_before <= now) {
            return;
        }

        if self.refresh_before_retry {
            if let Err(e) = self.refresh().await {
                warn!(error = %e, "refresh before retry failed");
            }
            self.refresh_before_retry = false;
        }

        let (due, waiting): (Vec<_>, Vec<_>) =
            self.retries.drain(..).partition(|p| p.not_before <= now);
        self.retries.extend(waiting);

        for pending in due {
            let attempts = pending.attempts + 1;
            match self.admit_dag(&pending.call, &pending.response_id).await {
                Ok(()) => respond(pending.reply, ClientResponse::Generic(GenericResponse::accepted(pending.response_id))),
                Err(e) if e.is_admission_rejection() && attempts < self.config.dispatch.max_attempts => {
                    self.defer(pending.call, pending.response_id, attempts, pending.reply, &e);
                }
                Err(e) => {
                    warn!(dag = %pending.call.name, attempts, error = %e, "DAG call abandoned");
                    respond(pending.reply, ClientResponse::Generic(GenericResponse::error(e.code())));
                }
            }
        }
    }

    /// Runs the event loop until `cancel` fires or every sender is gone.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<Inbound>, cancel: CancellationToken) {
        let mut housekeeping = tokio::time::interval(self.config.gossip.interval.max(Duration::from_millis(1)));
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut retry_tick = tokio::time::interval(self.config.dispatch.retry_backoff.max(Duration::from_millis(1)));
        retry_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            gossip_interval_secs = self.config.gossip.interval.as_secs(),
            max_attempts = self.config.dispatch.max_attempts,
            "scheduler loop started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(message) => self.handle(message).await,
                    None => break,
                },
                _ = housekeeping.tick() => self.housekeeping().await,
                _ = retry_tick.tick(), if !self.retries.is_empty() => self.run_due_retries().await,
            }
        }

        info!(abandoned = self.retries.len(), "scheduler loop stopped");
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("executors", &self.executors.len())
            .field("dags", &self.dags.len())
            .field("pending_retries", &self.retries.len())
            .finish_non_exhaustive()
    }
}

fn generic(result: Result<Option<String>>) -> ClientResponse {
    ClientResponse::Generic(match result {
        Ok(Some(response_id)) => GenericResponse::accepted(response_id),
        Ok(None) => GenericResponse::ok(),
        Err(e) => GenericResponse::error(e.code()),
    })
}

fn respond(reply: oneshot::Sender<ClientResponse>, response: ClientResponse) {
    if reply.send(response).is_err() {
        debug!("client went away before the reply");
    }
}
