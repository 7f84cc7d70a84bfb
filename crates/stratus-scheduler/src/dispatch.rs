//! Executor dispatch: single invocations and admission-checked DAG runs.

use std::time::Duration;

use async_trait::async_trait;
use stratus_proto::{
    DagCall, DagSchedule, DagTrigger, ExecutorMessage, FunctionInvocation, Location, MessageType,
    ScheduleAck,
};
use tracing::{debug, warn};

use crate::config::DispatchConfig;
use crate::dag::DagEntry;
use crate::error::{Result, SchedulerError};
use crate::placement::RandomPlacement;
use crate::registry::ExecutorRegistry;
use crate::transport;

/// Sends work to executor threads.
#[async_trait]
pub trait ExecutorClient: Send + Sync {
    /// One-way single function invocation.
    async fn invoke(&self, location: &Location, invocation: FunctionInvocation) -> Result<()>;

    /// Admission request for one DAG function; waits for the reply.
    async fn schedule(&self, location: &Location, schedule: DagSchedule) -> Result<ScheduleAck>;

    /// One-way start signal for a DAG source function.
    async fn trigger(&self, location: &Location, trigger: DagTrigger) -> Result<()>;
}

/// Executor client over TCP; thread `t` of a node listens on `base + t`.
#[derive(Debug, Clone)]
pub struct TcpExecutorClient {
    base_port: u16,
    timeout: Duration,
}

impl TcpExecutorClient {
    #[must_use]
    pub const fn new(config: &DispatchConfig) -> Self {
        Self {
            base_port: config.executor_base_port,
            timeout: config.executor_timeout,
        }
    }

    fn addr(&self, location: &Location) -> String {
        let offset = u16::try_from(location.tid).unwrap_or(u16::MAX);
        format!("{}:{}", location.ip, self.base_port.saturating_add(offset))
    }
}

#[async_trait]
impl ExecutorClient for TcpExecutorClient {
    async fn invoke(&self, location: &Location, invocation: FunctionInvocation) -> Result<()> {
        transport::send(
            &self.addr(location),
            MessageType::Executor,
            ExecutorMessage::Invoke(invocation),
            self.timeout,
        )
        .await
    }

    async fn schedule(&self, location: &Location, schedule: DagSchedule) -> Result<ScheduleAck> {
        let reply = transport::request(
            &self.addr(location),
            MessageType::Executor,
            ExecutorMessage::Schedule(schedule),
            self.timeout,
        )
        .await?;

        match reply {
            ExecutorMessage::ScheduleAck(ack) => Ok(ack),
            other => Err(SchedulerError::Internal(format!(
                "executor {location} answered schedule with {other:?}"
            ))),
        }
    }

    async fn trigger(&self, location: &Location, trigger: DagTrigger) -> Result<()> {
        transport::send(
            &self.addr(location),
            MessageType::Executor,
            ExecutorMessage::Trigger(trigger),
            self.timeout,
        )
        .await
    }
}

/// Resolves an executor for every function of a DAG.
///
/// The pinned executor is kept while it still serves the function;
/// otherwise a serving executor is picked at random. The first function
/// with no serving executor fails the whole resolution.
pub fn resolve_locations(
    entry: &DagEntry,
    executors: &ExecutorRegistry,
    random: &mut RandomPlacement,
) -> Result<Vec<(String, Location)>> {
    let mut resolved = Vec::with_capacity(entry.dag.functions.len());

    for function in &entry.dag.functions {
        let pinned = entry
            .pinning
            .get(function)
            .filter(|location| executors.serves(location, function));

        let location = match pinned {
            Some(location) => location.clone(),
            None => executors
                .locations(function)
                .and_then(|candidates| random.choose(candidates))
                .ok_or_else(|| SchedulerError::AdmissionRejected {
                    function: function.clone(),
                    reason: "no executor serves it".into(),
                })?,
        };
        resolved.push((function.clone(), location));
    }

    Ok(resolved)
}

/// Runs the admission protocol for one DAG invocation.
///
/// Every function gets a [`DagSchedule`]; only when all of them are
/// accepted are the source functions triggered. The first refusal (or
/// unreachable executor) fails the call with `AdmissionRejected` naming
/// that function.
pub async fn dispatch_dag(
    client: &dyn ExecutorClient,
    entry: &DagEntry,
    locations: &[(String, Location)],
    call: &DagCall,
    response_id: &str,
) -> Result<()> {
    let dag = &entry.dag;
    let id = ulid::Ulid::new().to_string();

    for (function, location) in locations {
        let schedule = DagSchedule {
            id: id.clone(),
            dag: dag.clone(),
            target_function: function.clone(),
            locations: locations.to_vec(),
            arguments: call.args_for(function).to_vec(),
            response_id: response_id.to_owned(),
        };

        let ack = client.schedule(location, schedule).await.map_err(|e| {
            warn!(dag = %dag.name, function = %function, executor = %location, error = %e, "schedule failed");
            SchedulerError::AdmissionRejected {
                function: function.clone(),
                reason: e.to_string(),
            }
        })?;

        if !ack.accepted {
            return Err(SchedulerError::AdmissionRejected {
                function: function.clone(),
                reason: ack.reason.unwrap_or_else(|| "refused".into()),
            });
        }
        debug!(dag = %dag.name, function = %function, executor = %location, "function admitted");
    }

    for source in dag.sources() {
        let Some((_, location)) = locations.iter().find(|(f, _)| f == source) else {
            continue;
        };
        let trigger = DagTrigger {
            id: id.clone(),
            target_function: source.to_owned(),
        };
        client
            .trigger(location, trigger)
            .await
            .map_err(|e| SchedulerError::AdmissionRejected {
                function: source.to_owned(),
                reason: e.to_string(),
            })?;
    }

    Ok(())
}
