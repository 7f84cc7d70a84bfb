//! Scheduler <-> executor messages.
//!
//! - **Executor → Scheduler**: status heartbeats, DAG admission replies
//! - **Scheduler → Executor**: single invocations, DAG schedules, DAG triggers

use rkyv::{Archive, Deserialize, Serialize};

use crate::types::{Argument, Dag, Location};

/// Executor channel messages.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorMessage {
    /// Periodic status push from an executor thread.
    Status(ThreadStatus),
    /// One-way single function invocation.
    Invoke(FunctionInvocation),
    /// Admission request for one function of a DAG invocation.
    Schedule(DagSchedule),
    /// Admission reply.
    ScheduleAck(ScheduleAck),
    /// Start signal for a source function of an admitted DAG invocation.
    Trigger(DagTrigger),
}

/// Snapshot of what an executor thread currently serves.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ThreadStatus {
    /// Node IP address.
    pub ip: String,
    /// Worker-thread id.
    pub tid: u32,
    /// Functions this thread currently serves.
    pub functions: Vec<String>,
}

impl ThreadStatus {
    /// Creates a status report.
    #[must_use]
    pub fn new(ip: impl Into<String>, tid: u32, functions: Vec<String>) -> Self {
        Self {
            ip: ip.into(),
            tid,
            functions,
        }
    }

    /// The executor thread this status describes.
    #[must_use]
    pub fn location(&self) -> Location {
        Location::new(self.ip.clone(), self.tid)
    }
}

/// A single function invocation sent to one executor.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FunctionInvocation {
    /// Function to run.
    pub name: String,
    /// Arguments.
    pub args: Vec<Argument>,
    /// Store key to write the result to.
    pub response_id: String,
}

/// Admission request for one function of a DAG invocation.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DagSchedule {
    /// Unique id of this DAG invocation.
    pub id: String,
    /// The DAG being run.
    pub dag: Dag,
    /// The function this executor is asked to run.
    pub target_function: String,
    /// Where every function of the DAG runs, so upstream outputs can be
    /// forwarded to downstream executors.
    pub locations: Vec<(String, Location)>,
    /// User arguments for `target_function`.
    pub arguments: Vec<Argument>,
    /// Store key the sink function writes the final result to.
    pub response_id: String,
}

impl DagSchedule {
    /// Location resolved for `function`.
    #[must_use]
    pub fn location_of(&self, function: &str) -> Option<&Location> {
        self.locations
            .iter()
            .find(|(name, _)| name == function)
            .map(|(_, location)| location)
    }
}

/// Admission reply for a [`DagSchedule`].
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScheduleAck {
    /// Whether the executor accepted the schedule.
    pub accepted: bool,
    /// Reason for rejection.
    pub reason: Option<String>,
}

impl ScheduleAck {
    /// An accepting reply.
    #[must_use]
    pub const fn accept() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    /// A rejecting reply.
    #[must_use]
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

/// Start signal for a DAG source function.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DagTrigger {
    /// DAG invocation id, matching [`DagSchedule::id`].
    pub id: String,
    /// Function to start.
    pub target_function: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_location() {
        let status = ThreadStatus::new("10.0.0.7", 1, vec!["incr".into()]);
        assert_eq!(status.location(), Location::new("10.0.0.7", 1));
    }

    #[test]
    fn schedule_location_lookup() {
        let schedule = DagSchedule {
            id: "s1".into(),
            dag: Dag::new("d", vec!["f".into()], vec![]),
            target_function: "f".into(),
            locations: vec![("f".into(), Location::new("10.0.0.1", 0))],
            arguments: vec![],
            response_id: "r1".into(),
        };
        assert_eq!(schedule.location_of("f"), Some(&Location::new("10.0.0.1", 0)));
        assert!(schedule.location_of("g").is_none());
    }

    #[test]
    fn ack_constructors() {
        assert!(ScheduleAck::accept().accepted);
        let rejected = ScheduleAck::reject("function not loaded");
        assert!(!rejected.accepted);
        assert_eq!(rejected.reason.as_deref(), Some("function not loaded"));
    }
}
