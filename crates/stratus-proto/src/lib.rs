//! Wire protocol types for Stratus scheduler communication.
//!
//! Every exchange the scheduler takes part in uses the same framing and a
//! typed rkyv payload:
//!
//! - Client channels (connect, function create/call, DAG create/call, list)
//! - Executor traffic (status heartbeats, invocations, DAG admission)
//! - Scheduler-to-scheduler gossip
//! - Management-service membership queries
//!
//! # Wire Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Frame Header (8 bytes, fixed)               │
//! ├──────────────┬──────────────┬────────────────────────────┤
//! │  Version (2) │ Msg Type (2) │    Payload Length (4)      │
//! ├──────────────┴──────────────┴────────────────────────────┤
//! │                 rkyv-serialised Envelope                  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use stratus_proto::{Argument, ClientMessage, ClientRequest, Envelope, FunctionCall};
//!
//! let envelope = Envelope::new(ClientMessage::Request(ClientRequest::CallFunction(
//!     FunctionCall::new("incr", vec![Argument::Value(b"2".to_vec())]),
//! )));
//! ```

mod client;
pub mod codec;
mod envelope;
mod error;
mod executor;
mod gossip;
mod types;

pub use client::{ClientMessage, ClientRequest, ClientResponse, GenericResponse};
pub use codec::{Codec, FrameHeader, MessageType, CURRENT_VERSION, FRAME_HEADER_SIZE, MAX_MESSAGE_SIZE};
pub use envelope::{Envelope, EnvelopeHeader};
pub use error::{ProtocolError, SchedulerErrorCode};
pub use executor::{DagSchedule, DagTrigger, ExecutorMessage, FunctionInvocation, ScheduleAck, ThreadStatus};
pub use gossip::{GossipMessage, ManagementMessage};
pub use types::{Argument, Connection, CorrelationId, Dag, DagCall, FunctionCall, KeySet, Location};

/// Protocol version constants.
pub mod version {
    /// Current protocol version.
    pub const CURRENT: u16 = 1;

    /// Minimum supported protocol version.
    pub const MIN_SUPPORTED: u16 = 1;
}

/// TCP port assignments.
pub mod ports {
    /// Client connect channel.
    pub const CONNECT: u16 = 5000;

    /// Function registration channel.
    pub const FUNCTION_CREATE: u16 = 5001;

    /// Single function call channel.
    pub const FUNCTION_CALL: u16 = 5002;

    /// DAG registration channel.
    pub const DAG_CREATE: u16 = 5003;

    /// DAG call channel.
    pub const DAG_CALL: u16 = 5004;

    /// Function listing channel.
    pub const LIST: u16 = 5005;

    /// Executor status heartbeats.
    pub const EXECUTOR_STATUS: u16 = 5007;

    /// Scheduler gossip updates.
    pub const SCHEDULER_UPDATE: u16 = 5008;

    /// Base port of executor threads; thread `t` listens on `EXECUTOR_BASE + t`.
    pub const EXECUTOR_BASE: u16 = 4000;

    /// Management service: executor node query.
    pub const MANAGEMENT_NODES: u16 = 6000;

    /// Management service: scheduler peer query.
    pub const MANAGEMENT_SCHEDULERS: u16 = 6001;
}
