//! Client-facing request/response messages.
//!
//! Each client channel (connect, function create, function call, DAG create,
//! DAG call, list) carries exactly one [`ClientRequest`] variant and answers
//! with one [`ClientResponse`].

use rkyv::{Archive, Deserialize, Serialize};

use crate::error::SchedulerErrorCode;
use crate::types::{Dag, DagCall, FunctionCall};

/// Client channel messages.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Request from a client.
    Request(ClientRequest),
    /// Response from the scheduler.
    Response(ClientResponse),
}

/// Requests a client can send to a scheduler.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    /// Ask for the routing-tier address.
    Connect,
    /// Register a function body.
    CreateFunction {
        /// Function name.
        name: String,
        /// Serialised function body or reference.
        body: Vec<u8>,
    },
    /// Invoke a single function.
    CallFunction(FunctionCall),
    /// Register a DAG.
    CreateDag(Dag),
    /// Invoke a registered DAG.
    CallDag(DagCall),
    /// List registered function names.
    List {
        /// Optional name prefix filter.
        prefix: Option<String>,
    },
}

impl ClientRequest {
    /// Short name of the request kind, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::CreateFunction { .. } => "function_create",
            Self::CallFunction(_) => "function_call",
            Self::CreateDag(_) => "dag_create",
            Self::CallDag(_) => "dag_call",
            Self::List { .. } => "list",
        }
    }
}

/// Responses a scheduler sends to clients.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ClientResponse {
    /// Reply to [`ClientRequest::Connect`].
    Connected {
        /// Address of the routing tier of the coordination store.
        route_addr: String,
    },
    /// Success flag, optional error and optional response id.
    Generic(GenericResponse),
    /// Reply to [`ClientRequest::List`].
    FunctionList {
        /// Matching function names, sorted.
        names: Vec<String>,
    },
}

/// Outcome of a create or call request.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GenericResponse {
    /// Whether the request succeeded.
    pub success: bool,
    /// Error code when `success` is false.
    pub error: Option<SchedulerErrorCode>,
    /// Response id under which the result will appear in the store.
    pub response_id: Option<String>,
}

impl GenericResponse {
    /// A bare success.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            error: None,
            response_id: None,
        }
    }

    /// A success carrying a response id.
    #[must_use]
    pub fn accepted(response_id: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            response_id: Some(response_id.into()),
        }
    }

    /// A failure with an error code.
    #[must_use]
    pub const fn error(code: SchedulerErrorCode) -> Self {
        Self {
            success: false,
            error: Some(code),
            response_id: None,
        }
    }
}
