//! Test fixtures for scheduler integration tests.

use stratus_proto::{Argument, Connection, Dag, DagCall, FunctionCall, ThreadStatus};

/// Builder for executor heartbeats.
pub struct StatusBuilder {
    ip: String,
    tid: u32,
    functions: Vec<String>,
}

impl StatusBuilder {
    /// Thread 0 of the node at `ip`, serving nothing.
    pub fn new(ip: &str) -> Self {
        Self {
            ip: ip.to_string(),
            tid: 0,
            functions: vec![],
        }
    }

    pub fn thread(mut self, tid: u32) -> Self {
        self.tid = tid;
        self
    }

    /// Sets the functions this thread serves.
    pub fn with_functions(mut self, functions: Vec<&str>) -> Self {
        self.functions = functions.into_iter().map(String::from).collect();
        self
    }

    pub fn build(self) -> ThreadStatus {
        ThreadStatus::new(self.ip, self.tid, self.functions)
    }
}

/// A decimal value argument.
pub fn number(n: i64) -> Argument {
    Argument::Value(n.to_string().into_bytes())
}

/// `incr` then `square`.
pub fn composition() -> Dag {
    Dag::new(
        "composition",
        vec!["incr".into(), "square".into()],
        vec![Connection::new("incr", "square")],
    )
}

/// Calls `composition` with `n` fed to `incr`.
pub fn composition_call(n: i64) -> DagCall {
    DagCall::new("composition", vec![("incr".into(), vec![number(n)])])
}

pub fn incr_call(n: i64) -> FunctionCall {
    FunctionCall::new("incr", vec![number(n)])
}
