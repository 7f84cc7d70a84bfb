//! Common types used across the protocol.

use rkyv::{Archive, Deserialize, Serialize};

/// Correlation ID for request/response matching.
///
/// Uses ULID format (128-bit, lexicographically sortable, monotonic).
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[rkyv(compare(PartialEq))]
pub struct CorrelationId(pub [u8; 16]);

impl CorrelationId {
    /// Creates a new correlation ID from the current timestamp.
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_bytes())
    }

    /// Returns the raw bytes of this correlation ID.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Converts to a ULID for display purposes.
    #[must_use]
    pub fn to_ulid(&self) -> ulid::Ulid {
        ulid::Ulid::from_bytes(self.0)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_ulid())
    }
}

/// An executor thread: node address plus worker-thread slot.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    /// Node IP address.
    pub ip: String,
    /// Worker-thread id on that node.
    pub tid: u32,
}

impl Location {
    /// Creates a new location.
    #[must_use]
    pub fn new(ip: impl Into<String>, tid: u32) -> Self {
        Self { ip: ip.into(), tid }
    }

    /// Port this executor thread accepts scheduler traffic on.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    pub const fn port(&self) -> u16 {
        crate::ports::EXECUTOR_BASE.saturating_add(self.tid as u16)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.ip, self.tid)
    }
}

/// A flat list of keys.
///
/// Used for executor key-ownership snapshots, membership query replies and
/// gossip advertisements.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    /// The keys, in no particular order.
    pub keys: Vec<String>,
}

impl KeySet {
    /// Creates a key set from a list of keys.
    #[must_use]
    pub const fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }
}

/// A function call argument.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    /// Inline serialised value.
    Value(Vec<u8>),
    /// Reference to a key in the coordination store.
    Reference(String),
}

impl Argument {
    /// Returns the store key if this argument is a reference.
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Reference(key) => Some(key.as_str()),
            Self::Value(_) => None,
        }
    }
}

/// A single function invocation request.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    /// Function to invoke.
    pub name: String,
    /// Positional arguments.
    pub args: Vec<Argument>,
    /// Store key the result should be written to; generated when absent.
    pub response_key: Option<String>,
}

impl FunctionCall {
    /// Creates a call with a scheduler-generated response key.
    #[must_use]
    pub fn new(name: impl Into<String>, args: Vec<Argument>) -> Self {
        Self {
            name: name.into(),
            args,
            response_key: None,
        }
    }

    /// Iterates over the store keys referenced by the arguments.
    pub fn referenced_keys(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(Argument::reference)
    }
}

/// A directed data-flow edge between two functions of a DAG.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Connection {
    /// Upstream function whose output feeds the sink.
    pub source: String,
    /// Downstream function.
    pub sink: String,
}

impl Connection {
    /// Creates an edge `source -> sink`.
    #[must_use]
    pub fn new(source: impl Into<String>, sink: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            sink: sink.into(),
        }
    }
}

/// A named composition of functions.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Dag {
    /// Unique DAG name.
    pub name: String,
    /// Functions in declaration order.
    pub functions: Vec<String>,
    /// Data-flow edges.
    pub connections: Vec<Connection>,
}

impl Dag {
    /// Creates a DAG definition.
    #[must_use]
    pub fn new(name: impl Into<String>, functions: Vec<String>, connections: Vec<Connection>) -> Self {
        Self {
            name: name.into(),
            functions,
            connections,
        }
    }

    /// Functions with no incoming edge; these receive the trigger.
    #[must_use]
    pub fn sources(&self) -> Vec<&str> {
        self.functions
            .iter()
            .filter(|f| !self.connections.iter().any(|c| &c.sink == *f))
            .map(String::as_str)
            .collect()
    }

    /// Functions with no outgoing edge; these publish the result.
    #[must_use]
    pub fn sinks(&self) -> Vec<&str> {
        self.functions
            .iter()
            .filter(|f| !self.connections.iter().any(|c| &c.source == *f))
            .map(String::as_str)
            .collect()
    }

    /// Functions feeding directly into `function`.
    #[must_use]
    pub fn upstream(&self, function: &str) -> Vec<&str> {
        self.connections
            .iter()
            .filter(|c| c.sink == function)
            .map(|c| c.source.as_str())
            .collect()
    }

    /// Functions fed directly by `function`.
    #[must_use]
    pub fn downstream(&self, function: &str) -> Vec<&str> {
        self.connections
            .iter()
            .filter(|c| c.source == function)
            .map(|c| c.sink.as_str())
            .collect()
    }
}

/// A DAG invocation request.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DagCall {
    /// Registered DAG name.
    pub name: String,
    /// User arguments per function (normally only for source functions).
    pub function_args: Vec<(String, Vec<Argument>)>,
    /// Store key the result should be written to; generated when absent.
    pub response_key: Option<String>,
}

impl DagCall {
    /// Creates a DAG call with a scheduler-generated response key.
    #[must_use]
    pub fn new(name: impl Into<String>, function_args: Vec<(String, Vec<Argument>)>) -> Self {
        Self {
            name: name.into(),
            function_args,
            response_key: None,
        }
    }

    /// User arguments supplied for `function`, if any.
    #[must_use]
    pub fn args_for(&self, function: &str) -> &[Argument] {
        self.function_args
            .iter()
            .find(|(name, _)| name == function)
            .map_or(&[][..], |(_, args)| args.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> Dag {
        Dag::new(
            "diamond",
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
            vec![
                Connection::new("a", "b"),
                Connection::new("a", "c"),
                Connection::new("b", "d"),
                Connection::new("c", "d"),
            ],
        )
    }

    #[test]
    fn correlation_id_display() {
        // ULID is 26 characters
        assert_eq!(CorrelationId::new().to_string().len(), 26);
    }

    #[test]
    fn location_port_offsets_by_thread() {
        assert_eq!(Location::new("10.0.0.1", 0).port(), crate::ports::EXECUTOR_BASE);
        assert_eq!(Location::new("10.0.0.1", 2).port(), crate::ports::EXECUTOR_BASE + 2);
        assert_eq!(Location::new("10.0.0.1", 2).to_string(), "10.0.0.1#2");
    }

    #[test]
    fn dag_topology_helpers() {
        let dag = diamond();
        assert_eq!(dag.sources(), vec!["a"]);
        assert_eq!(dag.sinks(), vec!["d"]);
        assert_eq!(dag.upstream("d"), vec!["b", "c"]);
        assert_eq!(dag.downstream("a"), vec!["b", "c"]);
    }

    #[test]
    fn referenced_keys_skip_inline_values() {
        let call = FunctionCall::new(
            "sum",
            vec![
                Argument::Reference("k1".into()),
                Argument::Value(vec![1]),
                Argument::Reference("k2".into()),
            ],
        );
        assert_eq!(call.referenced_keys().collect::<Vec<_>>(), vec!["k1", "k2"]);
    }

    #[test]
    fn dag_call_args_lookup() {
        let call = DagCall::new("composition", vec![("incr".into(), vec![Argument::Value(vec![1])])]);
        assert_eq!(call.args_for("incr").len(), 1);
        assert!(call.args_for("square").is_empty());
    }
}
