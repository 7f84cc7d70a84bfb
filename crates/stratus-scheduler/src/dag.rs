//! DAG registry: validated, store-backed DAG definitions and their pinning.

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use rand::seq::IteratorRandom;
use rand::Rng;
use stratus_proto::{Dag, Location};
use tracing::{debug, info};

use crate::error::{Result, SchedulerError};
use crate::registry::ExecutorRegistry;
use crate::store::CoordinationStore;

/// A registered DAG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagEntry {
    pub dag: Dag,
    /// Executor chosen per function at creation. Empty for DAGs learned
    /// through gossip.
    pub pinning: BTreeMap<String, Location>,
}

/// Scheduler-local DAG cache, backed by the coordination store.
#[derive(Debug, Default)]
pub struct DagRegistry {
    dags: HashMap<String, DagEntry>,
}

impl DagRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates, pins, persists and caches a new DAG.
    ///
    /// Nothing is cached if any step fails.
    pub async fn create_dag<R: Rng>(
        &mut self,
        dag: Dag,
        executors: &ExecutorRegistry,
        store: &CoordinationStore,
        rng: &mut R,
    ) -> Result<()> {
        if self.dags.contains_key(&dag.name) {
            return Err(SchedulerError::DagAlreadyExists(dag.name));
        }
        validate(&dag)?;

        let mut pinning = BTreeMap::new();
        for function in &dag.functions {
            let candidates = executors
                .locations(function)
                .ok_or_else(|| SchedulerError::UnknownFunction(function.clone()))?;
            let chosen = candidates
                .iter()
                .choose(rng)
                .ok_or_else(|| SchedulerError::NoExecutorAvailable(function.clone()))?;
            pinning.insert(function.clone(), chosen.clone());
        }

        store.put_dag(&dag).await?;

        info!(
            dag = %dag.name,
            functions = dag.functions.len(),
            edges = dag.connections.len(),
            "DAG created"
        );
        self.dags.insert(dag.name.clone(), DagEntry { dag, pinning });
        Ok(())
    }

    /// Caches a DAG learned from a peer, without local validation.
    ///
    /// Returns false if the name was already known.
    pub fn insert_gossiped(&mut self, dag: Dag) -> bool {
        if self.dags.contains_key(&dag.name) {
            return false;
        }
        debug!(dag = %dag.name, "DAG learned through gossip");
        self.dags.insert(
            dag.name.clone(),
            DagEntry {
                dag,
                pinning: BTreeMap::new(),
            },
        );
        true
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&DagEntry> {
        self.dags.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.dags.contains_key(name)
    }

    /// Names of every known DAG, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.dags.keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.dags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dags.is_empty()
    }
}

/// Structural checks: non-empty, unique functions, edges within the
/// function list, acyclic.
pub fn validate(dag: &Dag) -> Result<()> {
    if dag.name.is_empty() {
        return Err(SchedulerError::InvalidDag("empty name".into()));
    }
    if dag.functions.is_empty() {
        return Err(SchedulerError::InvalidDag(format!("{} has no functions", dag.name)));
    }

    let mut seen = HashSet::new();
    for function in &dag.functions {
        if !seen.insert(function.as_str()) {
            return Err(SchedulerError::InvalidDag(format!(
                "function {function} listed twice"
            )));
        }
    }

    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for function in &dag.functions {
        graph.add_node(function.as_str());
    }
    for edge in &dag.connections {
        for end in [&edge.source, &edge.sink] {
            if !seen.contains(end.as_str()) {
                return Err(SchedulerError::InvalidDag(format!(
                    "edge {} -> {} names unlisted function {end}",
                    edge.source, edge.sink
                )));
            }
        }
        graph.add_edge(edge.source.as_str(), edge.sink.as_str(), ());
    }

    match toposort(&graph, None) {
        Ok(_) => Ok(()),
        Err(cycle) => Err(SchedulerError::InvalidDag(format!(
            "cycle through function {}",
            cycle.node_id()
        ))),
    }
}
