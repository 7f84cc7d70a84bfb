//! Executor status tracking and the function-location index.

use std::collections::{BTreeSet, HashMap, HashSet};

use stratus_proto::{Location, ThreadStatus};

/// Outcome of applying a status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// First report from this executor thread.
    New,
    /// The served-function set changed.
    Updated { added: usize, removed: usize },
    /// Identical to the stored snapshot.
    Unchanged,
}

/// Last-known status of every executor thread plus the inverted
/// function -> executors index derived from it.
///
/// An executor appears under a function if and only if that function is in
/// its latest status. Functions keep their (possibly empty) entry once
/// observed, which separates "never seen" from "nobody serves it now".
#[derive(Debug, Default)]
pub struct ExecutorRegistry {
    statuses: HashMap<Location, BTreeSet<String>>,
    function_locations: HashMap<String, HashSet<Location>>,
}

impl ExecutorRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a heartbeat.
    pub fn on_status(&mut self, status: &ThreadStatus) -> StatusChange {
        let location = status.location();
        let functions: BTreeSet<String> = status.functions.iter().cloned().collect();

        let Some(previous) = self.statuses.get(&location) else {
            for function in &functions {
                self.function_locations
                    .entry(function.clone())
                    .or_default()
                    .insert(location.clone());
            }
            self.statuses.insert(location, functions);
            return StatusChange::New;
        };

        if *previous == functions {
            return StatusChange::Unchanged;
        }

        let removed: Vec<String> = previous.difference(&functions).cloned().collect();
        let added: Vec<String> = functions.difference(previous).cloned().collect();

        for function in &removed {
            if let Some(locations) = self.function_locations.get_mut(function) {
                locations.remove(&location);
            }
        }
        for function in &added {
            self.function_locations
                .entry(function.clone())
                .or_default()
                .insert(location.clone());
        }

        self.statuses.insert(location, functions);
        StatusChange::Updated {
            added: added.len(),
            removed: removed.len(),
        }
    }

    /// Drops every executor not satisfying `keep`, returning how many went.
    pub fn retain_executors(&mut self, mut keep: impl FnMut(&Location) -> bool) -> usize {
        let gone: Vec<Location> = self.statuses.keys().filter(|l| !keep(l)).cloned().collect();
        for location in &gone {
            if let Some(functions) = self.statuses.remove(location) {
                for function in functions {
                    if let Some(locations) = self.function_locations.get_mut(&function) {
                        locations.remove(location);
                    }
                }
            }
        }
        gone.len()
    }

    /// Executors serving `function`; `None` if it was never observed.
    #[must_use]
    pub fn locations(&self, function: &str) -> Option<&HashSet<Location>> {
        self.function_locations.get(function)
    }

    /// Whether any executor ever reported serving `function`.
    #[must_use]
    pub fn is_known(&self, function: &str) -> bool {
        self.function_locations.contains_key(function)
    }

    /// Functions in the latest status of `location`.
    #[must_use]
    pub fn status(&self, location: &Location) -> Option<&BTreeSet<String>> {
        self.statuses.get(location)
    }

    /// Whether `location` currently serves `function`.
    #[must_use]
    pub fn serves(&self, location: &Location, function: &str) -> bool {
        self.statuses
            .get(location)
            .is_some_and(|functions| functions.contains(function))
    }

    /// Returns the number of tracked executor threads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    /// Returns true if no executor has reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}
