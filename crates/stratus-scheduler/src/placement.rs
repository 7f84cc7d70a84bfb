//! Placement policies for choosing an executor thread.

use std::collections::{HashMap, HashSet};

use rand::rngs::SmallRng;
use rand::seq::IteratorRandom;
use rand::SeedableRng;
use stratus_proto::Location;

use crate::key_index::KeyLocationIndex;

/// Locality-aware placement.
///
/// Prefers the executor whose node caches the most of the call's referenced
/// keys. Ties go to the executor dispatched to least recently, tracked with
/// a logical clock, so repeated calls without key locality rotate through
/// all candidates.
#[derive(Debug, Default)]
pub struct LocalityPlacement {
    clock: u64,
    last_dispatch: HashMap<Location, u64>,
}

impl LocalityPlacement {
    /// Creates a new placer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects a candidate and records the dispatch.
    ///
    /// Returns `None` if `candidates` is empty.
    pub fn select<'a>(
        &mut self,
        candidates: &HashSet<Location>,
        keys: impl IntoIterator<Item = &'a str> + Clone,
        index: &KeyLocationIndex,
    ) -> Option<Location> {
        let chosen = candidates
            .iter()
            .map(|location| {
                let overlap = index.overlap(&location.ip, keys.clone());
                // never dispatched sorts before anything dispatched
                let last = self.last_dispatch.get(location).copied();
                (location, overlap, last)
            })
            .max_by(|(a, a_overlap, a_last), (b, b_overlap, b_last)| {
                a_overlap
                    .cmp(b_overlap)
                    .then_with(|| b_last.cmp(a_last))
                    .then_with(|| b.cmp(a))
            })
            .map(|(location, _, _)| location.clone())?;

        self.clock += 1;
        self.last_dispatch.insert(chosen.clone(), self.clock);
        Some(chosen)
    }

    /// Forgets executors that are no longer candidates anywhere.
    pub fn forget(&mut self, mut keep: impl FnMut(&Location) -> bool) {
        self.last_dispatch.retain(|location, _| keep(location));
    }
}

/// Uniform random choice, used for DAG pinning and for DAG functions whose
/// pinned executor went away.
pub struct RandomPlacement {
    rng: SmallRng,
}

impl RandomPlacement {
    /// Creates a placer seeded from the OS.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    /// Creates a deterministic placer.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn choose<'a>(&mut self, candidates: impl IntoIterator<Item = &'a Location>) -> Option<Location> {
        candidates.into_iter().choose(&mut self.rng).cloned()
    }

    /// The underlying generator.
    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }
}

impl Default for RandomPlacement {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RandomPlacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomPlacement").finish()
    }
}
