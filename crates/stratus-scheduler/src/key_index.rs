//! Key-location index: which executor nodes cache which keys.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, trace};

use crate::error::Result;
use crate::store::CoordinationStore;

/// Point-in-time map between keys and the executor nodes caching them.
///
/// Rebuilt wholesale by [`KeyLocationIndex::refresh`]; a key dropped by an
/// executor stays visible until the next refresh.
#[derive(Debug, Default)]
pub struct KeyLocationIndex {
    /// Node address -> keys it caches.
    key_cache_map: HashMap<String, HashSet<String>>,
    /// Key -> node addresses caching it.
    key_ip_map: HashMap<String, Vec<String>>,
}

impl KeyLocationIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-reads the key-set snapshot of every node in `executor_ips` and
    /// rebuilds both views.
    ///
    /// Only snapshots read in this pass are indexed: nodes absent from
    /// `executor_ips` are dropped, and a node without a snapshot (still
    /// joining, or withdrawn) contributes nothing. If any store read fails
    /// the index is left untouched.
    pub async fn refresh(&mut self, executor_ips: &BTreeSet<&str>, store: &CoordinationStore) -> Result<()> {
        let mut key_cache_map: HashMap<String, HashSet<String>> =
            HashMap::with_capacity(executor_ips.len());

        for ip in executor_ips {
            match store.executor_key_set(ip).await? {
                Some(snapshot) => {
                    key_cache_map.insert((*ip).to_owned(), snapshot.keys.into_iter().collect());
                }
                None => {
                    trace!(executor = %ip, "no key-set snapshot yet");
                }
            }
        }

        let mut key_ip_map: HashMap<String, Vec<String>> = HashMap::new();
        for (ip, keys) in &key_cache_map {
            for key in keys {
                key_ip_map.entry(key.clone()).or_default().push(ip.clone());
            }
        }

        debug!(
            executors = key_cache_map.len(),
            keys = key_ip_map.len(),
            "key-location index rebuilt"
        );
        self.key_cache_map = key_cache_map;
        self.key_ip_map = key_ip_map;
        Ok(())
    }

    /// Node addresses believed to cache `key`.
    #[must_use]
    pub fn owners(&self, key: &str) -> &[String] {
        self.key_ip_map.get(key).map_or(&[][..], Vec::as_slice)
    }

    /// Keys cached by the node at `ip`.
    #[must_use]
    pub fn keys_of(&self, ip: &str) -> Option<&HashSet<String>> {
        self.key_cache_map.get(ip)
    }

    /// How many of `keys` the node at `ip` caches.
    #[must_use]
    pub fn overlap<'a>(&self, ip: &str, keys: impl IntoIterator<Item = &'a str>) -> usize {
        match self.key_cache_map.get(ip) {
            Some(cached) => keys.into_iter().filter(|k| cached.contains(*k)).count(),
            None => 0,
        }
    }

    /// Number of nodes with a snapshot.
    #[must_use]
    pub fn executor_count(&self) -> usize {
        self.key_cache_map.len()
    }
}
