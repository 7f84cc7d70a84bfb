//! Scheduler view of the coordination store.
//!
//! Key layout:
//!
//! | Key | Value |
//! |-----|-------|
//! | `<metadata_ns>\|cache_ip\|<ip>` | [`KeySet`] the executor node caches |
//! | `<dag name>` | [`Dag`] record |
//! | `funcs\|<name>` | function body |
//! | `<response id>` | call result, written by executors |

use std::sync::Arc;

use stratus_proto::{Codec, Dag, KeySet};
use stratus_state::{KvBackend, Versioned};

use crate::error::Result;

const FUNCTION_PREFIX: &str = "funcs|";
const LIST_PAGE: usize = 256;

/// Typed access to the coordination store.
#[derive(Clone)]
pub struct CoordinationStore {
    kv: Arc<dyn KvBackend>,
    metadata_namespace: String,
}

impl CoordinationStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KvBackend>, metadata_namespace: impl Into<String>) -> Self {
        Self {
            kv,
            metadata_namespace: metadata_namespace.into(),
        }
    }

    /// The underlying backend.
    #[must_use]
    pub fn kv(&self) -> &Arc<dyn KvBackend> {
        &self.kv
    }

    fn key_set_key(&self, ip: &str) -> String {
        format!("{}|cache_ip|{}", self.metadata_namespace, ip)
    }

    /// Key-set snapshot published by the executor node at `ip`.
    ///
    /// `None` means the node has not published yet.
    pub async fn executor_key_set(&self, ip: &str) -> Result<Option<KeySet>> {
        match self.kv.get(&self.key_set_key(ip)).await? {
            Some(record) => Ok(Some(Codec::decode(&record.value)?)),
            None => Ok(None),
        }
    }

    /// Publishes a key-set snapshot for the node at `ip`.
    pub async fn put_executor_key_set(&self, ip: &str, keys: &KeySet) -> Result<()> {
        let bytes = Codec::to_bytes(keys)?;
        self.kv.put(&self.key_set_key(ip), Versioned::now(bytes)).await?;
        Ok(())
    }

    pub async fn get_dag(&self, name: &str) -> Result<Option<Dag>> {
        match self.kv.get(name).await? {
            Some(record) => Ok(Some(Codec::decode(&record.value)?)),
            None => Ok(None),
        }
    }

    pub async fn put_dag(&self, dag: &Dag) -> Result<()> {
        let bytes = Codec::to_bytes(dag)?;
        self.kv.put(&dag.name, Versioned::now(bytes)).await?;
        Ok(())
    }

    pub async fn put_function(&self, name: &str, body: Vec<u8>) -> Result<()> {
        self.kv
            .put(&format!("{FUNCTION_PREFIX}{name}"), Versioned::now(body))
            .await?;
        Ok(())
    }

    /// Registered function names starting with `prefix`, sorted.
    pub async fn list_functions(&self, prefix: &str) -> Result<Vec<String>> {
        let full_prefix = format!("{FUNCTION_PREFIX}{prefix}");
        let mut names = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let (keys, next) = self
                .kv
                .list(&full_prefix, LIST_PAGE, cursor.as_deref())
                .await?;
            names.extend(
                keys.iter()
                    .filter_map(|k| k.strip_prefix(FUNCTION_PREFIX))
                    .map(str::to_owned),
            );
            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Result written under a response id, if any.
    pub async fn get_result(&self, response_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.kv.get(response_id).await?.map(|record| record.value))
    }

    pub async fn put_result(&self, response_id: &str, value: Vec<u8>) -> Result<()> {
        self.kv.put(response_id, Versioned::now(value)).await?;
        Ok(())
    }
}

impl std::fmt::Debug for CoordinationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinationStore")
            .field("metadata_namespace", &self.metadata_namespace)
            .finish_non_exhaustive()
    }
}
