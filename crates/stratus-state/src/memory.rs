use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::KvError;
use crate::traits::KvBackend;
use crate::types::Versioned;

/// In-process store, used for single-node runs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    data: Arc<RwLock<HashMap<String, Versioned>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl KvBackend for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Versioned>, KvError> {
        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Versioned) -> Result<bool, KvError> {
        let mut data = self.data.write().await;
        match data.get(key) {
            Some(stored) if !value.supersedes(stored) => Ok(false),
            _ => {
                data.insert(key.to_string(), value);
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut data = self.data.write().await;
        Ok(data.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let data = self.data.read().await;
        Ok(data.contains_key(key))
    }

    async fn list(
        &self,
        prefix: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<(Vec<String>, Option<String>), KvError> {
        let data = self.data.read().await;

        let mut keys: Vec<_> = data
            .keys()
            .filter(|k| k.starts_with(prefix) && cursor.map_or(true, |c| k.as_str() >= c))
            .cloned()
            .collect();

        keys.sort();
        keys.truncate(limit + 1);

        let next_cursor = if keys.len() > limit { keys.pop() } else { None };

        Ok((keys, next_cursor))
    }
}
