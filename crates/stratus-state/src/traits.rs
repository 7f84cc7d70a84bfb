use async_trait::async_trait;

use crate::error::KvError;
use crate::types::Versioned;

/// A versioned key-value store.
///
/// `put` merges last-writer-wins: the incoming value replaces the stored
/// one only when its timestamp is not older. Implementations must make the
/// compare and the write a single atomic step.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Versioned>, KvError>;

    /// Returns whether the incoming value won the merge.
    async fn put(&self, key: &str, value: Versioned) -> Result<bool, KvError>;

    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    async fn list(
        &self,
        prefix: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<(Vec<String>, Option<String>), KvError>;
}
