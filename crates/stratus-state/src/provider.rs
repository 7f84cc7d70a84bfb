use std::sync::Arc;

use crate::config::KvConfig;
use crate::error::StateError;
use crate::traits::KvBackend;

#[cfg(feature = "memory")]
use crate::memory::MemoryKv;

#[cfg(feature = "valkey")]
use crate::valkey::ValkeyKv;

/// Builds the backend named by `config`.
pub async fn open_kv(config: &KvConfig) -> Result<Arc<dyn KvBackend>, StateError> {
    match config {
        #[cfg(feature = "memory")]
        KvConfig::Memory => Ok(Arc::new(MemoryKv::new())),

        #[cfg(feature = "valkey")]
        KvConfig::Valkey {
            url,
            namespace,
            pool_size,
        } => {
            let kv = ValkeyKv::new(url, namespace.clone(), *pool_size)
                .await
                .map_err(|e| StateError::Connection(e.to_string()))?;
            tracing::info!(url = %url, pool_size, "connected to valkey");
            Ok(Arc::new(kv))
        }

        #[allow(unreachable_patterns)]
        _ => Err(StateError::UnsupportedBackend(format!(
            "{} backend not enabled",
            config.backend_name()
        ))),
    }
}
