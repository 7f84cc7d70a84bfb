use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum KvConfig {
    #[default]
    Memory,
    #[cfg(feature = "valkey")]
    Valkey {
        url: String,
        #[serde(default)]
        namespace: Option<String>,
        #[serde(default = "default_pool_size")]
        pool_size: usize,
    },
}

impl KvConfig {
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            #[cfg(feature = "valkey")]
            Self::Valkey { .. } => "valkey",
        }
    }
}

#[cfg(feature = "valkey")]
fn default_pool_size() -> usize {
    10
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn memory_is_default() {
        let config: KvConfig = serde_json::from_str(r#"{"backend":"memory"}"#).unwrap();
        assert_eq!(config, KvConfig::Memory);
        assert_eq!(KvConfig::default().backend_name(), "memory");
    }

    #[cfg(feature = "valkey")]
    #[test]
    fn valkey_pool_size_defaults() {
        let config: KvConfig =
            serde_json::from_str(r#"{"backend":"valkey","url":"redis://127.0.0.1:6379"}"#).unwrap();
        match config {
            KvConfig::Valkey {
                url,
                namespace,
                pool_size,
            } => {
                assert_eq!(url, "redis://127.0.0.1:6379");
                assert!(namespace.is_none());
                assert_eq!(pool_size, 10);
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }
}
