//! Valkey/Redis adapter for the KV backend.
//!
//! Each key is stored as a hash with two fields: `ts`, the timestamp as a
//! zero-padded decimal string, and `v`, the raw value. Padding makes the
//! string order of `ts` match numeric order, which lets the merge script
//! compare timestamps without Lua's lossy number type.

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;

use crate::error::KvError;
use crate::traits::KvBackend;
use crate::types::Versioned;

const TIMESTAMP_FIELD: &str = "ts";
const VALUE_FIELD: &str = "v";

const LWW_PUT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'ts')
if current == false or ARGV[1] >= current then
    redis.call('HSET', KEYS[1], 'ts', ARGV[1], 'v', ARGV[2])
    return 1
end
return 0
"#;

/// Valkey/Redis KV backend.
#[derive(Clone)]
pub struct ValkeyKv {
    pool: Pool,
    namespace: Option<String>,
    put_script: redis::Script,
}

impl ValkeyKv {
    /// Create a new Valkey KV backend and check the server answers.
    pub async fn new(
        url: &str,
        namespace: Option<String>,
        pool_size: usize,
    ) -> Result<Self, KvError> {
        let config = Config::from_url(url);
        let pool = config
            .builder()
            .map_err(|e| KvError::Connection(e.to_string()))?
            .max_size(pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| KvError::Connection(e.to_string()))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| KvError::Connection(e.to_string()))?;

        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|e| KvError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            namespace,
            put_script: redis::Script::new(LWW_PUT),
        })
    }

    async fn conn(&self) -> Result<Connection, KvError> {
        self.pool
            .get()
            .await
            .map_err(|e| KvError::Connection(e.to_string()))
    }

    fn prefixed_key(&self, key: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, key),
            None => key.to_string(),
        }
    }

    fn strip_prefix<'a>(&self, key: &'a str) -> &'a str {
        match &self.namespace {
            Some(ns) => key
                .strip_prefix(ns)
                .and_then(|k| k.strip_prefix(':'))
                .unwrap_or(key),
            None => key,
        }
    }
}

fn encode_timestamp(timestamp: u64) -> String {
    format!("{:020}", timestamp)
}

fn decode_timestamp(raw: &str) -> Result<u64, KvError> {
    raw.parse()
        .map_err(|_| KvError::Serialisation(format!("bad timestamp field: {raw}")))
}

#[async_trait]
impl KvBackend for ValkeyKv {
    async fn get(&self, key: &str) -> Result<Option<Versioned>, KvError> {
        let mut conn = self.conn().await?;

        let prefixed = self.prefixed_key(key);
        let (timestamp, value): (Option<String>, Option<Vec<u8>>) = redis::cmd("HMGET")
            .arg(&prefixed)
            .arg(TIMESTAMP_FIELD)
            .arg(VALUE_FIELD)
            .query_async(&mut *conn)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;

        match (timestamp, value) {
            (Some(ts), Some(value)) => Ok(Some(Versioned::new(decode_timestamp(&ts)?, value))),
            _ => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Versioned) -> Result<bool, KvError> {
        let mut conn = self.conn().await?;

        let prefixed = self.prefixed_key(key);
        let applied: i64 = self
            .put_script
            .key(&prefixed)
            .arg(encode_timestamp(value.timestamp))
            .arg(value.value)
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;

        Ok(applied == 1)
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn().await?;

        let prefixed = self.prefixed_key(key);
        let deleted: i64 = conn
            .del(&prefixed)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;

        Ok(deleted > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn().await?;

        let prefixed = self.prefixed_key(key);
        let exists: bool = conn
            .exists(&prefixed)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;

        Ok(exists)
    }

    async fn list(
        &self,
        prefix: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<(Vec<String>, Option<String>), KvError> {
        let mut conn = self.conn().await?;

        let pattern = self.prefixed_key(&format!("{}*", prefix));
        let start_cursor: u64 = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);

        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(start_cursor)
            .arg("MATCH")
            .arg(&pattern)
            .arg("COUNT")
            .arg(limit)
            .query_async(&mut *conn)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;

        let stripped_keys: Vec<String> = keys
            .into_iter()
            .map(|k| self.strip_prefix(&k).to_string())
            .collect();

        let next = if next_cursor == 0 {
            None
        } else {
            Some(next_cursor.to_string())
        };

        Ok((stripped_keys, next))
    }
}
