//! Redis key-value adapter: the preferred backend when a daemon is
//! configured.
//!
//! Keys are prefixed with the adapter namespace; values are stored as JSON
//! strings. A connection failure surfaces as `Unavailable` so the manager
//! can fall back to the flat-file adapter.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::info;

use crate::traits::{DatabaseAdapter, KeyValueStore};
use crate::types::{DbBackend, DbType};
use crate::{StoreError, StoreResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const SCAN_BATCH: usize = 100;

/// Redis-backed [`KeyValueStore`].
pub struct RedisKeyValueAdapter {
    namespace: String,
    url: String,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisKeyValueAdapter {
    /// Creates an adapter for one namespace against the given daemon URL.
    #[must_use]
    pub fn new(namespace: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            url: url.into(),
            connection: Mutex::new(None),
        }
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn not_connected(&self) -> StoreError {
        StoreError::NotConnected {
            db_type: DbType::KeyValue,
            namespace: self.namespace.clone(),
        }
    }

    fn backend_err(err: &redis::RedisError) -> StoreError {
        StoreError::backend(format!("redis: {err}"))
    }

    fn encode(value: &Value) -> StoreResult<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode(raw: Option<String>) -> StoreResult<Option<Value>> {
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl DatabaseAdapter for RedisKeyValueAdapter {
    fn db_type(&self) -> DbType {
        DbType::KeyValue
    }

    fn backend(&self) -> DbBackend {
        DbBackend::Redis
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn connect(&self) -> StoreResult<()> {
        let client = redis::Client::open(self.url.as_str())
            .map_err(|err| StoreError::unavailable(DbBackend::Redis, err.to_string()))?;
        let connection = timeout(CONNECT_TIMEOUT, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| {
                StoreError::unavailable(
                    DbBackend::Redis,
                    format!("connect to {} timed out", self.url),
                )
            })?
            .map_err(|err| StoreError::unavailable(DbBackend::Redis, err.to_string()))?;

        *self.connection.lock().await = Some(connection);
        info!(namespace = %self.namespace, url = %self.url, "redis kv adapter connected");
        Ok(())
    }

    async fn disconnect(&self) -> StoreResult<()> {
        *self.connection.lock().await = None;
        info!(namespace = %self.namespace, "redis kv adapter disconnected");
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        let mut guard = self.connection.lock().await;
        match guard.as_mut() {
            Some(connection) => {
                let pong: Result<String, _> = redis::cmd("PING").query_async(connection).await;
                pong.is_ok()
            }
            None => false,
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisKeyValueAdapter {
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> StoreResult<()> {
        let encoded = Self::encode(&value)?;
        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or_else(|| self.not_connected())?;

        let mut command = redis::cmd("SET");
        command.arg(self.scoped(key)).arg(encoded);
        if let Some(ttl) = ttl {
            command.arg("EX").arg(ttl.as_secs().max(1));
        }
        let done: Result<(), _> = command.query_async(connection).await;
        done.map_err(|err| Self::backend_err(&err))
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or_else(|| self.not_connected())?;

        let raw: Option<String> = redis::cmd("GET")
            .arg(self.scoped(key))
            .query_async(connection)
            .await
            .map_err(|err| Self::backend_err(&err))?;
        Self::decode(raw)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or_else(|| self.not_connected())?;

        let removed: usize = redis::cmd("DEL")
            .arg(self.scoped(key))
            .query_async(connection)
            .await
            .map_err(|err| Self::backend_err(&err))?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or_else(|| self.not_connected())?;

        let found: usize = redis::cmd("EXISTS")
            .arg(self.scoped(key))
            .query_async(connection)
            .await
            .map_err(|err| Self::backend_err(&err))?;
        Ok(found > 0)
    }

    async fn set_batch(&self, entries: Vec<(String, Value)>) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut command = redis::cmd("MSET");
        for (key, value) in &entries {
            command.arg(self.scoped(key)).arg(Self::encode(value)?);
        }

        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or_else(|| self.not_connected())?;
        let done: Result<(), _> = command.query_async(connection).await;
        done.map_err(|err| Self::backend_err(&err))
    }

    async fn get_batch(&self, keys: &[String]) -> StoreResult<HashMap<String, Value>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let mut command = redis::cmd("MGET");
        for key in keys {
            command.arg(self.scoped(key));
        }

        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or_else(|| self.not_connected())?;
        let values: Vec<Option<String>> = command
            .query_async(connection)
            .await
            .map_err(|err| Self::backend_err(&err))?;

        let mut out = HashMap::new();
        for (key, raw) in keys.iter().zip(values) {
            if let Some(value) = Self::decode(raw)? {
                out.insert(key.clone(), value);
            }
        }
        Ok(out)
    }

    async fn delete_batch(&self, keys: &[String]) -> StoreResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut command = redis::cmd("DEL");
        for key in keys {
            command.arg(self.scoped(key));
        }

        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or_else(|| self.not_connected())?;
        let removed: usize = command
            .query_async(connection)
            .await
            .map_err(|err| Self::backend_err(&err))?;
        Ok(removed)
    }

    async fn clear_namespace(&self) -> StoreResult<()> {
        let pattern = format!("{}:*", self.namespace);
        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or_else(|| self.not_connected())?;

        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(connection)
                .await
                .map_err(|err| Self::backend_err(&err))?;

            if !keys.is_empty() {
                let mut command = redis::cmd("DEL");
                for key in &keys {
                    command.arg(key);
                }
                let _removed: usize = command
                    .query_async(connection)
                    .await
                    .map_err(|err| Self::backend_err(&err))?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn unreachable_daemon_reports_unavailable() {
        let adapter = RedisKeyValueAdapter::new("unit", "redis://127.0.0.1:1");
        let err = adapter.connect().await.expect_err("dead port must fail");
        assert!(matches!(
            err,
            StoreError::Unavailable {
                backend: DbBackend::Redis,
                ..
            }
        ));
        assert!(!adapter.is_connected().await);
    }

    #[tokio::test]
    async fn operations_require_connection() {
        let adapter = RedisKeyValueAdapter::new("unit", "redis://127.0.0.1:1");
        let err = adapter
            .set("k", json!(1), None)
            .await
            .expect_err("disconnected adapter must refuse writes");
        assert!(matches!(err, StoreError::NotConnected { .. }));
    }

    // Exercises a real daemon; run with `cargo test -- --ignored` when one
    // is listening on the default port.
    #[tokio::test]
    #[ignore]
    async fn round_trip_against_local_daemon() {
        let namespace = format!("kvtest-{}", uuid::Uuid::new_v4());
        let adapter = RedisKeyValueAdapter::new(namespace, "redis://127.0.0.1:6379");
        adapter.connect().await.unwrap();

        adapter.set("k", json!({"v": 1}), None).await.unwrap();
        assert_eq!(adapter.get("k").await.unwrap(), Some(json!({"v": 1})));
        assert!(adapter.exists("k").await.unwrap());

        adapter
            .set_batch(vec![("a".into(), json!(1)), ("b".into(), json!(2))])
            .await
            .unwrap();
        let batch = adapter
            .get_batch(&["a".into(), "b".into(), "missing".into()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);

        adapter.clear_namespace().await.unwrap();
        assert!(!adapter.exists("k").await.unwrap());
        adapter.disconnect().await.unwrap();
    }
}
