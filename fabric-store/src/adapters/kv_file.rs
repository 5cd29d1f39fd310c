//! Flat-file key-value adapter: the fallback when no daemon is reachable.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::traits::{DatabaseAdapter, KeyValueStore};
use crate::types::{DbBackend, DbType};
use crate::{StoreConfig, StoreError, StoreResult};

const DATA_FILE: &str = "kv.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KvEntry {
    value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl KvEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| now > deadline)
    }
}

#[derive(Default)]
struct Inner {
    connected: bool,
    dirty: bool,
    entries: HashMap<String, KvEntry>,
}

/// File-backed [`KeyValueStore`] with lazy TTL expiry.
pub struct FileKeyValueAdapter {
    namespace: String,
    data_file: PathBuf,
    dir: PathBuf,
    inner: RwLock<Inner>,
}

impl FileKeyValueAdapter {
    /// Creates an adapter for one namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>, config: &StoreConfig) -> Self {
        let namespace = namespace.into();
        let dir = config.namespace_path(DbType::KeyValue, &namespace);
        Self {
            namespace,
            data_file: dir.join(DATA_FILE),
            dir,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn ensure_connected(&self, inner: &Inner) -> StoreResult<()> {
        if inner.connected {
            Ok(())
        } else {
            Err(StoreError::NotConnected {
                db_type: DbType::KeyValue,
                namespace: self.namespace.clone(),
            })
        }
    }

    async fn save(&self, inner: &mut Inner) -> StoreResult<()> {
        fs::write(&self.data_file, serde_json::to_vec(&inner.entries)?).await?;
        inner.dirty = false;
        debug!(namespace = %self.namespace, count = inner.entries.len(), "kv entries flushed");
        Ok(())
    }

    fn prune_expired(inner: &mut Inner) {
        let now = Utc::now();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        if inner.entries.len() < before {
            inner.dirty = true;
        }
    }
}

#[async_trait]
impl DatabaseAdapter for FileKeyValueAdapter {
    fn db_type(&self) -> DbType {
        DbType::KeyValue
    }

    fn backend(&self) -> DbBackend {
        DbBackend::File
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn connect(&self) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        fs::create_dir_all(&self.dir).await?;
        if fs::try_exists(&self.data_file).await? {
            let raw = fs::read(&self.data_file).await?;
            if !raw.is_empty() {
                inner.entries = serde_json::from_slice(&raw)?;
            }
        }
        Self::prune_expired(&mut inner);
        inner.connected = true;
        info!(namespace = %self.namespace, count = inner.entries.len(), "file kv adapter connected");
        Ok(())
    }

    async fn disconnect(&self) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.connected {
            return Ok(());
        }
        if inner.dirty {
            self.save(&mut inner).await?;
        }
        *inner = Inner::default();
        info!(namespace = %self.namespace, "file kv adapter disconnected");
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.inner.read().await.connected
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueAdapter {
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl);
        inner.entries.insert(key.to_string(), KvEntry { value, expires_at });
        inner.dirty = true;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;
        let now = Utc::now();
        if inner.entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            inner.entries.remove(key);
            inner.dirty = true;
            return Ok(None);
        }
        Ok(inner.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;
        let existed = inner.entries.remove(key).is_some();
        if existed {
            inner.dirty = true;
        }
        Ok(existed)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn set_batch(&self, entries: Vec<(String, Value)>) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;
        for (key, value) in entries {
            inner.entries.insert(key, KvEntry { value, expires_at: None });
        }
        inner.dirty = true;
        Ok(())
    }

    async fn get_batch(&self, keys: &[String]) -> StoreResult<HashMap<String, Value>> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;
        Self::prune_expired(&mut inner);
        Ok(keys
            .iter()
            .filter_map(|key| {
                inner
                    .entries
                    .get(key)
                    .map(|entry| (key.clone(), entry.value.clone()))
            })
            .collect())
    }

    async fn delete_batch(&self, keys: &[String]) -> StoreResult<usize> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;
        let mut removed = 0;
        for key in keys {
            if inner.entries.remove(key).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            inner.dirty = true;
        }
        Ok(removed)
    }

    async fn clear_namespace(&self) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;
        inner.entries.clear();
        inner.dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn adapter(dir: &TempDir) -> FileKeyValueAdapter {
        let adapter = FileKeyValueAdapter::new("unit", &StoreConfig::new(dir.path()));
        adapter.connect().await.unwrap();
        adapter
    }

    #[tokio::test]
    async fn set_get_delete_round_trip() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir).await;

        adapter.set("k", json!("v"), None).await.unwrap();
        assert_eq!(adapter.get("k").await.unwrap(), Some(json!("v")));
        assert!(adapter.exists("k").await.unwrap());
        assert!(adapter.delete("k").await.unwrap());
        assert!(!adapter.exists("k").await.unwrap());
        assert!(!adapter.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn ttl_expires_entries() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir).await;

        adapter
            .set("short", json!(1), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(adapter.get("short").await.unwrap(), Some(json!(1)));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(adapter.get("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn batches_and_clear() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir).await;

        adapter
            .set_batch(vec![
                ("a".into(), json!(1)),
                ("b".into(), json!(2)),
                ("c".into(), json!(3)),
            ])
            .await
            .unwrap();

        let got = adapter
            .get_batch(&["a".into(), "b".into(), "missing".into()])
            .await
            .unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got["b"], json!(2));

        assert_eq!(
            adapter.delete_batch(&["a".into(), "missing".into()]).await.unwrap(),
            1
        );

        adapter.clear_namespace().await.unwrap();
        assert!(!adapter.exists("b").await.unwrap());
        assert!(!adapter.exists("c").await.unwrap());
    }

    #[tokio::test]
    async fn persists_across_reconnect() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path());
        {
            let adapter = FileKeyValueAdapter::new("persist", &config);
            adapter.connect().await.unwrap();
            adapter.set("k", json!({"nested": true}), None).await.unwrap();
            adapter.disconnect().await.unwrap();
        }

        let adapter = FileKeyValueAdapter::new("persist", &config);
        adapter.connect().await.unwrap();
        assert_eq!(
            adapter.get("k").await.unwrap(),
            Some(json!({"nested": true}))
        );
    }
}
