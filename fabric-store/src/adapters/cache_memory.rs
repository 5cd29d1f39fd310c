//! In-memory cache adapter with per-entry expiry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::traits::{CacheStore, DatabaseAdapter};
use crate::types::{DbBackend, DbType};
use crate::{StoreError, StoreResult};

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    connected: bool,
    entries: HashMap<String, CacheEntry>,
}

/// In-memory [`CacheStore`]. Nothing is persisted.
pub struct MemoryCacheAdapter {
    namespace: String,
    inner: RwLock<Inner>,
}

impl MemoryCacheAdapter {
    /// Creates an adapter for one namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            inner: RwLock::new(Inner::default()),
        }
    }

    fn ensure_connected(&self, inner: &Inner) -> StoreResult<()> {
        if inner.connected {
            Ok(())
        } else {
            Err(StoreError::NotConnected {
                db_type: DbType::Cache,
                namespace: self.namespace.clone(),
            })
        }
    }
}

#[async_trait]
impl DatabaseAdapter for MemoryCacheAdapter {
    fn db_type(&self) -> DbType {
        DbType::Cache
    }

    fn backend(&self) -> DbBackend {
        DbBackend::Memory
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn connect(&self) -> StoreResult<()> {
        self.inner.write().await.connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.connected = false;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.inner.read().await.connected
    }
}

#[async_trait]
impl CacheStore for MemoryCacheAdapter {
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;
        let now = Instant::now();
        match inner.entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                inner.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;
        Ok(inner.entries.remove(key).is_some())
    }

    async fn flush(&self) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;
        inner.entries.clear();
        Ok(())
    }

    async fn touch(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;
        let now = Instant::now();
        match inner.entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            Some(_) => {
                inner.entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }
}
