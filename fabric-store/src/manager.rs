//! Connection pooling and fallback engagement.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::factory::AdapterFactory;
use crate::hardware::HostProfile;
use crate::traits::{
    CacheStore, DocumentStore, GraphStore, KeyValueStore, RelationalStore, VectorStore,
};
use crate::types::{DbBackend, DbType};
use crate::{StoreConfig, StoreError, StoreResult};

type PoolKey = (String, DbBackend);

#[derive(Default)]
struct Pools {
    vector: HashMap<PoolKey, Arc<dyn VectorStore>>,
    graph: HashMap<PoolKey, Arc<dyn GraphStore>>,
    key_value: HashMap<PoolKey, Arc<dyn KeyValueStore>>,
    document: HashMap<PoolKey, Arc<dyn DocumentStore>>,
    cache: HashMap<PoolKey, Arc<dyn CacheStore>>,
    relation: HashMap<PoolKey, Arc<dyn RelationalStore>>,
}

/// Central entry point for all database access.
///
/// Adapters are created lazily and pooled by `(type, namespace, backend)`
/// behind a single mutex. When a preferred backend fails to connect, the
/// manager logs a warning and transparently engages the file-based
/// fallback of the same type under the original pool key.
pub struct DatabaseManager {
    config: StoreConfig,
    host: HostProfile,
    pools: Mutex<Pools>,
}

/// Resolves the backend, then fetches or builds the pooled adapter for one
/// data-model family. Shared by every `get_*_db` accessor.
macro_rules! pooled {
    ($self:ident, $family:ident, $db_type:expr, $create:path, $namespace:ident, $backend:ident) => {{
        let requested = match $backend {
            Some(backend) => {
                if !backend.supports($db_type) {
                    return Err(StoreError::UnsupportedBackend {
                        db_type: $db_type,
                        backend,
                    });
                }
                backend
            }
            None => AdapterFactory::default_backend($db_type, &$self.config, &$self.host),
        };
        let key = ($namespace.to_string(), requested);

        let mut pools = $self.pools.lock().await;
        if let Some(adapter) = pools.$family.get(&key) {
            if adapter.is_connected().await {
                return Ok(Arc::clone(adapter));
            }
            // Stale pooled entry: try to revive it before replacing it.
            if adapter.connect().await.is_ok() {
                return Ok(Arc::clone(adapter));
            }
            pools.$family.remove(&key);
        }

        let adapter = $create(requested, $namespace, &$self.config)?;
        match adapter.connect().await {
            Ok(()) => {
                info!(db_type = %$db_type, namespace = %$namespace, backend = %requested, "database connected");
                pools.$family.insert(key, Arc::clone(&adapter));
                Ok(adapter)
            }
            Err(err @ StoreError::Unavailable { .. }) => {
                let fallback = AdapterFactory::fallback_backend($db_type);
                if fallback == requested {
                    return Err(err);
                }
                warn!(
                    db_type = %$db_type,
                    namespace = %$namespace,
                    preferred = %requested,
                    %fallback,
                    %err,
                    "preferred backend unavailable; engaging fallback"
                );
                let adapter = $create(fallback, $namespace, &$self.config)?;
                adapter.connect().await?;
                pools.$family.insert(key, Arc::clone(&adapter));
                Ok(adapter)
            }
            Err(err) => Err(err),
        }
    }};
}

impl DatabaseManager {
    /// Creates a manager, detecting the host profile.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self::with_host(config, HostProfile::detect())
    }

    /// Creates a manager with an explicit host profile.
    #[must_use]
    pub fn with_host(config: StoreConfig, host: HostProfile) -> Self {
        Self {
            config,
            host,
            pools: Mutex::new(Pools::default()),
        }
    }

    /// Returns the facade configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns a pooled vector database for `namespace`.
    ///
    /// # Errors
    ///
    /// Propagates construction and connection failures after fallback
    /// handling.
    pub async fn get_vector_db(
        &self,
        namespace: &str,
        backend: Option<DbBackend>,
    ) -> StoreResult<Arc<dyn VectorStore>> {
        pooled!(
            self,
            vector,
            DbType::Vector,
            AdapterFactory::create_vector,
            namespace,
            backend
        )
    }

    /// Returns a pooled graph database for `namespace`.
    ///
    /// # Errors
    ///
    /// Propagates construction and connection failures after fallback
    /// handling.
    pub async fn get_graph_db(
        &self,
        namespace: &str,
        backend: Option<DbBackend>,
    ) -> StoreResult<Arc<dyn GraphStore>> {
        pooled!(
            self,
            graph,
            DbType::Graph,
            AdapterFactory::create_graph,
            namespace,
            backend
        )
    }

    /// Returns a pooled key-value database for `namespace`.
    ///
    /// # Errors
    ///
    /// Propagates construction and connection failures after fallback
    /// handling.
    pub async fn get_key_value_db(
        &self,
        namespace: &str,
        backend: Option<DbBackend>,
    ) -> StoreResult<Arc<dyn KeyValueStore>> {
        pooled!(
            self,
            key_value,
            DbType::KeyValue,
            AdapterFactory::create_key_value,
            namespace,
            backend
        )
    }

    /// Returns a pooled document database for `namespace`.
    ///
    /// # Errors
    ///
    /// Propagates construction and connection failures after fallback
    /// handling.
    pub async fn get_document_db(
        &self,
        namespace: &str,
        backend: Option<DbBackend>,
    ) -> StoreResult<Arc<dyn DocumentStore>> {
        pooled!(
            self,
            document,
            DbType::Document,
            AdapterFactory::create_document,
            namespace,
            backend
        )
    }

    /// Returns a pooled cache for `namespace`.
    ///
    /// # Errors
    ///
    /// Propagates construction and connection failures after fallback
    /// handling.
    pub async fn get_cache_db(
        &self,
        namespace: &str,
        backend: Option<DbBackend>,
    ) -> StoreResult<Arc<dyn CacheStore>> {
        pooled!(
            self,
            cache,
            DbType::Cache,
            AdapterFactory::create_cache,
            namespace,
            backend
        )
    }

    /// Returns a pooled relational database for `namespace`.
    ///
    /// # Errors
    ///
    /// Propagates construction and connection failures after fallback
    /// handling.
    pub async fn get_relational_db(
        &self,
        namespace: &str,
        backend: Option<DbBackend>,
    ) -> StoreResult<Arc<dyn RelationalStore>> {
        pooled!(
            self,
            relation,
            DbType::Relation,
            AdapterFactory::create_relational,
            namespace,
            backend
        )
    }

    /// Disconnects and drops every pooled adapter for one `(type,
    /// namespace)` pair. Returns how many adapters were closed.
    pub async fn close_connection(&self, db_type: DbType, namespace: &str) -> usize {
        macro_rules! close_family {
            ($pools:ident, $family:ident) => {{
                let doomed: Vec<PoolKey> = $pools
                    .$family
                    .keys()
                    .filter(|(ns, _)| ns == namespace)
                    .cloned()
                    .collect();
                let mut closed = 0;
                for key in doomed {
                    if let Some(adapter) = $pools.$family.remove(&key) {
                        if let Err(err) = adapter.disconnect().await {
                            warn!(namespace, %err, "adapter disconnect failed");
                        }
                        closed += 1;
                    }
                }
                closed
            }};
        }

        let mut pools = self.pools.lock().await;
        match db_type {
            DbType::Vector => close_family!(pools, vector),
            DbType::Graph => close_family!(pools, graph),
            DbType::KeyValue => close_family!(pools, key_value),
            DbType::Document => close_family!(pools, document),
            DbType::Cache => close_family!(pools, cache),
            DbType::Relation => close_family!(pools, relation),
        }
    }

    /// Flushes and closes every pooled adapter.
    pub async fn close_all(&self) {
        macro_rules! drain_family {
            ($pools:ident, $family:ident) => {
                for (key, adapter) in $pools.$family.drain() {
                    if let Err(err) = adapter.disconnect().await {
                        warn!(namespace = %key.0, backend = %key.1, %err, "adapter disconnect failed");
                    }
                }
            };
        }

        let mut pools = self.pools.lock().await;
        drain_family!(pools, vector);
        drain_family!(pools, graph);
        drain_family!(pools, key_value);
        drain_family!(pools, document);
        drain_family!(pools, cache);
        drain_family!(pools, relation);
        info!("all database connections closed");
    }

    /// Lists the namespaces with a live pooled adapter of the given type.
    pub async fn namespaces(&self, db_type: DbType) -> Vec<String> {
        let pools = self.pools.lock().await;
        let mut names: Vec<String> = match db_type {
            DbType::Vector => pools.vector.keys().map(|(ns, _)| ns.clone()).collect(),
            DbType::Graph => pools.graph.keys().map(|(ns, _)| ns.clone()).collect(),
            DbType::KeyValue => pools.key_value.keys().map(|(ns, _)| ns.clone()).collect(),
            DbType::Document => pools.document.keys().map(|(ns, _)| ns.clone()).collect(),
            DbType::Cache => pools.cache.keys().map(|(ns, _)| ns.clone()).collect(),
            DbType::Relation => pools.relation.keys().map(|(ns, _)| ns.clone()).collect(),
        };
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> DatabaseManager {
        DatabaseManager::with_host(
            StoreConfig::new(dir.path()),
            HostProfile::with("x86_64", 4),
        )
    }

    #[tokio::test]
    async fn adapters_are_pooled_per_namespace_and_backend() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        let first = manager.get_vector_db("engram", None).await.unwrap();
        let second = manager.get_vector_db("engram", None).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = manager.get_vector_db("athena", None).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        let a = manager.get_key_value_db("ns_a", None).await.unwrap();
        let b = manager.get_key_value_db("ns_b", None).await.unwrap();

        a.set("shared-key", json!("from-a"), None).await.unwrap();
        assert_eq!(b.get("shared-key").await.unwrap(), None);
        assert_eq!(a.get("shared-key").await.unwrap(), Some(json!("from-a")));
    }

    #[tokio::test]
    async fn unreachable_redis_falls_back_to_file() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path()).with_redis_url("redis://127.0.0.1:1");
        let manager = DatabaseManager::with_host(config, HostProfile::with("x86_64", 4));

        let kv = manager.get_key_value_db("fallback", None).await.unwrap();
        assert_eq!(kv.backend(), DbBackend::File);

        kv.set("k", json!("v"), None).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), Some(json!("v")));

        // The fallback is pooled: the next call reuses it.
        let again = manager.get_key_value_db("fallback", None).await.unwrap();
        assert!(Arc::ptr_eq(&kv, &again));
    }

    #[tokio::test]
    async fn explicit_backend_overrides_default() {
        let dir = TempDir::new().unwrap();
        let manager = DatabaseManager::with_host(
            StoreConfig::new(dir.path()),
            HostProfile::with("aarch64", 8),
        );

        let default = manager.get_vector_db("auto", None).await.unwrap();
        assert_eq!(default.backend(), DbBackend::Native);

        let named = manager
            .get_vector_db("named", Some(DbBackend::File))
            .await
            .unwrap();
        assert_eq!(named.backend(), DbBackend::File);

        let result = manager
            .get_vector_db("bad", Some(DbBackend::Sqlite))
            .await;
        assert!(
            matches!(result, Err(StoreError::UnsupportedBackend { .. })),
            "mismatched backend must fail"
        );
    }

    #[tokio::test]
    async fn close_connection_removes_pool_entries() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        manager.get_document_db("docs", None).await.unwrap();
        assert_eq!(
            manager.namespaces(DbType::Document).await,
            ["docs".to_string()]
        );

        assert_eq!(manager.close_connection(DbType::Document, "docs").await, 1);
        assert!(manager.namespaces(DbType::Document).await.is_empty());
    }

    #[tokio::test]
    async fn close_all_flushes_dirty_adapters() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        let kv = manager.get_key_value_db("durable", None).await.unwrap();
        kv.set("k", json!(1), None).await.unwrap();
        manager.close_all().await;

        assert!(dir.path().join("key_value/durable/kv.json").exists());
    }
}
