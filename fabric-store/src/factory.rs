//! Adapter construction and backend selection.

use std::sync::Arc;

use tracing::debug;

use crate::adapters::{
    FileDocumentAdapter, FileKeyValueAdapter, FileVectorAdapter, MemoryCacheAdapter,
    MemoryGraphAdapter, NativeVectorAdapter, RedisKeyValueAdapter, SqliteRelationalAdapter,
};
use crate::hardware::HostProfile;
use crate::traits::{
    CacheStore, DocumentStore, GraphStore, KeyValueStore, RelationalStore, VectorStore,
};
use crate::types::{DbBackend, DbType};
use crate::{StoreConfig, StoreError, StoreResult};

/// Creates adapters and picks backends for the host.
pub struct AdapterFactory;

impl AdapterFactory {
    /// Picks the preferred backend for a data model on this host.
    #[must_use]
    pub fn default_backend(
        db_type: DbType,
        config: &StoreConfig,
        host: &HostProfile,
    ) -> DbBackend {
        let backend = match db_type {
            DbType::Vector => {
                if host.prefers_accelerated_vector() {
                    DbBackend::Native
                } else {
                    DbBackend::File
                }
            }
            DbType::Graph | DbType::Cache => DbBackend::Memory,
            DbType::KeyValue => {
                if config.redis_url.is_some() {
                    DbBackend::Redis
                } else {
                    DbBackend::File
                }
            }
            DbType::Document => DbBackend::File,
            DbType::Relation => DbBackend::Sqlite,
        };
        debug!(db_type = %db_type, backend = %backend, "backend selected");
        backend
    }

    /// Returns the always-available fallback backend for a data model.
    #[must_use]
    pub const fn fallback_backend(db_type: DbType) -> DbBackend {
        match db_type {
            DbType::Vector | DbType::KeyValue | DbType::Document => DbBackend::File,
            DbType::Graph | DbType::Cache => DbBackend::Memory,
            DbType::Relation => DbBackend::Sqlite,
        }
    }

    /// Creates a vector adapter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedBackend`] for backends that do not
    /// serve vectors.
    pub fn create_vector(
        backend: DbBackend,
        namespace: &str,
        config: &StoreConfig,
    ) -> StoreResult<Arc<dyn VectorStore>> {
        match backend {
            DbBackend::Native => Ok(Arc::new(NativeVectorAdapter::new(namespace, config))),
            DbBackend::File => Ok(Arc::new(FileVectorAdapter::new(namespace, config))),
            other => Err(StoreError::UnsupportedBackend {
                db_type: DbType::Vector,
                backend: other,
            }),
        }
    }

    /// Creates a graph adapter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedBackend`] for backends that do not
    /// serve graphs.
    pub fn create_graph(
        backend: DbBackend,
        namespace: &str,
        config: &StoreConfig,
    ) -> StoreResult<Arc<dyn GraphStore>> {
        match backend {
            DbBackend::Memory => Ok(Arc::new(MemoryGraphAdapter::new(namespace, config))),
            other => Err(StoreError::UnsupportedBackend {
                db_type: DbType::Graph,
                backend: other,
            }),
        }
    }

    /// Creates a key-value adapter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when Redis is requested without
    /// a configured URL and [`StoreError::UnsupportedBackend`] for other
    /// non-key-value backends.
    pub fn create_key_value(
        backend: DbBackend,
        namespace: &str,
        config: &StoreConfig,
    ) -> StoreResult<Arc<dyn KeyValueStore>> {
        match backend {
            DbBackend::Redis => {
                let url = config.redis_url.as_ref().ok_or_else(|| {
                    StoreError::unavailable(DbBackend::Redis, "no redis_url configured")
                })?;
                Ok(Arc::new(RedisKeyValueAdapter::new(namespace, url)))
            }
            DbBackend::File => Ok(Arc::new(FileKeyValueAdapter::new(namespace, config))),
            other => Err(StoreError::UnsupportedBackend {
                db_type: DbType::KeyValue,
                backend: other,
            }),
        }
    }

    /// Creates a document adapter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedBackend`] for backends that do not
    /// serve documents.
    pub fn create_document(
        backend: DbBackend,
        namespace: &str,
        config: &StoreConfig,
    ) -> StoreResult<Arc<dyn DocumentStore>> {
        match backend {
            DbBackend::File => Ok(Arc::new(FileDocumentAdapter::new(namespace, config))),
            other => Err(StoreError::UnsupportedBackend {
                db_type: DbType::Document,
                backend: other,
            }),
        }
    }

    /// Creates a cache adapter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedBackend`] for backends that do not
    /// serve caches.
    pub fn create_cache(
        backend: DbBackend,
        namespace: &str,
        _config: &StoreConfig,
    ) -> StoreResult<Arc<dyn CacheStore>> {
        match backend {
            DbBackend::Memory => Ok(Arc::new(MemoryCacheAdapter::new(namespace))),
            other => Err(StoreError::UnsupportedBackend {
                db_type: DbType::Cache,
                backend: other,
            }),
        }
    }

    /// Creates a relational adapter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedBackend`] for backends that do not
    /// serve relational data.
    pub fn create_relational(
        backend: DbBackend,
        namespace: &str,
        config: &StoreConfig,
    ) -> StoreResult<Arc<dyn RelationalStore>> {
        match backend {
            DbBackend::Sqlite => Ok(Arc::new(SqliteRelationalAdapter::new(namespace, config))),
            other => Err(StoreError::UnsupportedBackend {
                db_type: DbType::Relation,
                backend: other,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_default_follows_host() {
        let config = StoreConfig::default();
        assert_eq!(
            AdapterFactory::default_backend(
                DbType::Vector,
                &config,
                &HostProfile::with("aarch64", 4)
            ),
            DbBackend::Native
        );
        assert_eq!(
            AdapterFactory::default_backend(
                DbType::Vector,
                &config,
                &HostProfile::with("x86_64", 4)
            ),
            DbBackend::File
        );
    }

    #[test]
    fn key_value_prefers_daemon_when_configured() {
        let host = HostProfile::with("x86_64", 4);
        let plain = StoreConfig::default();
        assert_eq!(
            AdapterFactory::default_backend(DbType::KeyValue, &plain, &host),
            DbBackend::File
        );
        let with_daemon = StoreConfig::default().with_redis_url("redis://localhost:6379");
        assert_eq!(
            AdapterFactory::default_backend(DbType::KeyValue, &with_daemon, &host),
            DbBackend::Redis
        );
    }

    #[test]
    fn unsupported_combinations_are_rejected() {
        let config = StoreConfig::default();
        assert!(AdapterFactory::create_vector(DbBackend::Redis, "ns", &config).is_err());
        assert!(AdapterFactory::create_graph(DbBackend::Sqlite, "ns", &config).is_err());
        assert!(AdapterFactory::create_relational(DbBackend::File, "ns", &config).is_err());
    }
}
