//! Facade configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::DbType;

/// Tuning for vector adapters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Candidate overfetch factor applied before post-filtering.
    pub k_multiplier: usize,
    /// Rebuild the packed index when the live-row ratio drops below this.
    pub rebuild_ratio: f32,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            k_multiplier: 10,
            rebuild_ratio: 0.5,
        }
    }
}

/// Tuning for the cache adapter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default entry lifetime in seconds when callers do not provide one.
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
        }
    }
}

/// Configuration shared by the factory and the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory for file-based adapters
    /// (`<base>/<db_type>/<namespace>/...`).
    pub base_path: PathBuf,
    /// Redis daemon URL; when set, key-value adapters prefer it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    /// Vector adapter tuning.
    #[serde(default)]
    pub vector: VectorConfig,
    /// Cache adapter tuning.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl StoreConfig {
    /// Creates a configuration rooted at the given base directory.
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            redis_url: None,
            vector: VectorConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    /// Sets the Redis daemon URL.
    #[must_use]
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    /// Returns the storage directory for one `(type, namespace)` pair.
    #[must_use]
    pub fn namespace_path(&self, db_type: DbType, namespace: &str) -> PathBuf {
        self.base_path.join(db_type.as_str()).join(namespace)
    }

    /// Returns the configured base directory.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(PathBuf::from(".tekton").join("data"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_paths_partition_by_type() {
        let config = StoreConfig::new("/tmp/fabric");
        assert_eq!(
            config.namespace_path(DbType::Vector, "engram"),
            PathBuf::from("/tmp/fabric/vector/engram")
        );
        assert_eq!(
            config.namespace_path(DbType::KeyValue, "engram"),
            PathBuf::from("/tmp/fabric/key_value/engram")
        );
    }
}
