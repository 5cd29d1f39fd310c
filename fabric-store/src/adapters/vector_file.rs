//! Flat-file vector adapter: the universal fallback.
//!
//! Vectors live in `vectors.json` (JSON metadata, sorted by id) with a
//! raw little-endian f32 dump in `index.bin`. Similarities are computed by
//! scanning the loaded records, which is adequate for the namespace sizes
//! this fallback serves.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::adapters::{dot, l2_normalize};
use crate::filter::{Filter, matches_filter};
use crate::traits::{DatabaseAdapter, SearchHit, VectorRecord, VectorStore};
use crate::types::{DbBackend, DbType};
use crate::{StoreConfig, StoreError, StoreResult};

const DATA_FILE: &str = "vectors.json";
const INDEX_FILE: &str = "index.bin";

#[derive(Default)]
struct Inner {
    connected: bool,
    dirty: bool,
    records: BTreeMap<String, VectorRecord>,
    dimension: Option<usize>,
}

/// File-backed [`VectorStore`].
pub struct FileVectorAdapter {
    namespace: String,
    k_multiplier: usize,
    data_file: PathBuf,
    index_file: PathBuf,
    dir: PathBuf,
    inner: RwLock<Inner>,
}

impl FileVectorAdapter {
    /// Creates an adapter for one namespace. No I/O happens until
    /// [`connect`](DatabaseAdapter::connect).
    #[must_use]
    pub fn new(namespace: impl Into<String>, config: &StoreConfig) -> Self {
        let namespace = namespace.into();
        let dir = config.namespace_path(DbType::Vector, &namespace);
        Self {
            namespace,
            k_multiplier: config.vector.k_multiplier,
            data_file: dir.join(DATA_FILE),
            index_file: dir.join(INDEX_FILE),
            dir,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn ensure_connected(&self, inner: &Inner) -> StoreResult<()> {
        if inner.connected {
            Ok(())
        } else {
            Err(StoreError::NotConnected {
                db_type: DbType::Vector,
                namespace: self.namespace.clone(),
            })
        }
    }

    async fn save(&self, inner: &mut Inner) -> StoreResult<()> {
        let json = serde_json::to_vec(&inner.records)?;
        fs::write(&self.data_file, json).await?;

        let mut packed = Vec::new();
        for record in inner.records.values() {
            for value in &record.vector {
                packed.extend_from_slice(&value.to_le_bytes());
            }
        }
        fs::write(&self.index_file, packed).await?;

        inner.dirty = false;
        debug!(namespace = %self.namespace, count = inner.records.len(), "vectors flushed");
        Ok(())
    }

    fn check_dimension(inner: &mut Inner, len: usize) -> StoreResult<()> {
        if inner.records.is_empty() {
            // An empty store adopts whatever dimension arrives next.
            inner.dimension = Some(len);
            return Ok(());
        }
        match inner.dimension {
            Some(expected) if expected != len => Err(StoreError::invalid(format!(
                "vector dimension mismatch: expected {expected}, got {len}"
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl DatabaseAdapter for FileVectorAdapter {
    fn db_type(&self) -> DbType {
        DbType::Vector
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
                inner.records = serde_json::from_slice(&raw)?;
            }
        }
        inner.dimension = inner.records.values().next().map(|record| record.vector.len());
        inner.connected = true;
        inner.dirty = false;
        info!(namespace = %self.namespace, count = inner.records.len(), "file vector adapter connected");
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
        inner.records.clear();
        inner.dimension = None;
        inner.connected = false;
        info!(namespace = %self.namespace, "file vector adapter disconnected");
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.inner.read().await.connected
    }
}

#[async_trait]
impl VectorStore for FileVectorAdapter {
    async fn store(
        &self,
        id: &str,
        vector: Vec<f32>,
        metadata: Option<Map<String, Value>>,
        text: Option<String>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;
        if vector.is_empty() {
            return Err(StoreError::invalid("vector must not be empty"));
        }
        Self::check_dimension(&mut inner, vector.len())?;

        let record = VectorRecord {
            id: id.to_string(),
            vector: l2_normalize(vector),
            metadata: metadata.unwrap_or_default(),
            text,
            created_at: Utc::now(),
        };
        inner.records.insert(id.to_string(), record);
        inner.dirty = true;
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> StoreResult<Vec<SearchHit>> {
        let inner = self.inner.read().await;
        self.ensure_connected(&inner)?;
        if inner.records.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        if let Some(expected) = inner.dimension {
            if query.len() != expected {
                return Err(StoreError::invalid(format!(
                    "query dimension mismatch: expected {expected}, got {}",
                    query.len()
                )));
            }
        }

        let normalized = l2_normalize(query.to_vec());
        let mut candidates: Vec<(&VectorRecord, f32)> = inner
            .records
            .values()
            .map(|record| (record, dot(&record.vector, &normalized)))
            .collect();
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        // Overfetch to absorb post-filter losses.
        candidates.truncate(limit.saturating_mul(self.k_multiplier.max(1)));

        let hits = candidates
            .into_iter()
            .filter(|(record, _)| {
                filter.is_none_or(|filter| matches_filter(&record.metadata, filter))
            })
            .take(limit)
            .map(|(record, relevance)| SearchHit {
                id: record.id.clone(),
                metadata: record.metadata.clone(),
                text: record.text.clone(),
                relevance,
            })
            .collect();
        Ok(hits)
    }

    async fn get(&self, id: &str) -> StoreResult<Option<VectorRecord>> {
        let inner = self.inner.read().await;
        self.ensure_connected(&inner)?;
        Ok(inner.records.get(id).cloned())
    }

    async fn delete(&self, id: Option<&str>, filter: Option<&Filter>) -> StoreResult<usize> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;

        let removed = match (id, filter) {
            (Some(id), _) => usize::from(inner.records.remove(id).is_some()),
            (None, Some(filter)) => {
                let doomed: Vec<String> = inner
                    .records
                    .values()
                    .filter(|record| matches_filter(&record.metadata, filter))
                    .map(|record| record.id.clone())
                    .collect();
                for id in &doomed {
                    inner.records.remove(id);
                }
                doomed.len()
            }
            (None, None) => {
                let count = inner.records.len();
                inner.records.clear();
                count
            }
        };

        if removed > 0 {
            inner.dirty = true;
            if inner.records.is_empty() {
                inner.dimension = None;
            }
        }
        Ok(removed)
    }

    async fn list(
        &self,
        limit: usize,
        offset: usize,
        filter: Option<&Filter>,
    ) -> StoreResult<Vec<VectorRecord>> {
        let inner = self.inner.read().await;
        self.ensure_connected(&inner)?;

        let mut matching: Vec<VectorRecord> = inner
            .records
            .values()
            .filter(|record| {
                filter.is_none_or(|filter| matches_filter(&record.metadata, filter))
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }
}
