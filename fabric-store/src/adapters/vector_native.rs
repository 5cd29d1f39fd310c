//! In-process accelerated vector adapter.
//!
//! Keeps a packed row-major candidate matrix hot in memory so searches are
//! a single pass of inner products. Deletions tombstone rows; the matrix
//! is rebuilt from scratch once the live-row ratio falls below the
//! configured threshold. Persistence shares the flat-file layout
//! (`vectors.json` + `index.bin`), and the binary index is reloaded on
//! connect when it still matches the record set.

use std::collections::{BTreeMap, HashMap};
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
    // Packed candidate matrix; a row is live iff row_of[id] points at it.
    rows: Vec<f32>,
    row_ids: Vec<String>,
    row_of: HashMap<String, usize>,
    dead_rows: usize,
}

impl Inner {
    fn rebuild_index(&mut self) {
        self.rows.clear();
        self.row_ids.clear();
        self.row_of.clear();
        self.dead_rows = 0;
        for (id, record) in &self.records {
            self.row_of.insert(id.clone(), self.row_ids.len());
            self.row_ids.push(id.clone());
            self.rows.extend_from_slice(&record.vector);
        }
    }

    fn tombstone(&mut self, id: &str) {
        if self.row_of.remove(id).is_some() {
            self.dead_rows += 1;
        }
    }

    fn live_ratio(&self) -> f32 {
        if self.row_ids.is_empty() {
            return 1.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            (self.row_ids.len() - self.dead_rows) as f32 / self.row_ids.len() as f32
        }
    }
}

/// In-memory packed-index [`VectorStore`] with file persistence.
pub struct NativeVectorAdapter {
    namespace: String,
    k_multiplier: usize,
    rebuild_ratio: f32,
    data_file: PathBuf,
    index_file: PathBuf,
    dir: PathBuf,
    inner: RwLock<Inner>,
}

impl NativeVectorAdapter {
    /// Creates an adapter for one namespace. No I/O happens until
    /// [`connect`](DatabaseAdapter::connect).
    #[must_use]
    pub fn new(namespace: impl Into<String>, config: &StoreConfig) -> Self {
        let namespace = namespace.into();
        let dir = config.namespace_path(DbType::Vector, &namespace);
        Self {
            namespace,
            k_multiplier: config.vector.k_multiplier,
            rebuild_ratio: config.vector.rebuild_ratio,
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

    fn maybe_rebuild(&self, inner: &mut Inner) {
        if inner.live_ratio() < self.rebuild_ratio {
            debug!(namespace = %self.namespace, dead = inner.dead_rows, "rebuilding fragmented index");
            inner.rebuild_index();
        }
    }

    async fn save(&self, inner: &mut Inner) -> StoreResult<()> {
        let json = serde_json::to_vec(&inner.records)?;
        fs::write(&self.data_file, json).await?;

        // Persist rows in sorted-id order so the index can be reloaded
        // against the JSON map.
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
impl DatabaseAdapter for NativeVectorAdapter {
    fn db_type(&self) -> DbType {
        DbType::Vector
    }

    fn backend(&self) -> DbBackend {
        DbBackend::Native
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

        let mut loaded = false;
        if let (Some(dimension), Ok(true)) = (
            inner.dimension,
            fs::try_exists(&self.index_file).await,
        ) {
            let raw = fs::read(&self.index_file).await?;
            if raw.len() == inner.records.len() * dimension * 4 {
                inner.rows = raw
                    .chunks_exact(4)
                    .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
                    .collect();
                inner.row_ids = inner.records.keys().cloned().collect();
                inner.row_of = inner
                    .row_ids
                    .iter()
                    .enumerate()
                    .map(|(row, id)| (id.clone(), row))
                    .collect();
                inner.dead_rows = 0;
                loaded = true;
            }
        }
        if !loaded {
            inner.rebuild_index();
        }

        inner.connected = true;
        inner.dirty = false;
        info!(
            namespace = %self.namespace,
            count = inner.records.len(),
            reloaded_index = loaded,
            "native vector adapter connected"
        );
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
        info!(namespace = %self.namespace, "native vector adapter disconnected");
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.inner.read().await.connected
    }
}

#[async_trait]
impl VectorStore for NativeVectorAdapter {
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

        let normalized = l2_normalize(vector);
        inner.tombstone(id);
        let row = inner.row_ids.len();
        inner.row_of.insert(id.to_string(), row);
        inner.row_ids.push(id.to_string());
        inner.rows.extend_from_slice(&normalized);

        inner.records.insert(
            id.to_string(),
            VectorRecord {
                id: id.to_string(),
                vector: normalized,
                metadata: metadata.unwrap_or_default(),
                text,
                created_at: Utc::now(),
            },
        );
        inner.dirty = true;
        self.maybe_rebuild(&mut inner);
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
        let Some(dimension) = inner.dimension else {
            return Ok(Vec::new());
        };
        if query.len() != dimension {
            return Err(StoreError::invalid(format!(
                "query dimension mismatch: expected {dimension}, got {}",
                query.len()
            )));
        }

        let normalized = l2_normalize(query.to_vec());
        let mut candidates: Vec<(usize, f32)> = Vec::with_capacity(inner.row_ids.len());
        for (row, id) in inner.row_ids.iter().enumerate() {
            // Skip tombstoned and superseded rows.
            if inner.row_of.get(id) != Some(&row) {
                continue;
            }
            let offset = row * dimension;
            let similarity = dot(&inner.rows[offset..offset + dimension], &normalized);
            candidates.push((row, similarity));
        }
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(limit.saturating_mul(self.k_multiplier.max(1)));

        let mut hits = Vec::new();
        for (row, relevance) in candidates {
            let id = &inner.row_ids[row];
            let Some(record) = inner.records.get(id) else {
                continue;
            };
            if filter.is_some_and(|filter| !matches_filter(&record.metadata, filter)) {
                continue;
            }
            hits.push(SearchHit {
                id: record.id.clone(),
                metadata: record.metadata.clone(),
                text: record.text.clone(),
                relevance,
            });
            if hits.len() >= limit {
                break;
            }
        }
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

        let doomed: Vec<String> = match (id, filter) {
            (Some(id), _) => inner
                .records
                .contains_key(id)
                .then(|| vec![id.to_string()])
                .unwrap_or_default(),
            (None, Some(filter)) => inner
                .records
                .values()
                .filter(|record| matches_filter(&record.metadata, filter))
                .map(|record| record.id.clone())
                .collect(),
            (None, None) => inner.records.keys().cloned().collect(),
        };

        for id in &doomed {
            inner.records.remove(id);
            inner.tombstone(id);
        }
        if !doomed.is_empty() {
            inner.dirty = true;
            if inner.records.is_empty() {
                inner.dimension = None;
                inner.rebuild_index();
            } else {
                self.maybe_rebuild(&mut inner);
            }
        }
        Ok(doomed.len())
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
