//! Flat-file document adapter with named collections.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::filter::{Filter, matches_filter};
use crate::traits::{DatabaseAdapter, DocumentStore};
use crate::types::{DbBackend, DbType};
use crate::{StoreConfig, StoreError, StoreResult};

const DATA_FILE: &str = "documents.json";
const ID_FIELD: &str = "_id";

type Collections = HashMap<String, Vec<Map<String, Value>>>;

#[derive(Default)]
struct Inner {
    connected: bool,
    dirty: bool,
    collections: Collections,
}

/// File-backed [`DocumentStore`].
pub struct FileDocumentAdapter {
    namespace: String,
    data_file: PathBuf,
    dir: PathBuf,
    inner: RwLock<Inner>,
}

impl FileDocumentAdapter {
    /// Creates an adapter for one namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>, config: &StoreConfig) -> Self {
        let namespace = namespace.into();
        let dir = config.namespace_path(DbType::Document, &namespace);
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
                db_type: DbType::Document,
                namespace: self.namespace.clone(),
            })
        }
    }

    async fn save(&self, inner: &mut Inner) -> StoreResult<()> {
        fs::write(&self.data_file, serde_json::to_vec(&inner.collections)?).await?;
        inner.dirty = false;
        debug!(namespace = %self.namespace, collections = inner.collections.len(), "documents flushed");
        Ok(())
    }
}

fn project(document: &Map<String, Value>, projection: Option<&[String]>) -> Value {
    match projection {
        None => Value::Object(document.clone()),
        Some(fields) => {
            let mut out = Map::new();
            // The id always rides along, matching document-store convention.
            if let Some(id) = document.get(ID_FIELD) {
                out.insert(ID_FIELD.to_string(), id.clone());
            }
            for field in fields {
                if let Some(value) = document.get(field) {
                    out.insert(field.clone(), value.clone());
                }
            }
            Value::Object(out)
        }
    }
}

fn as_object(document: Value) -> StoreResult<Map<String, Value>> {
    match document {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::invalid(format!(
            "documents must be JSON objects, got {other}"
        ))),
    }
}

#[async_trait]
impl DatabaseAdapter for FileDocumentAdapter {
    fn db_type(&self) -> DbType {
        DbType::Document
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
                inner.collections = serde_json::from_slice(&raw)?;
            }
        }
        inner.connected = true;
        inner.dirty = false;
        info!(namespace = %self.namespace, collections = inner.collections.len(), "document adapter connected");
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
        info!(namespace = %self.namespace, "document adapter disconnected");
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.inner.read().await.connected
    }
}

#[async_trait]
impl DocumentStore for FileDocumentAdapter {
    async fn insert(&self, collection: &str, document: Value) -> StoreResult<String> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;

        let mut document = as_object(document)?;
        let id = match document.get(ID_FIELD).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                document.insert(ID_FIELD.to_string(), Value::from(id.clone()));
                id
            }
        };
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
        inner.dirty = true;
        Ok(id)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&[String]>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Value>> {
        let inner = self.inner.read().await;
        self.ensure_connected(&inner)?;

        let documents = inner
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| matches_filter(doc, filter))
                    .take(limit.unwrap_or(usize::MAX))
                    .map(|doc| project(doc, projection))
                    .collect()
            })
            .unwrap_or_default();
        Ok(documents)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&[String]>,
    ) -> StoreResult<Option<Value>> {
        Ok(self
            .find(collection, filter, projection, Some(1))
            .await?
            .into_iter()
            .next())
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        changes: Value,
        upsert: bool,
    ) -> StoreResult<usize> {
        let changes = as_object(changes)?;
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;

        let documents = inner.collections.entry(collection.to_string()).or_default();
        let mut touched = 0;
        for document in documents.iter_mut() {
            if matches_filter(document, filter) {
                for (key, value) in &changes {
                    if key != ID_FIELD {
                        document.insert(key.clone(), value.clone());
                    }
                }
                touched += 1;
            }
        }

        if touched == 0 && upsert {
            // Seed the new document from the filter's scalar equality pairs.
            let mut document = Map::new();
            for (key, value) in filter {
                if !key.contains('.') && !value.is_object() && !value.is_array() {
                    document.insert(key.clone(), value.clone());
                }
            }
            for (key, value) in changes {
                document.insert(key, value);
            }
            document
                .entry(ID_FIELD.to_string())
                .or_insert_with(|| Value::from(Uuid::new_v4().to_string()));
            documents.push(document);
            touched = 1;
        }

        if touched > 0 {
            inner.dirty = true;
        }
        Ok(touched)
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> StoreResult<usize> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;

        let Some(documents) = inner.collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = documents.len();
        documents.retain(|doc| !matches_filter(doc, filter));
        let removed = before - documents.len();
        if removed > 0 {
            inner.dirty = true;
        }
        Ok(removed)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<usize> {
        let inner = self.inner.read().await;
        self.ensure_connected(&inner)?;
        Ok(inner
            .collections
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| matches_filter(doc, filter)).count())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn adapter(dir: &TempDir) -> FileDocumentAdapter {
        let adapter = FileDocumentAdapter::new("unit", &StoreConfig::new(dir.path()));
        adapter.connect().await.unwrap();
        adapter
    }

    fn filter(value: Value) -> Filter {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn insert_find_update_delete_cycle() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir).await;

        adapter
            .insert("tasks", json!({"name": "plan", "state": "open"}))
            .await
            .unwrap();

        let found = adapter
            .find_one("tasks", &filter(json!({"name": "plan"})), None)
            .await
            .unwrap();
        assert!(found.is_some());

        let touched = adapter
            .update(
                "tasks",
                &filter(json!({"name": "plan"})),
                json!({"state": "done"}),
                false,
            )
            .await
            .unwrap();
        assert_eq!(touched, 1);

        let updated = adapter
            .find_one("tasks", &filter(json!({"name": "plan"})), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["state"], "done");

        let removed = adapter
            .delete("tasks", &filter(json!({"name": "plan"})))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(
            adapter
                .find_one("tasks", &filter(json!({"name": "plan"})), None)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn projection_keeps_requested_fields_and_id() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir).await;
        adapter
            .insert("docs", json!({"a": 1, "b": 2, "c": 3}))
            .await
            .unwrap();

        let fields = vec!["a".to_string()];
        let found = adapter
            .find_one("docs", &filter(json!({"a": 1})), Some(&fields))
            .await
            .unwrap()
            .unwrap();
        let object = found.as_object().unwrap();
        assert!(object.contains_key("_id"));
        assert!(object.contains_key("a"));
        assert!(!object.contains_key("b"));
    }

    #[tokio::test]
    async fn upsert_creates_when_missing() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir).await;

        let touched = adapter
            .update(
                "docs",
                &filter(json!({"slug": "fresh"})),
                json!({"count": 1}),
                true,
            )
            .await
            .unwrap();
        assert_eq!(touched, 1);

        let created = adapter
            .find_one("docs", &filter(json!({"slug": "fresh"})), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created["count"], 1);
    }

    #[tokio::test]
    async fn dotted_metadata_survives_reconnect() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path());
        {
            let adapter = FileDocumentAdapter::new("persist", &config);
            adapter.connect().await.unwrap();
            adapter
                .insert("docs", json!({"meta": {"owner": {"name": "athena"}}}))
                .await
                .unwrap();
            adapter.disconnect().await.unwrap();
        }

        let adapter = FileDocumentAdapter::new("persist", &config);
        adapter.connect().await.unwrap();
        let found = adapter
            .find_one("docs", &filter(json!({"meta.owner.name": "athena"})), None)
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn count_and_operator_filters() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir).await;
        for score in [3, 7, 9] {
            adapter
                .insert("scores", json!({"score": score}))
                .await
                .unwrap();
        }

        assert_eq!(
            adapter
                .count("scores", &filter(json!({"score": {"gte": 7}})))
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            adapter
                .count("scores", &filter(json!({"score": {"nin": [3]}})))
                .await
                .unwrap(),
            2
        );
    }
}
