//! In-memory adjacency graph adapter with file persistence.
//!
//! Nodes and relationships are kept in memory and flushed to
//! `entities.json` / `relationships.json` on disconnect.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::filter::matches_filter;
use crate::traits::{DatabaseAdapter, Direction, GraphNode, GraphRelationship, GraphStore};
use crate::types::{DbBackend, DbType};
use crate::{StoreConfig, StoreError, StoreResult};

const NODES_FILE: &str = "entities.json";
const RELATIONSHIPS_FILE: &str = "relationships.json";

#[derive(Default)]
struct Inner {
    connected: bool,
    dirty: bool,
    nodes: HashMap<String, GraphNode>,
    relationships: Vec<GraphRelationship>,
}

/// In-memory [`GraphStore`] backed by JSON files.
pub struct MemoryGraphAdapter {
    namespace: String,
    nodes_file: PathBuf,
    relationships_file: PathBuf,
    dir: PathBuf,
    inner: RwLock<Inner>,
}

impl MemoryGraphAdapter {
    /// Creates an adapter for one namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>, config: &StoreConfig) -> Self {
        let namespace = namespace.into();
        let dir = config.namespace_path(DbType::Graph, &namespace);
        Self {
            namespace,
            nodes_file: dir.join(NODES_FILE),
            relationships_file: dir.join(RELATIONSHIPS_FILE),
            dir,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn ensure_connected(&self, inner: &Inner) -> StoreResult<()> {
        if inner.connected {
            Ok(())
        } else {
            Err(StoreError::NotConnected {
                db_type: DbType::Graph,
                namespace: self.namespace.clone(),
            })
        }
    }

    async fn save(&self, inner: &mut Inner) -> StoreResult<()> {
        fs::write(&self.nodes_file, serde_json::to_vec(&inner.nodes)?).await?;
        fs::write(
            &self.relationships_file,
            serde_json::to_vec(&inner.relationships)?,
        )
        .await?;
        inner.dirty = false;
        debug!(
            namespace = %self.namespace,
            nodes = inner.nodes.len(),
            relationships = inner.relationships.len(),
            "graph flushed"
        );
        Ok(())
    }
}

#[async_trait]
impl DatabaseAdapter for MemoryGraphAdapter {
    fn db_type(&self) -> DbType {
        DbType::Graph
    }

    fn backend(&self) -> DbBackend {
        DbBackend::Memory
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn connect(&self) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        fs::create_dir_all(&self.dir).await?;

        if fs::try_exists(&self.nodes_file).await? {
            let raw = fs::read(&self.nodes_file).await?;
            if !raw.is_empty() {
                inner.nodes = serde_json::from_slice(&raw)?;
            }
        }
        if fs::try_exists(&self.relationships_file).await? {
            let raw = fs::read(&self.relationships_file).await?;
            if !raw.is_empty() {
                inner.relationships = serde_json::from_slice(&raw)?;
            }
        }
        inner.connected = true;
        inner.dirty = false;
        info!(namespace = %self.namespace, nodes = inner.nodes.len(), "graph adapter connected");
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
        info!(namespace = %self.namespace, "graph adapter disconnected");
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.inner.read().await.connected
    }
}

#[async_trait]
impl GraphStore for MemoryGraphAdapter {
    async fn add_node(
        &self,
        id: &str,
        labels: Vec<String>,
        properties: Option<Map<String, Value>>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;
        inner.nodes.insert(
            id.to_string(),
            GraphNode {
                id: id.to_string(),
                labels,
                properties: properties.unwrap_or_default(),
            },
        );
        inner.dirty = true;
        Ok(())
    }

    async fn add_relationship(
        &self,
        source: &str,
        target: &str,
        rel_type: &str,
        properties: Option<Map<String, Value>>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;
        if !inner.nodes.contains_key(source) {
            return Err(StoreError::NotFound {
                entity: format!("node `{source}`"),
            });
        }
        if !inner.nodes.contains_key(target) {
            return Err(StoreError::NotFound {
                entity: format!("node `{target}`"),
            });
        }
        inner.relationships.push(GraphRelationship {
            source: source.to_string(),
            target: target.to_string(),
            rel_type: rel_type.to_string(),
            properties: properties.unwrap_or_default(),
        });
        inner.dirty = true;
        Ok(())
    }

    async fn get_node(&self, id: &str) -> StoreResult<Option<GraphNode>> {
        let inner = self.inner.read().await;
        self.ensure_connected(&inner)?;
        Ok(inner.nodes.get(id).cloned())
    }

    async fn get_relationships(
        &self,
        id: &str,
        types: Option<&[String]>,
        direction: Direction,
    ) -> StoreResult<Vec<GraphRelationship>> {
        let inner = self.inner.read().await;
        self.ensure_connected(&inner)?;

        let matched = inner
            .relationships
            .iter()
            .filter(|rel| match direction {
                Direction::Outgoing => rel.source == id,
                Direction::Incoming => rel.target == id,
                Direction::Both => rel.source == id || rel.target == id,
            })
            .filter(|rel| {
                types.is_none_or(|types| types.iter().any(|t| t == &rel.rel_type))
            })
            .cloned()
            .collect();
        Ok(matched)
    }

    async fn query(
        &self,
        query: &str,
        params: Option<&Map<String, Value>>,
    ) -> StoreResult<Vec<GraphNode>> {
        let inner = self.inner.read().await;
        self.ensure_connected(&inner)?;

        let (label, limit) = parse_match_query(query)?;
        let mut matched: Vec<GraphNode> = inner
            .nodes
            .values()
            .filter(|node| {
                label
                    .as_ref()
                    .is_none_or(|label| node.labels.iter().any(|l| l == label))
            })
            .filter(|node| {
                params.is_none_or(|params| matches_filter(&node.properties, params))
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(limit) = limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn delete_node(&self, id: &str) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;
        let existed = inner.nodes.remove(id).is_some();
        if existed {
            inner
                .relationships
                .retain(|rel| rel.source != id && rel.target != id);
            inner.dirty = true;
        }
        Ok(existed)
    }

    async fn delete_relationship(
        &self,
        source: &str,
        target: &str,
        rel_type: Option<&str>,
    ) -> StoreResult<usize> {
        let mut inner = self.inner.write().await;
        self.ensure_connected(&inner)?;
        let before = inner.relationships.len();
        inner.relationships.retain(|rel| {
            !(rel.source == source
                && rel.target == target
                && rel_type.is_none_or(|t| t == rel.rel_type))
        });
        let removed = before - inner.relationships.len();
        if removed > 0 {
            inner.dirty = true;
        }
        Ok(removed)
    }
}

/// Parses the supported `MATCH (n[:Label]) [RETURN n] [LIMIT k]` form.
fn parse_match_query(query: &str) -> StoreResult<(Option<String>, Option<usize>)> {
    let trimmed = query.trim();
    let upper = trimmed.to_ascii_uppercase();
    if !upper.starts_with("MATCH") {
        return Err(StoreError::invalid(
            "only MATCH (n[:Label]) queries are supported",
        ));
    }

    let open = trimmed.find('(').ok_or_else(|| {
        StoreError::invalid("MATCH query is missing a node pattern")
    })?;
    let close = trimmed[open..]
        .find(')')
        .map(|offset| open + offset)
        .ok_or_else(|| StoreError::invalid("unterminated node pattern"))?;
    let pattern = &trimmed[open + 1..close];
    let label = pattern
        .split_once(':')
        .map(|(_, label)| label.trim().to_string())
        .filter(|label| !label.is_empty());

    let limit = match upper.rfind("LIMIT") {
        Some(position) => {
            let digits = trimmed[position + "LIMIT".len()..].trim();
            Some(digits.parse::<usize>().map_err(|_| {
                StoreError::invalid(format!("invalid LIMIT operand `{digits}`"))
            })?)
        }
        None => None,
    };

    Ok((label, limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn adapter(dir: &TempDir) -> MemoryGraphAdapter {
        let adapter = MemoryGraphAdapter::new("unit", &StoreConfig::new(dir.path()));
        adapter.connect().await.unwrap();
        adapter
    }

    fn props(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn nodes_and_relationships_round_trip() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir).await;

        adapter
            .add_node("athena", vec!["Component".into()], Some(props(json!({"port": 8010}))))
            .await
            .unwrap();
        adapter
            .add_node("engram", vec!["Component".into()], None)
            .await
            .unwrap();
        adapter
            .add_relationship("athena", "engram", "DEPENDS_ON", None)
            .await
            .unwrap();

        let out = adapter
            .get_relationships("athena", None, Direction::Outgoing)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].target, "engram");

        let incoming = adapter
            .get_relationships("engram", None, Direction::Incoming)
            .await
            .unwrap();
        assert_eq!(incoming.len(), 1);

        let typed = adapter
            .get_relationships("athena", Some(&["OTHER".to_string()]), Direction::Both)
            .await
            .unwrap();
        assert!(typed.is_empty());
    }

    #[tokio::test]
    async fn relationship_requires_both_endpoints() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir).await;
        adapter.add_node("a", vec![], None).await.unwrap();

        let err = adapter
            .add_relationship("a", "ghost", "LINKS", None)
            .await
            .expect_err("missing endpoint must fail");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn match_query_filters_by_label_and_params() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir).await;
        adapter
            .add_node("a", vec!["Service".into()], Some(props(json!({"tier": 1}))))
            .await
            .unwrap();
        adapter
            .add_node("b", vec!["Service".into()], Some(props(json!({"tier": 2}))))
            .await
            .unwrap();
        adapter.add_node("c", vec!["Store".into()], None).await.unwrap();

        let all = adapter.query("MATCH (n) RETURN n", None).await.unwrap();
        assert_eq!(all.len(), 3);

        let services = adapter
            .query("MATCH (n:Service) RETURN n", None)
            .await
            .unwrap();
        assert_eq!(services.len(), 2);

        let tier_one = adapter
            .query(
                "MATCH (n:Service) RETURN n",
                Some(&props(json!({"tier": 1}))),
            )
            .await
            .unwrap();
        assert_eq!(tier_one.len(), 1);
        assert_eq!(tier_one[0].id, "a");

        let limited = adapter
            .query("MATCH (n) RETURN n LIMIT 2", None)
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);

        assert!(adapter.query("CREATE (n)", None).await.is_err());
    }

    #[tokio::test]
    async fn delete_node_cascades_relationships() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir).await;
        adapter.add_node("a", vec![], None).await.unwrap();
        adapter.add_node("b", vec![], None).await.unwrap();
        adapter
            .add_relationship("a", "b", "LINKS", None)
            .await
            .unwrap();

        assert!(adapter.delete_node("a").await.unwrap());
        assert!(
            adapter
                .get_relationships("b", None, Direction::Both)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(!adapter.delete_node("a").await.unwrap());
    }

    #[tokio::test]
    async fn persists_across_reconnect() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path());
        {
            let adapter = MemoryGraphAdapter::new("persist", &config);
            adapter.connect().await.unwrap();
            adapter.add_node("a", vec!["Keep".into()], None).await.unwrap();
            adapter.add_node("b", vec![], None).await.unwrap();
            adapter
                .add_relationship("a", "b", "LINKS", None)
                .await
                .unwrap();
            adapter.disconnect().await.unwrap();
        }

        let adapter = MemoryGraphAdapter::new("persist", &config);
        adapter.connect().await.unwrap();
        assert!(adapter.get_node("a").await.unwrap().is_some());
        assert_eq!(
            adapter
                .get_relationships("a", None, Direction::Outgoing)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
