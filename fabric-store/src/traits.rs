//! Adapter traits for the six data models.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::filter::Filter;
use crate::{StoreResult, types::{DbBackend, DbType}};

/// Behavior common to every adapter.
///
/// A single adapter instance owns its connection; concurrent operations
/// are serialized to the backend by the adapter's internal locking.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// The data model this adapter serves.
    fn db_type(&self) -> DbType;

    /// The concrete backend behind this adapter.
    fn backend(&self) -> DbBackend;

    /// The namespace isolating this adapter's data.
    fn namespace(&self) -> &str;

    /// Opens the backend connection and loads persisted state.
    async fn connect(&self) -> StoreResult<()>;

    /// Flushes dirty state and closes the connection.
    async fn disconnect(&self) -> StoreResult<()>;

    /// Returns whether the adapter is currently connected.
    async fn is_connected(&self) -> bool;
}

/// A stored embedding with its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique identifier of the vector.
    pub id: String,
    /// The embedding, L2-normalized at insert time.
    pub vector: Vec<f32>,
    /// Attached metadata, filterable via dotted paths.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Optional source text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
}

/// One similarity search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Identifier of the matched vector.
    pub id: String,
    /// Metadata of the matched vector.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Source text of the matched vector, when stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Inner-product similarity of the normalized vectors.
    pub relevance: f32,
}

/// Embedding storage with similarity search.
#[async_trait]
pub trait VectorStore: DatabaseAdapter {
    /// Stores a vector, normalizing it on insert.
    ///
    /// The first insert into an empty store fixes the dimension; once the
    /// store is non-empty, mismatched dimensions are rejected.
    async fn store(
        &self,
        id: &str,
        vector: Vec<f32>,
        metadata: Option<Map<String, Value>>,
        text: Option<String>,
    ) -> StoreResult<()>;

    /// Searches for the `limit` most similar vectors, post-filtering by
    /// metadata.
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> StoreResult<Vec<SearchHit>>;

    /// Returns a vector by id.
    async fn get(&self, id: &str) -> StoreResult<Option<VectorRecord>>;

    /// Deletes by id, by filter, or everything when both are `None`.
    /// Returns the number of removed vectors.
    async fn delete(&self, id: Option<&str>, filter: Option<&Filter>) -> StoreResult<usize>;

    /// Lists vectors newest-first with pagination and optional filtering.
    async fn list(
        &self,
        limit: usize,
        offset: usize,
        filter: Option<&Filter>,
    ) -> StoreResult<Vec<VectorRecord>>;
}

/// A graph node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Unique node identifier.
    pub id: String,
    /// Node labels.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Node properties.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A directed, typed relationship between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphRelationship {
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Relationship type.
    pub rel_type: String,
    /// Relationship properties.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Traversal direction for relationship queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Relationships pointing at the node.
    Incoming,
    /// Relationships originating at the node.
    Outgoing,
    /// Both directions.
    Both,
}

/// Node/relationship storage for knowledge representation.
#[async_trait]
pub trait GraphStore: DatabaseAdapter {
    /// Inserts or replaces a node.
    async fn add_node(
        &self,
        id: &str,
        labels: Vec<String>,
        properties: Option<Map<String, Value>>,
    ) -> StoreResult<()>;

    /// Adds a relationship between two existing nodes.
    async fn add_relationship(
        &self,
        source: &str,
        target: &str,
        rel_type: &str,
        properties: Option<Map<String, Value>>,
    ) -> StoreResult<()>;

    /// Returns a node by id.
    async fn get_node(&self, id: &str) -> StoreResult<Option<GraphNode>>;

    /// Returns relationships touching a node, optionally filtered by type.
    async fn get_relationships(
        &self,
        id: &str,
        types: Option<&[String]>,
        direction: Direction,
    ) -> StoreResult<Vec<GraphRelationship>>;

    /// Runs a minimal `MATCH (n[:Label]) RETURN n [LIMIT k]` query with
    /// property parameters.
    async fn query(
        &self,
        query: &str,
        params: Option<&Map<String, Value>>,
    ) -> StoreResult<Vec<GraphNode>>;

    /// Removes a node and its relationships; returns whether it existed.
    async fn delete_node(&self, id: &str) -> StoreResult<bool>;

    /// Removes relationships between two nodes, optionally narrowed by
    /// type. Returns the number removed.
    async fn delete_relationship(
        &self,
        source: &str,
        target: &str,
        rel_type: Option<&str>,
    ) -> StoreResult<usize>;
}

/// Simple keyed storage with optional expiry.
#[async_trait]
pub trait KeyValueStore: DatabaseAdapter {
    /// Stores a value, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> StoreResult<()>;

    /// Returns the value for a key.
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Deletes a key; returns whether it existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Returns whether a key exists.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Stores several values at once.
    async fn set_batch(&self, entries: Vec<(String, Value)>) -> StoreResult<()>;

    /// Returns the values present among `keys`.
    async fn get_batch(&self, keys: &[String]) -> StoreResult<HashMap<String, Value>>;

    /// Deletes several keys; returns the number removed.
    async fn delete_batch(&self, keys: &[String]) -> StoreResult<usize>;

    /// Removes every key in this adapter's namespace.
    async fn clear_namespace(&self) -> StoreResult<()>;
}

/// Structured documents in named collections.
#[async_trait]
pub trait DocumentStore: DatabaseAdapter {
    /// Inserts a document, assigning an `_id` when absent. Returns the id.
    async fn insert(&self, collection: &str, document: Value) -> StoreResult<String>;

    /// Finds documents matching the filter, with optional projection and
    /// limit.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&[String]>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Value>>;

    /// Returns the first document matching the filter.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&[String]>,
    ) -> StoreResult<Option<Value>>;

    /// Merges `changes` into matching documents; inserts when nothing
    /// matches and `upsert` is set. Returns the number touched.
    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        changes: Value,
        upsert: bool,
    ) -> StoreResult<usize>;

    /// Deletes matching documents; returns the number removed.
    async fn delete(&self, collection: &str, filter: &Filter) -> StoreResult<usize>;

    /// Counts matching documents.
    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<usize>;
}

/// Short-lived keyed storage with per-entry expiry.
#[async_trait]
pub trait CacheStore: DatabaseAdapter {
    /// Stores a value that expires after `ttl`.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> StoreResult<()>;

    /// Returns the value for a key unless it has expired.
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Deletes a key; returns whether it existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Removes every cached entry.
    async fn flush(&self) -> StoreResult<()>;

    /// Extends the lifetime of an existing entry; returns whether it was
    /// present.
    async fn touch(&self, key: &str, ttl: Duration) -> StoreResult<bool>;
}

/// Column definition used by [`RelationalStore::create_table`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// SQL type (`TEXT`, `INTEGER`, ...).
    pub sql_type: String,
    /// Optional constraints (`PRIMARY KEY`, `NOT NULL`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<String>,
}

/// Result of one relational statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueryOutcome {
    /// Rows returned by a query, one map per row.
    Rows(Vec<Map<String, Value>>),
    /// Number of rows affected by a mutation.
    Affected(usize),
}

impl QueryOutcome {
    /// Returns the rows of a query outcome, or an empty slice.
    #[must_use]
    pub fn rows(&self) -> &[Map<String, Value>] {
        match self {
            Self::Rows(rows) => rows,
            Self::Affected(_) => &[],
        }
    }
}

/// Tabular storage with SQL access and transactions.
#[async_trait]
pub trait RelationalStore: DatabaseAdapter {
    /// Executes one statement with positional JSON parameters.
    async fn execute(&self, statement: &str, params: Vec<Value>) -> StoreResult<QueryOutcome>;

    /// Executes several statements in order.
    async fn execute_batch(
        &self,
        statements: Vec<(String, Vec<Value>)>,
    ) -> StoreResult<Vec<QueryOutcome>>;

    /// Opens a transaction.
    async fn begin_transaction(&self) -> StoreResult<()>;

    /// Commits the open transaction.
    async fn commit_transaction(&self) -> StoreResult<()>;

    /// Rolls back the open transaction.
    async fn rollback_transaction(&self) -> StoreResult<()>;

    /// Creates a table if it does not already exist.
    async fn create_table(&self, table: &str, columns: Vec<ColumnSpec>) -> StoreResult<()>;

    /// Drops a table if it exists.
    async fn drop_table(&self, table: &str) -> StoreResult<()>;
}
