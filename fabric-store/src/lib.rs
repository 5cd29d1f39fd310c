//! Typed, namespaced database facade for the Tekton service fabric.
//!
//! Six data models (vector, graph, key-value, document, cache, relational)
//! are exposed behind adapter traits. The [`DatabaseManager`] pools one
//! adapter per `(type, namespace, backend)` key, picks a backend for the
//! host when the caller does not name one, and degrades to the file-based
//! fallback of the same type when the preferred backend is unreachable.

#![warn(missing_docs, clippy::pedantic)]

pub mod adapters;
mod client;
mod config;
mod error;
mod factory;
mod filter;
mod hardware;
mod manager;
mod traits;
mod types;

pub use client::ComponentStoreClient;
pub use config::{CacheConfig, StoreConfig, VectorConfig};
pub use error::{StoreError, StoreResult};
pub use factory::AdapterFactory;
pub use filter::{Filter, matches_filter};
pub use hardware::HostProfile;
pub use manager::DatabaseManager;
pub use traits::{
    CacheStore, ColumnSpec, DatabaseAdapter, Direction, DocumentStore, GraphNode,
    GraphRelationship, GraphStore, KeyValueStore, QueryOutcome, RelationalStore, SearchHit,
    VectorRecord, VectorStore,
};
pub use types::{DbBackend, DbType};
