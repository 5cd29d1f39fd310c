//! Database type and backend tags.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Data models supported by the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbType {
    /// Embeddings and similarity search.
    Vector,
    /// Knowledge representation as nodes and relationships.
    Graph,
    /// Simple keyed data.
    KeyValue,
    /// Structured documents in named collections.
    Document,
    /// Short-lived in-memory data.
    Cache,
    /// Tabular data with SQL access.
    Relation,
}

impl DbType {
    /// Returns the canonical lowercase name used in paths and configs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Graph => "graph",
            Self::KeyValue => "key_value",
            Self::Document => "document",
            Self::Cache => "cache",
            Self::Relation => "relation",
        }
    }
}

impl Display for DbType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vector" => Ok(Self::Vector),
            "graph" => Ok(Self::Graph),
            "key_value" | "keyvalue" | "kv" => Ok(Self::KeyValue),
            "document" => Ok(Self::Document),
            "cache" => Ok(Self::Cache),
            "relation" | "relational" => Ok(Self::Relation),
            other => Err(StoreError::InvalidArgument {
                reason: format!("unknown database type `{other}`"),
            }),
        }
    }
}

/// Concrete storage engines behind the adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbBackend {
    /// In-process index with a packed candidate matrix (vector).
    Native,
    /// Flat-file JSON persistence; the universal fallback.
    File,
    /// Purely in-memory storage (graph adjacency, cache).
    Memory,
    /// Networked Redis daemon (key-value).
    Redis,
    /// Embedded SQLite database (relational).
    Sqlite,
}

impl DbBackend {
    /// Returns the canonical lowercase name used in pool keys and configs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::File => "file",
            Self::Memory => "memory",
            Self::Redis => "redis",
            Self::Sqlite => "sqlite",
        }
    }

    /// Lists the backends available for a data model, preferred first.
    #[must_use]
    pub fn for_type(db_type: DbType) -> &'static [Self] {
        match db_type {
            DbType::Vector => &[Self::Native, Self::File],
            DbType::Graph => &[Self::Memory],
            DbType::KeyValue => &[Self::Redis, Self::File],
            DbType::Document => &[Self::File],
            DbType::Cache => &[Self::Memory],
            DbType::Relation => &[Self::Sqlite],
        }
    }

    /// Returns whether this backend serves the given data model.
    #[must_use]
    pub fn supports(self, db_type: DbType) -> bool {
        Self::for_type(db_type).contains(&self)
    }
}

impl Display for DbBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbBackend {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(StoreError::InvalidArgument {
                reason: format!("unknown database backend `{other}`"),
            }),
        }
    }
}
