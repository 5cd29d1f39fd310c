//! Error types for the database facade.

use fabric_primitives::ErrorKind;
use thiserror::Error;

use crate::types::{DbBackend, DbType};

/// Result alias for facade operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by adapters, the factory, and the manager.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Operation attempted on a disconnected adapter.
    #[error("{db_type} adapter for namespace `{namespace}` is not connected")]
    NotConnected {
        /// Data model of the adapter.
        db_type: DbType,
        /// Namespace of the adapter.
        namespace: String,
    },

    /// Missing or ill-formed input (bad filter, dimension mismatch, ...).
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Why the input was rejected.
        reason: String,
    },

    /// Unknown record, document, node, or table.
    #[error("not found: {entity}")]
    NotFound {
        /// Identifier of the missing entity.
        entity: String,
    },

    /// Concurrent update conflict.
    #[error("conflict: {reason}")]
    Conflict {
        /// Why the update was rejected.
        reason: String,
    },

    /// Backend unreachable; the manager may engage a fallback.
    #[error("{backend} backend unavailable: {reason}")]
    Unavailable {
        /// The unreachable backend.
        backend: DbBackend,
        /// Human-readable context.
        reason: String,
    },

    /// Backend does not serve the requested data model.
    #[error("backend {backend} does not support {db_type} databases")]
    UnsupportedBackend {
        /// Requested data model.
        db_type: DbType,
        /// Offending backend.
        backend: DbBackend,
    },

    /// Filesystem failure in a file-based adapter.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: serde_json::Error,
    },

    /// Backend reported an application-level error.
    #[error("backend error: {reason}")]
    Backend {
        /// Human-readable context from the backend.
        reason: String,
    },
}

impl StoreError {
    /// Convenience constructor for invalid arguments.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for backend errors.
    #[must_use]
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for unavailable backends.
    #[must_use]
    pub fn unavailable(backend: DbBackend, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            backend,
            reason: reason.into(),
        }
    }

    /// Returns the taxonomy classification for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } | Self::UnsupportedBackend { .. } => {
                ErrorKind::InvalidArgument
            }
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotConnected { .. } | Self::Unavailable { .. } => ErrorKind::Unavailable,
            Self::Io { .. } | Self::Serialization { .. } | Self::Backend { .. } => {
                ErrorKind::Internal
            }
        }
    }
}
