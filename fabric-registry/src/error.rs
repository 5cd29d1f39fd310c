//! Error types for registry and registration operations.

use fabric_primitives::{ComponentId, ErrorKind};
use thiserror::Error;

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors surfaced by the directory and the registration manager.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Registration configuration was invalid.
    #[error("invalid registration configuration: {0}")]
    InvalidConfig(&'static str),

    /// Descriptor or request input failed validation.
    #[error(transparent)]
    InvalidInput(#[from] fabric_primitives::Error),

    /// A live registration already exists for the component id.
    #[error("component `{id}` is already registered")]
    AlreadyExists {
        /// The contested component id.
        id: ComponentId,
    },

    /// No registration exists for the component id.
    #[error("component `{id}` is not registered")]
    NotFound {
        /// The missing component id.
        id: ComponentId,
    },

    /// Token failed signature, expiry, binding, or liveness checks.
    #[error("authentication failed: {reason}")]
    Unauthenticated {
        /// Why the token was rejected.
        reason: String,
    },

    /// The directory refused the operation.
    #[error("registry unavailable: {reason}")]
    Unavailable {
        /// Human-readable context.
        reason: String,
    },

    /// Token or payload serialization failure.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: serde_json::Error,
    },

    /// Remote transport failure reported by a registration client.
    #[error("registration transport error: {reason}")]
    Transport {
        /// Human-readable context provided by the transport.
        reason: String,
    },
}

impl RegistryError {
    /// Convenience constructor for authentication failures.
    #[must_use]
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for transport failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Returns the taxonomy classification for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) | Self::InvalidInput(_) => ErrorKind::InvalidArgument,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            Self::Unavailable { .. } | Self::Transport { .. } => ErrorKind::Unavailable,
            Self::Serialization { .. } => ErrorKind::Internal,
        }
    }
}
