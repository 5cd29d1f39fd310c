//! Shared error definitions for fabric primitives.

use std::fmt::{self, Display, Formatter};

use thiserror::Error;

/// Result alias used throughout the fabric primitives.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error taxonomy shared by every fabric subsystem.
///
/// Crate-local error enums expose a `kind()` accessor mapping onto these
/// values so that callers can branch on the class of failure without
/// matching on subsystem-specific variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or ill-formed input.
    InvalidArgument,
    /// Bad or expired token, signature mismatch.
    Unauthenticated,
    /// Unknown identifier.
    NotFound,
    /// Duplicate identifier on register.
    AlreadyExists,
    /// Version mismatch on update.
    Conflict,
    /// Backend unreachable; a fallback may be engaged.
    Unavailable,
    /// Start or operation timeout.
    DeadlineExceeded,
    /// Invariant breach.
    Internal,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidArgument => "invalid_argument",
            Self::Unauthenticated => "unauthenticated",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::Conflict => "conflict",
            Self::Unavailable => "unavailable",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while manipulating fabric primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// Component identifier failed validation.
    #[error("invalid component id `{id}`: {reason}")]
    InvalidComponentId {
        /// The offending identifier string.
        id: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Capability name failed validation.
    #[error("invalid capability name `{name}`: {reason}")]
    InvalidCapability {
        /// The offending capability string.
        name: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Descriptor construction failed validation.
    #[error("invalid component descriptor: {reason}")]
    InvalidDescriptor {
        /// Human-readable reason for rejection.
        reason: String,
    },
}

impl Error {
    /// Returns the taxonomy classification for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidComponentId { .. }
            | Self::InvalidCapability { .. }
            | Self::InvalidDescriptor { .. } => ErrorKind::InvalidArgument,
        }
    }
}
