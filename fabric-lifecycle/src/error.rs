//! Error types for lifecycle supervision.

use fabric_primitives::{ComponentId, ErrorKind};
use thiserror::Error;

use crate::state::ComponentState;

/// Result alias used for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Errors emitted by the lifecycle subsystem.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Monitor or supervisor configuration was invalid.
    #[error("invalid lifecycle configuration: {0}")]
    InvalidConfig(&'static str),

    /// Transition was not permitted from the current state.
    #[error("invalid transition {from:?} -> {to:?} for component {component}")]
    InvalidTransition {
        /// Component whose transition failed.
        component: ComponentId,
        /// State prior to the attempted transition.
        from: ComponentState,
        /// Requested target state.
        to: ComponentState,
    },

    /// The component is not known to the supervisor.
    #[error("component `{component}` is not registered with the supervisor")]
    UnknownComponent {
        /// The missing component id.
        component: ComponentId,
    },
}

impl LifecycleError {
    /// Returns the taxonomy classification for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) => ErrorKind::InvalidArgument,
            Self::InvalidTransition { .. } => ErrorKind::Conflict,
            Self::UnknownComponent { .. } => ErrorKind::NotFound,
        }
    }
}
