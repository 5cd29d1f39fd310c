//! Component lifecycle states and the transition table.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Discrete states a component can occupy during its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    /// State not known or not tracked yet.
    Unknown,
    /// Starting up but not ready for operations.
    Initializing,
    /// Fully operational and accepting requests.
    Ready,
    /// Running with limited functionality, typically because of sick
    /// dependencies. Consumers may still dispatch to it.
    Degraded,
    /// Failed to start or crashed. Terminal unless a new start is issued.
    Failed,
    /// Graceful shutdown in progress.
    Stopping,
    /// Temporarily unavailable during a restart.
    Restarting,
}

impl ComponentState {
    /// Returns `true` when the component can serve requests.
    #[must_use]
    pub const fn is_operational(self) -> bool {
        matches!(self, Self::Ready | Self::Degraded)
    }

    /// Checks whether the supervisor may move a component from `self` to
    /// `next`.
    ///
    /// Re-entering the current state is not a transition; callers treat it
    /// as a metadata refresh.
    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        use ComponentState::{
            Degraded, Failed, Initializing, Ready, Restarting, Stopping, Unknown,
        };
        matches!(
            (self, next),
            (Unknown, Initializing)
                | (Initializing, Ready | Degraded | Failed | Stopping)
                | (Ready, Degraded | Stopping | Failed)
                | (Degraded, Ready | Restarting | Stopping | Failed)
                | (Stopping, Restarting | Failed)
                | (Restarting, Ready | Degraded | Failed)
                | (Failed, Initializing)
        )
    }
}

impl Display for ComponentState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
            Self::Stopping => "stopping",
            Self::Restarting => "restarting",
        };
        f.write_str(name)
    }
}

/// One recorded lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// State before the transition.
    pub from: ComponentState,
    /// State after the transition.
    pub to: ComponentState,
    /// When the transition was recorded.
    pub at: DateTime<Utc>,
    /// Metadata attached to the transition (`blocked_by`,
    /// `degraded_reason`, `failure_reason`, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        use ComponentState::{Initializing, Ready, Restarting, Stopping, Unknown};
        assert!(Unknown.can_transition(Initializing));
        assert!(Initializing.can_transition(Ready));
        assert!(Ready.can_transition(Stopping));
        assert!(Stopping.can_transition(Restarting));
        assert!(Restarting.can_transition(Ready));
    }

    #[test]
    fn failure_and_recovery_transitions() {
        use ComponentState::{Degraded, Failed, Initializing, Ready};
        assert!(Initializing.can_transition(Failed));
        assert!(Initializing.can_transition(Degraded));
        assert!(Failed.can_transition(Initializing));
        assert!(Degraded.can_transition(Ready));
        assert!(Ready.can_transition(Degraded));
    }

    #[test]
    fn rejected_transitions() {
        use ComponentState::{Failed, Initializing, Ready, Unknown};
        assert!(!Unknown.can_transition(Ready));
        assert!(!Ready.can_transition(Initializing));
        assert!(!Failed.can_transition(Ready));
        assert!(!Ready.can_transition(Ready));
    }

    #[test]
    fn operational_states() {
        assert!(ComponentState::Ready.is_operational());
        assert!(ComponentState::Degraded.is_operational());
        assert!(!ComponentState::Initializing.is_operational());
    }
}
