//! Reserved topics and pattern matching rules.

use fabric_primitives::ComponentId;

/// Registration requests submitted over the bus.
pub const REGISTRATION_REQUEST: &str = "tekton.registration.request";
/// Published after a successful registration.
pub const REGISTRATION_COMPLETED: &str = "tekton.registration.completed";
/// Revocation requests submitted over the bus.
pub const REGISTRATION_REVOKE: &str = "tekton.registration.revoke";
/// Published after a successful unregistration.
pub const REGISTRATION_REVOKED: &str = "tekton.registration.revoked";
/// Component heartbeats.
pub const REGISTRATION_HEARTBEAT: &str = "tekton.registration.heartbeat";
/// Published when the deadlock monitor detects a dependency cycle.
pub const LIFECYCLE_DEADLOCK: &str = "lifecycle.deadlock.detected";

/// Per-component registration response topic.
#[must_use]
pub fn registration_response(component: &ComponentId) -> String {
    format!("tekton.registration.response.{component}")
}

/// Per-component lifecycle state topic.
#[must_use]
pub fn lifecycle_state(component: &ComponentId) -> String {
    format!("lifecycle.state.{component}")
}

/// Per-component status topic used by gateway surfaces.
#[must_use]
pub fn component_status(component: &ComponentId) -> String {
    format!("components/status/{component}")
}

/// Per-component event topic.
#[must_use]
pub fn component_event(component: &ComponentId, event: &str) -> String {
    format!("components/events/{component}/{event}")
}

/// Per-component command topic.
#[must_use]
pub fn component_command(component: &ComponentId, command: &str) -> String {
    format!("components/commands/{component}/{command}")
}

/// Checks a concrete topic against a subscription pattern.
///
/// A trailing `#` matches any suffix; otherwise the pattern must equal the
/// topic exactly.
#[must_use]
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('#') {
        topic.starts_with(prefix)
    } else {
        pattern == topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(topic_matches(REGISTRATION_COMPLETED, REGISTRATION_COMPLETED));
        assert!(!topic_matches(REGISTRATION_COMPLETED, REGISTRATION_REVOKED));
    }

    #[test]
    fn wildcard_suffix() {
        assert!(topic_matches("tekton.registration.#", REGISTRATION_HEARTBEAT));
        assert!(topic_matches("lifecycle.#", LIFECYCLE_DEADLOCK));
        assert!(!topic_matches("tekton.registration.#", "lifecycle.state.athena"));
    }

    #[test]
    fn bare_wildcard_matches_everything() {
        assert!(topic_matches("#", "anything.at.all"));
    }
}
