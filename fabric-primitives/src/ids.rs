//! Identifier types for fabric participants.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

const MAX_COMPONENT_ID_LEN: usize = 64;

/// Unique identifier for a component participating in the fabric.
///
/// Component ids are short stable strings chosen by the component itself
/// (`"athena"`, `"workflow_engine"`). The registry generates one when a
/// caller registers without an id.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    /// Creates a component identifier after validating its format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidComponentId`] if the identifier is empty,
    /// too long, or contains unsupported characters.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidComponentId {
                id,
                reason: "identifier cannot be empty".into(),
            });
        }
        if id.len() > MAX_COMPONENT_ID_LEN {
            return Err(Error::InvalidComponentId {
                id,
                reason: format!("identifier length must be <= {MAX_COMPONENT_ID_LEN}"),
            });
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(Error::InvalidComponentId {
                id,
                reason: "identifier must contain ASCII alphanumeric, underscore, dash, or dot"
                    .into(),
            });
        }
        Ok(Self(id))
    }

    /// Generates a fresh identifier for anonymous registrations.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("component-{}", Uuid::new_v4()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ComponentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ComponentId> for String {
    fn from(value: ComponentId) -> Self {
        value.0
    }
}

impl FromStr for ComponentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Unique identifier minted for each issued registration token.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(Uuid);

impl TokenId {
    /// Generates a random token identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::random()
    }
}

impl Display for TokenId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_component_ids() {
        for id in ["athena", "workflow_engine", "prompt-router", "ui.server", "a2a_v2"] {
            ComponentId::new(id).expect("id should validate");
        }
    }

    #[test]
    fn rejects_bad_component_ids() {
        assert!(ComponentId::new("").is_err());
        assert!(ComponentId::new("has space").is_err());
        assert!(ComponentId::new("uni\u{e9}code").is_err());
        assert!(ComponentId::new("x".repeat(65)).is_err());
    }

    #[test]
    fn generated_ids_validate() {
        let id = ComponentId::generate();
        ComponentId::new(id.as_str()).expect("generated id should validate");
    }

    #[test]
    fn round_trip_component_id() {
        let id = ComponentId::new("athena").unwrap();
        let parsed: ComponentId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
