//! Capability naming and indexed lookup shared across the fabric.
//!
//! Components advertise capabilities either as a flat list of names or as a
//! structured map grouping them by category and domain. Both shapes are
//! recognized uniformly; the canonical query form is the dotted string
//! `category.domain.capability`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const MAX_NAME_LEN: usize = 128;

/// Validated capability name.
///
/// Accepts either a bare name (`"plan"`) or a canonical dotted path
/// (`"knowledge.graph.query"`).
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityName(String);

impl CapabilityName {
    /// Creates a capability name after validating its format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapability`] if the name is empty, too long,
    /// contains unsupported characters, or has empty dotted segments.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidCapability {
                name,
                reason: "name cannot be empty".into(),
            });
        }
        if name.len() > MAX_NAME_LEN {
            return Err(Error::InvalidCapability {
                name,
                reason: format!("name length must be <= {MAX_NAME_LEN}"),
            });
        }
        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-' | '_' | '.'))
        {
            return Err(Error::InvalidCapability {
                name,
                reason: "name must contain lowercase alphanumeric, dash, underscore, or dot"
                    .into(),
            });
        }
        if name.split('.').any(str::is_empty) {
            return Err(Error::InvalidCapability {
                name,
                reason: "dotted segments must not be empty".into(),
            });
        }
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the final dotted segment (the bare capability).
    #[must_use]
    pub fn leaf(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

impl From<CapabilityName> for String {
    fn from(value: CapabilityName) -> Self {
        value.0
    }
}

/// Wire shape of an advertised capability set.
///
/// Deserializes from either a flat list or a category/domain map, which is
/// how components declare capabilities in manifests and registration
/// payloads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapabilitySpec {
    /// A flat list of capability names.
    Flat(Vec<String>),
    /// Capabilities grouped by category.
    Structured(BTreeMap<String, DomainSpec>),
}

impl Default for CapabilitySpec {
    fn default() -> Self {
        Self::Flat(Vec::new())
    }
}

/// One category entry of a structured capability spec.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DomainSpec {
    /// Capabilities listed directly under the category.
    Caps(Vec<String>),
    /// Capabilities nested one level deeper by domain.
    Nested(BTreeMap<String, Vec<String>>),
}

#[derive(Clone, Debug, Default, PartialEq)]
struct TrieNode {
    children: BTreeMap<String, TrieNode>,
    terminal: bool,
}

impl TrieNode {
    fn insert(&mut self, segments: &[&str]) {
        match segments.split_first() {
            None => self.terminal = true,
            Some((head, rest)) => {
                self.children.entry((*head).to_string()).or_default().insert(rest);
            }
        }
    }

    fn contains_path(&self, segments: &[&str]) -> bool {
        match segments.split_first() {
            None => self.terminal,
            Some((head, rest)) => self
                .children
                .get(*head)
                .is_some_and(|child| child.contains_path(rest)),
        }
    }
}

/// Indexed capability lookup combining a flat set and a segment trie.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CapabilitySet {
    spec: CapabilitySpec,
    flat: BTreeSet<String>,
    canonical: BTreeSet<String>,
    leaves: BTreeSet<String>,
    trie: TrieNode,
}

impl CapabilitySet {
    /// Builds an indexed set from a wire spec.
    #[must_use]
    pub fn from_spec(spec: CapabilitySpec) -> Self {
        let mut set = Self {
            spec: spec.clone(),
            ..Self::default()
        };
        match spec {
            CapabilitySpec::Flat(names) => {
                for name in names {
                    set.index_path(&name);
                    set.flat.insert(name);
                }
            }
            CapabilitySpec::Structured(categories) => {
                for (category, domain) in categories {
                    match domain {
                        DomainSpec::Caps(names) => {
                            for name in names {
                                set.index_path(&format!("{category}.{name}"));
                            }
                        }
                        DomainSpec::Nested(domains) => {
                            for (domain, names) in domains {
                                for name in names {
                                    set.index_path(&format!("{category}.{domain}.{name}"));
                                }
                            }
                        }
                    }
                }
            }
        }
        set
    }

    /// Builds a set from a flat list of names.
    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_spec(CapabilitySpec::Flat(
            names.into_iter().map(Into::into).collect(),
        ))
    }

    /// Returns the wire spec this set was built from.
    #[must_use]
    pub fn spec(&self) -> &CapabilitySpec {
        &self.spec
    }

    /// Returns `true` when no capabilities are advertised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flat.is_empty() && self.leaves.is_empty()
    }

    /// Checks whether the set advertises the given capability.
    ///
    /// A dotted query matches the canonical path through the trie; a bare
    /// query matches the flat list or any structured leaf.
    #[must_use]
    pub fn contains(&self, capability: &str) -> bool {
        if self.flat.contains(capability) {
            return true;
        }
        if capability.contains('.') {
            let segments: Vec<&str> = capability.split('.').collect();
            self.trie.contains_path(&segments)
        } else {
            self.leaves.contains(capability)
        }
    }

    /// Iterates over every advertised capability path, canonical form first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.canonical.iter().map(String::as_str)
    }

    fn index_path(&mut self, path: &str) {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return;
        }
        self.trie.insert(&segments);
        self.canonical.insert(segments.join("."));
        if let Some(leaf) = segments.last() {
            self.leaves.insert((*leaf).to_string());
        }
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.spec.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let spec = CapabilitySpec::deserialize(deserializer)?;
        Ok(Self::from_spec(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_lookup() {
        let set = CapabilitySet::from_names(["plan", "execute"]);
        assert!(set.contains("plan"));
        assert!(!set.contains("reason"));
    }

    #[test]
    fn structured_lookup_by_leaf_and_path() {
        let mut domains = BTreeMap::new();
        domains.insert("graph".to_string(), vec!["query".to_string()]);
        let mut categories = BTreeMap::new();
        categories.insert("knowledge".to_string(), DomainSpec::Nested(domains));
        let set = CapabilitySet::from_spec(CapabilitySpec::Structured(categories));

        assert!(set.contains("query"));
        assert!(set.contains("knowledge.graph.query"));
        assert!(!set.contains("knowledge.graph.mutate"));
        assert!(!set.contains("knowledge.query"));
    }

    #[test]
    fn two_level_structured_lookup() {
        let mut categories = BTreeMap::new();
        categories.insert(
            "communication".to_string(),
            DomainSpec::Caps(vec!["messaging".to_string()]),
        );
        let set = CapabilitySet::from_spec(CapabilitySpec::Structured(categories));

        assert!(set.contains("messaging"));
        assert!(set.contains("communication.messaging"));
    }

    #[test]
    fn spec_round_trips_through_serde() {
        let set = CapabilitySet::from_names(["plan"]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["plan"]"#);
        let decoded: CapabilitySet = serde_json::from_str(&json).unwrap();
        assert!(decoded.contains("plan"));
    }

    #[test]
    fn structured_spec_deserializes() {
        let decoded: CapabilitySet =
            serde_json::from_str(r#"{"knowledge":{"graph":["query","mutate"]}}"#).unwrap();
        assert!(decoded.contains("knowledge.graph.mutate"));
    }

    #[test]
    fn capability_name_validation() {
        CapabilityName::new("knowledge.graph.query").expect("valid name");
        assert!(CapabilityName::new("").is_err());
        assert!(CapabilityName::new("Upper.Case").is_err());
        assert!(CapabilityName::new("a..b").is_err());
    }

    #[test]
    fn leaf_of_dotted_name() {
        let name = CapabilityName::new("knowledge.graph.query").unwrap();
        assert_eq!(name.leaf(), "query");
        let bare = CapabilityName::new("plan").unwrap();
        assert_eq!(bare.leaf(), "plan");
    }
}
