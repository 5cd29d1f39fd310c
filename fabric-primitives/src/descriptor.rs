//! Component descriptors advertised to the fabric directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{CapabilitySet, ComponentId, Error, Result};

/// Reachability status of a registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    /// Responding to heartbeats and accepting work.
    Available,
    /// Alive but at or near capacity.
    Busy,
    /// Not heard from within the liveness window.
    Offline,
}

/// Coarse latency expectation advertised by a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseTime {
    /// Sub-second responses.
    Fast,
    /// Seconds-scale responses.
    Medium,
    /// Long-running operations.
    Slow,
}

/// Availability summary kept up to date by heartbeats and liveness sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Availability {
    /// Current reachability status.
    pub status: AvailabilityStatus,
    /// Remaining capacity in `[0.0, 1.0]`.
    pub capacity: f64,
    /// Advertised response latency class.
    pub response_time: ResponseTime,
}

impl Default for Availability {
    fn default() -> Self {
        Self {
            status: AvailabilityStatus::Available,
            capacity: 1.0,
            response_time: ResponseTime::Medium,
        }
    }
}

/// Directory entry describing a registered component.
///
/// This is the single descriptor shape used across the fabric; agent cards
/// from the A2A surface carry the same fields (`description` and
/// `limitations` included).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    id: ComponentId,
    name: String,
    version: String,
    component_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    #[serde(default)]
    capabilities: CapabilitySet,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    limitations: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
    #[serde(default)]
    availability: Availability,
    registered_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl ComponentDescriptor {
    /// Starts building a descriptor for the given component id.
    #[must_use]
    pub fn builder(id: ComponentId) -> ComponentDescriptorBuilder {
        ComponentDescriptorBuilder {
            id,
            name: None,
            version: None,
            component_type: None,
            description: None,
            endpoint: None,
            capabilities: CapabilitySet::default(),
            limitations: Map::new(),
            metadata: Map::new(),
            availability: Availability::default(),
        }
    }

    /// Returns the component identifier.
    #[must_use]
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    /// Returns the human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the component version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the component type (`"engram"`, `"ergon"`, ...).
    #[must_use]
    pub fn component_type(&self) -> &str {
        &self.component_type
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the endpoint, when one is advertised.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Returns the advertised capability set.
    #[must_use]
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Returns advertised limitations.
    #[must_use]
    pub fn limitations(&self) -> &Map<String, Value> {
        &self.limitations
    }

    /// Returns additional metadata.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Returns the availability summary.
    #[must_use]
    pub fn availability(&self) -> Availability {
        self.availability
    }

    /// Returns the registration timestamp.
    #[must_use]
    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Returns the last time the component was heard from.
    #[must_use]
    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    /// Checks whether the component advertises the given capability.
    #[must_use]
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Records a liveness signal.
    ///
    /// Touches `last_seen` and, when the component had been marked offline,
    /// flips it back to available.
    pub fn touch_seen(&mut self, now: DateTime<Utc>) {
        self.last_seen = now;
        if self.availability.status == AvailabilityStatus::Offline {
            self.availability.status = AvailabilityStatus::Available;
        }
    }

    /// Replaces the availability summary.
    pub fn set_availability(&mut self, availability: Availability) {
        self.availability = availability;
    }

    /// Marks the component offline. Used by the liveness sweep.
    pub fn mark_offline(&mut self) {
        self.availability.status = AvailabilityStatus::Offline;
    }
}

/// Builder for [`ComponentDescriptor`].
#[derive(Debug)]
pub struct ComponentDescriptorBuilder {
    id: ComponentId,
    name: Option<String>,
    version: Option<String>,
    component_type: Option<String>,
    description: Option<String>,
    endpoint: Option<String>,
    capabilities: CapabilitySet,
    limitations: Map<String, Value>,
    metadata: Map<String, Value>,
    availability: Availability,
}

impl ComponentDescriptorBuilder {
    /// Sets the human-readable name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] when the name is empty.
    pub fn name(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidDescriptor {
                reason: "name cannot be empty".into(),
            });
        }
        self.name = Some(name);
        Ok(self)
    }

    /// Sets the version string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] when the version is empty.
    pub fn version(mut self, version: impl Into<String>) -> Result<Self> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(Error::InvalidDescriptor {
                reason: "version cannot be empty".into(),
            });
        }
        self.version = Some(version);
        Ok(self)
    }

    /// Sets the component type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] when the type is empty.
    pub fn component_type(mut self, component_type: impl Into<String>) -> Result<Self> {
        let component_type = component_type.into();
        if component_type.trim().is_empty() {
            return Err(Error::InvalidDescriptor {
                reason: "component type cannot be empty".into(),
            });
        }
        self.component_type = Some(component_type);
        Ok(self)
    }

    /// Sets an optional description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the advertised endpoint.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Replaces the capability set.
    #[must_use]
    pub fn capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Replaces the limitations map.
    #[must_use]
    pub fn limitations(mut self, limitations: Map<String, Value>) -> Self {
        self.limitations = limitations;
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Merges a full metadata map, overwriting duplicate keys.
    #[must_use]
    pub fn merge_metadata(mut self, map: Map<String, Value>) -> Self {
        self.metadata.extend(map);
        self
    }

    /// Overrides the initial availability summary.
    #[must_use]
    pub fn availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    /// Finalises the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] if mandatory fields are missing.
    pub fn build(self) -> Result<ComponentDescriptor> {
        let name = self.name.ok_or_else(|| Error::InvalidDescriptor {
            reason: "name must be provided".into(),
        })?;
        let version = self.version.ok_or_else(|| Error::InvalidDescriptor {
            reason: "version must be provided".into(),
        })?;
        let component_type = self.component_type.ok_or_else(|| Error::InvalidDescriptor {
            reason: "component type must be provided".into(),
        })?;

        let now = Utc::now();
        Ok(ComponentDescriptor {
            id: self.id,
            name,
            version,
            component_type,
            description: self.description,
            endpoint: self.endpoint,
            capabilities: self.capabilities,
            limitations: self.limitations,
            metadata: self.metadata,
            availability: self.availability,
            registered_at: now,
            last_seen: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CapabilitySet;

    fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::builder(ComponentId::new("athena").unwrap())
            .name("Athena")
            .unwrap()
            .version("1.0.0")
            .unwrap()
            .component_type("knowledge")
            .unwrap()
            .endpoint("http://localhost:8010")
            .capabilities(CapabilitySet::from_names(["knowledge.graph.query"]))
            .build()
            .unwrap()
    }

    #[test]
    fn builds_descriptor() {
        let descriptor = descriptor();
        assert_eq!(descriptor.name(), "Athena");
        assert!(descriptor.has_capability("query"));
        assert!(descriptor.has_capability("knowledge.graph.query"));
        assert!(descriptor.last_seen() <= Utc::now());
    }

    #[test]
    fn required_fields_enforced() {
        let result = ComponentDescriptor::builder(ComponentId::new("athena").unwrap()).build();
        assert!(result.is_err());
    }

    #[test]
    fn touch_seen_recovers_from_offline() {
        let mut descriptor = descriptor();
        descriptor.mark_offline();
        assert_eq!(descriptor.availability().status, AvailabilityStatus::Offline);

        descriptor.touch_seen(Utc::now());
        assert_eq!(
            descriptor.availability().status,
            AvailabilityStatus::Available
        );
    }
}
