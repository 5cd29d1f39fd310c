//! Component startup manifests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use fabric_primitives::{CapabilitySet, ComponentDescriptor, ComponentId};

use crate::{ConfigError, ConfigResult, env};

const MIN_PORT: u16 = 1024;

/// Identity section of a startup manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSection {
    /// Stable component identifier (alphanumeric plus underscore).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Semantic version string.
    pub version: String,
    /// Port the component listens on (1024-65535).
    pub port: u16,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One parameter of a capability method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterManifest {
    /// Parameter name.
    pub name: String,
    /// Declared type, free-form.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub param_type: Option<String>,
    /// Whether the parameter is required.
    #[serde(default)]
    pub required: bool,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One method exposed by a capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodManifest {
    /// Method identifier, unique within its capability.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Method parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterManifest>,
    /// Declared return shape, free-form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<Value>,
}

/// One capability advertised in a startup manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityManifest {
    /// Capability identifier, unique within the manifest.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Methods grouped under this capability.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<MethodManifest>,
}

/// A component's YAML startup manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupManifest {
    /// Identity section.
    pub component: ComponentSection,
    /// Advertised capabilities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<CapabilityManifest>,
    /// Free-form component configuration.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
}

fn valid_manifest_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl StartupManifest {
    /// Parses a manifest from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] on malformed input.
    pub fn from_yaml(text: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Serializes the manifest to YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] when serialization fails.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Loads a manifest from a file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Yaml`].
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Finds and loads the manifest for a component.
    ///
    /// Searches `<root>/<id>/<id>.yaml`, `<root>/<id>.yaml`, and
    /// `./<id>.yaml`, where `<root>` honors `TEKTON_ROOT`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] when no candidate file exists.
    pub fn discover(component_id: &str) -> ConfigResult<Self> {
        let root = env::tekton_root();
        let candidates: [PathBuf; 3] = [
            root.join(component_id).join(format!("{component_id}.yaml")),
            root.join(format!("{component_id}.yaml")),
            PathBuf::from(format!("{component_id}.yaml")),
        ];
        for candidate in candidates {
            if candidate.is_file() {
                debug!(path = %candidate.display(), "manifest discovered");
                return Self::load(candidate);
            }
        }
        Err(ConfigError::NotFound {
            component: component_id.to_string(),
        })
    }

    /// Collects every rule the manifest violates.
    #[must_use]
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let component = &self.component;

        if component.id.is_empty() {
            errors.push("component id is required".to_string());
        } else if !valid_manifest_id(&component.id) {
            errors.push(format!(
                "component id `{}` must be alphanumeric plus underscore",
                component.id
            ));
        }
        if component.name.trim().is_empty() {
            errors.push("component name is required".to_string());
        }
        if component.version.trim().is_empty() {
            errors.push("component version is required".to_string());
        }
        if component.port < MIN_PORT {
            errors.push(format!(
                "port {} is reserved; use {MIN_PORT}-65535",
                component.port
            ));
        }

        let mut capability_ids = HashSet::new();
        for (index, capability) in self.capabilities.iter().enumerate() {
            if capability.id.is_empty() {
                errors.push(format!("capability {} id is required", index + 1));
                continue;
            }
            if !valid_manifest_id(&capability.id) {
                errors.push(format!(
                    "capability id `{}` must be alphanumeric plus underscore",
                    capability.id
                ));
            }
            if !capability_ids.insert(capability.id.as_str()) {
                errors.push(format!("duplicate capability id `{}`", capability.id));
            }
            if capability.name.trim().is_empty() {
                errors.push(format!("name for capability `{}` is required", capability.id));
            }

            let mut method_ids = HashSet::new();
            for (method_index, method) in capability.methods.iter().enumerate() {
                if method.id.is_empty() {
                    errors.push(format!(
                        "method {} id is required for capability `{}`",
                        method_index + 1,
                        capability.id
                    ));
                    continue;
                }
                if !method_ids.insert(method.id.as_str()) {
                    errors.push(format!(
                        "duplicate method id `{}` in capability `{}`",
                        method.id, capability.id
                    ));
                }
                if method.name.trim().is_empty() {
                    errors.push(format!(
                        "name for method `{}` in capability `{}` is required",
                        method.id, capability.id
                    ));
                }
            }
        }

        errors
    }

    /// Validates the manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing every violated rule.
    pub fn validate(&self) -> ConfigResult<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { errors })
        }
    }

    /// Builds the registry descriptor this manifest describes.
    ///
    /// Capabilities are flattened to their ids plus dotted
    /// `capability.method` entries; the endpoint is derived from the port.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the manifest fails validation
    /// or descriptor construction rejects a field.
    pub fn to_descriptor(&self) -> ConfigResult<ComponentDescriptor> {
        self.validate()?;

        let id = ComponentId::new(&self.component.id).map_err(|err| ConfigError::Invalid {
            errors: vec![err.to_string()],
        })?;

        let mut names = Vec::new();
        for capability in &self.capabilities {
            names.push(capability.id.clone());
            for method in &capability.methods {
                names.push(format!("{}.{}", capability.id, method.id));
            }
        }

        let invalid = |err: fabric_primitives::Error| ConfigError::Invalid {
            errors: vec![err.to_string()],
        };
        let mut builder = ComponentDescriptor::builder(id)
            .name(&self.component.name)
            .map_err(invalid)?
            .version(&self.component.version)
            .map_err(invalid)?
            .component_type(&self.component.id)
            .map_err(invalid)?
            .endpoint(format!("http://localhost:{}", self.component.port))
            .capabilities(CapabilitySet::from_names(names))
            .metadata("port", Value::from(self.component.port));
        if let Some(description) = &self.component.description {
            builder = builder.description(description);
        }

        builder.build().map_err(invalid)
    }

    /// Generates a starter manifest for a new component.
    #[must_use]
    pub fn template(component_id: &str, name: &str, port: u16) -> Self {
        Self {
            component: ComponentSection {
                id: component_id.to_string(),
                name: name.to_string(),
                version: "0.1.0".to_string(),
                port,
                description: Some(format!("{name} component for the Tekton platform")),
            },
            capabilities: vec![CapabilityManifest {
                id: "example".to_string(),
                name: "Example capability".to_string(),
                description: Some("Replace with the component's real capabilities".to_string()),
                methods: vec![MethodManifest {
                    id: "ping".to_string(),
                    name: "Ping".to_string(),
                    parameters: Vec::new(),
                    returns: Some(Value::from("pong")),
                }],
            }],
            config: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_yaml() -> &'static str {
        r"
component:
  id: athena
  name: Athena
  version: 1.0.0
  port: 8010
  description: Knowledge graph component
capabilities:
  - id: knowledge
    name: Knowledge
    methods:
      - id: query
        name: Query
        parameters:
          - name: pattern
            type: string
            required: true
      - id: mutate
        name: Mutate
config:
  graph_backend: memory
"
    }

    #[test]
    fn parses_and_validates_manifest() {
        let manifest = StartupManifest::from_yaml(manifest_yaml()).unwrap();
        manifest.validate().unwrap();
        assert_eq!(manifest.component.id, "athena");
        assert_eq!(manifest.capabilities[0].methods.len(), 2);
        assert_eq!(manifest.config["graph_backend"], "memory");
    }

    #[test]
    fn rejects_bad_port_and_id() {
        let mut manifest = StartupManifest::from_yaml(manifest_yaml()).unwrap();
        manifest.component.port = 80;
        manifest.component.id = "bad-id!".to_string();

        let errors = manifest.validation_errors();
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            manifest.validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut manifest = StartupManifest::from_yaml(manifest_yaml()).unwrap();
        let duplicate = manifest.capabilities[0].clone();
        manifest.capabilities.push(duplicate);
        let mut dup_method = manifest.capabilities[0].methods[0].clone();
        dup_method.name = "Other".to_string();
        manifest.capabilities[0].methods.push(dup_method);

        let errors = manifest.validation_errors();
        assert!(errors.iter().any(|e| e.contains("duplicate capability id")));
        assert!(errors.iter().any(|e| e.contains("duplicate method id")));
    }

    #[test]
    fn descriptor_flattens_capabilities() {
        let manifest = StartupManifest::from_yaml(manifest_yaml()).unwrap();
        let descriptor = manifest.to_descriptor().unwrap();

        assert_eq!(descriptor.id().as_str(), "athena");
        assert!(descriptor.has_capability("knowledge"));
        assert!(descriptor.has_capability("knowledge.query"));
        assert_eq!(descriptor.endpoint(), Some("http://localhost:8010"));
        assert_eq!(descriptor.metadata()["port"], 8010);
    }

    #[test]
    fn template_round_trips_and_validates() {
        let template = StartupManifest::template("newcomp", "New Component", 8123);
        template.validate().unwrap();

        let yaml = template.to_yaml().unwrap();
        let parsed = StartupManifest::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.component.id, "newcomp");
        assert_eq!(parsed.component.port, 8123);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("athena.yaml");
        std::fs::write(&path, manifest_yaml()).unwrap();

        let manifest = StartupManifest::load(&path).unwrap();
        assert_eq!(manifest.component.name, "Athena");
    }
}
