//! Startup manifests and environment settings for Tekton components.
//!
//! A component ships a YAML manifest describing its identity, port, and
//! capabilities. The registration helper loads, validates, and turns it
//! into the descriptor submitted to the registry.

#![warn(missing_docs, clippy::pedantic)]

mod env;
mod manifest;

use fabric_primitives::ErrorKind;
use thiserror::Error;

pub use env::{HERMES_URL_ENV, TEKTON_ROOT_ENV, hermes_url, tekton_root};
pub use manifest::{
    CapabilityManifest, ComponentSection, MethodManifest, ParameterManifest, StartupManifest,
};

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating manifests.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Manifest file could not be read.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },

    /// Manifest is not well-formed YAML.
    #[error("yaml error: {source}")]
    Yaml {
        /// Source [`serde_yaml::Error`].
        #[from]
        source: serde_yaml::Error,
    },

    /// Manifest content failed validation.
    #[error("invalid manifest: {}", errors.join("; "))]
    Invalid {
        /// One entry per violated rule.
        errors: Vec<String>,
    },

    /// No manifest was found for the component.
    #[error("no manifest found for component `{component}`")]
    NotFound {
        /// The component searched for.
        component: String,
    },
}

impl ConfigError {
    /// Returns the taxonomy classification for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } | Self::Yaml { .. } => ErrorKind::Internal,
            Self::Invalid { .. } => ErrorKind::InvalidArgument,
            Self::NotFound { .. } => ErrorKind::NotFound,
        }
    }
}
