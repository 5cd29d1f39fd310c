//! Core shared types for the Tekton service fabric.

#![warn(missing_docs, clippy::pedantic)]

mod capability;
mod descriptor;
mod error;
mod ids;

/// Capability naming, specs, and indexed lookup.
pub use capability::{CapabilityName, CapabilitySet, CapabilitySpec, DomainSpec};
/// Component descriptors and availability metadata.
pub use descriptor::{
    Availability, AvailabilityStatus, ComponentDescriptor, ComponentDescriptorBuilder,
    ResponseTime,
};
/// Error type, result alias, and the shared error taxonomy.
pub use error::{Error, ErrorKind, Result};
/// Identifiers for components and registration tokens.
pub use ids::{ComponentId, TokenId};
