//! Service directory and Unified Registration Protocol for the Tekton fabric.
//!
//! Components must register before interacting with the rest of the
//! platform. [`RegistrationManager`] is the identity gate: it mints signed
//! tokens, delegates descriptor storage to the [`ServiceRegistry`]
//! directory, and republishes registration, heartbeat, and revocation
//! events on the message bus. [`HeartbeatController`] is the component-side
//! loop that keeps a registration alive.

#![warn(missing_docs, clippy::pedantic)]

mod client;
mod directory;
mod error;
mod manager;
mod token;

pub use client::{HeartbeatConfig, HeartbeatController, RegistrationTransport};
pub use directory::{DirectoryCallback, RegistryConfig, ServiceRegistry};
pub use error::{RegistryError, RegistryResult};
pub use manager::{RegistrationConfig, RegistrationManager};
pub use token::{SignedToken, TokenClaims, TokenSigner};
