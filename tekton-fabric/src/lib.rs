//! Tekton service fabric.
//!
//! Composes long-lived components into a single cooperative system: each
//! component registers with the central directory, announces its
//! capabilities, heartbeats liveness, and shares the pluggable storage
//! facade. The [`FabricRuntime`] is the process-wide owner of every
//! subsystem, with one-shot construction and ordered teardown.

#![warn(missing_docs, clippy::pedantic)]

#[cfg(all(feature = "bus", feature = "registry", feature = "lifecycle", feature = "store", feature = "tasks"))]
mod runtime;

pub use fabric_primitives as primitives;

#[cfg(feature = "bus")]
pub use fabric_bus as bus;
#[cfg(feature = "config")]
pub use fabric_config as config;
#[cfg(feature = "lifecycle")]
pub use fabric_lifecycle as lifecycle;
#[cfg(feature = "registry")]
pub use fabric_registry as registry;
#[cfg(feature = "store")]
pub use fabric_store as store;
#[cfg(feature = "tasks")]
pub use fabric_tasks as tasks;

#[cfg(all(feature = "bus", feature = "registry", feature = "lifecycle", feature = "store", feature = "tasks"))]
pub use runtime::{FabricRuntime, FabricRuntimeBuilder};
