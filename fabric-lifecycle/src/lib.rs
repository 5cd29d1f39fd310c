//! Lifecycle supervision for Tekton components.
//!
//! Every component moves through a small state machine on its way from
//! registration to readiness. The [`LifecycleSupervisor`] is the only
//! writer of component state: it wraps caller-supplied initializers with
//! deadlines, keeps the dependency graph acyclic at runtime, and hosts the
//! [`DeadlockMonitor`] that arbitrates stuck startups.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod graph;
mod monitor;
mod observer;
mod state;
mod supervisor;

pub use error::{LifecycleError, LifecycleResult};
pub use graph::DependencyGraph;
pub use monitor::{DeadlockMonitor, MonitorConfig, Operation};
pub use observer::{ComponentCallback, StateCallback, StateObserver, TransitionCallback};
pub use state::{ComponentState, StateTransition};
pub use supervisor::LifecycleSupervisor;
