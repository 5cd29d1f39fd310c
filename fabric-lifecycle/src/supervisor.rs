//! Timeout-bounded component startup and state arbitration.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use fabric_bus::{Headers, MessageBus, topics};
use fabric_primitives::ComponentId;

use crate::error::{LifecycleError, LifecycleResult};
use crate::monitor::{DeadlockMonitor, MonitorConfig, START_TIME_KEY};
use crate::observer::StateObserver;
use crate::state::{ComponentState, StateTransition};

/// Supervises component startup, dependencies, and state transitions.
///
/// The supervisor is the only writer of component state. Every transition
/// is recorded by the [`StateObserver`] and republished on
/// `lifecycle.state.<id>`.
pub struct LifecycleSupervisor {
    observer: Arc<StateObserver>,
    monitor: Arc<DeadlockMonitor>,
}

impl LifecycleSupervisor {
    /// Creates a supervisor publishing transitions on the given bus.
    #[must_use]
    pub fn new(bus: Arc<dyn MessageBus>, config: MonitorConfig) -> Self {
        let observer = Arc::new(StateObserver::new());

        let publisher = Arc::clone(&bus);
        observer.on_transition(Arc::new(move |id: &ComponentId, transition: &StateTransition| {
            let bus = Arc::clone(&publisher);
            let topic = topics::lifecycle_state(id);
            let payload = json!({
                "component_id": id,
                "from": transition.from,
                "to": transition.to,
                "at": transition.at,
                "metadata": transition.metadata,
            });
            tokio::spawn(async move {
                if let Err(err) = bus.publish(&topic, payload, Headers::new()).await {
                    warn!(%topic, %err, "failed to publish lifecycle transition");
                }
            });
        }));

        let monitor = Arc::new(DeadlockMonitor::new(config, Arc::clone(&observer), bus));
        Self { observer, monitor }
    }

    /// Returns the state observer.
    #[must_use]
    pub fn observer(&self) -> &Arc<StateObserver> {
        &self.observer
    }

    /// Returns the deadlock monitor.
    #[must_use]
    pub fn monitor(&self) -> &Arc<DeadlockMonitor> {
        &self.monitor
    }

    /// Registers a component and its dependencies with the supervisor.
    pub async fn register_component(
        &self,
        id: ComponentId,
        dependencies: Vec<ComponentId>,
        metadata: Map<String, Value>,
    ) {
        self.observer
            .track(id.clone(), ComponentState::Unknown, metadata)
            .await;
        if !dependencies.is_empty() {
            self.monitor.register_dependency(id, dependencies).await;
        }
    }

    /// Starts a component, applying `start_timeout` to the initializer.
    ///
    /// The initializer's output is interpreted as boolean health: `true`
    /// moves the component to READY, `false` to FAILED. An elapsed
    /// deadline (a closed upper bound) moves it to DEGRADED with the
    /// non-READY dependencies recorded in `blocked_by`, or to FAILED when
    /// every dependency is healthy. Returns whether the component reached
    /// READY.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] when the component is
    /// already starting or running.
    pub async fn start_component<F>(
        &self,
        id: &ComponentId,
        start: F,
        start_timeout: Duration,
    ) -> LifecycleResult<bool>
    where
        F: Future<Output = bool> + Send,
    {
        let (current, _) = self.observer.state_of(id).await;
        match current {
            ComponentState::Unknown | ComponentState::Failed => {
                let mut metadata = Map::new();
                metadata.insert(
                    START_TIME_KEY.into(),
                    Value::from(chrono::Utc::now().timestamp_millis()),
                );
                self.observer
                    .set_state(id, ComponentState::Initializing, metadata)
                    .await?;
            }
            ComponentState::Stopping | ComponentState::Degraded => {
                self.observer
                    .set_state(id, ComponentState::Restarting, Map::new())
                    .await?;
            }
            ComponentState::Initializing
            | ComponentState::Restarting
            | ComponentState::Ready => {
                return Err(LifecycleError::InvalidTransition {
                    component: id.clone(),
                    from: current,
                    to: ComponentState::Initializing,
                });
            }
        }

        self.warn_on_sick_dependencies(id).await;

        let operation_id = format!("{id}-start-{}", Uuid::new_v4());
        self.monitor
            .register_operation(operation_id.clone(), id.clone(), "start", Map::new())
            .await;

        let outcome = timeout(start_timeout, start).await;
        self.monitor.complete_operation(&operation_id).await;

        match outcome {
            Ok(true) => {
                self.observer
                    .set_state(id, ComponentState::Ready, Map::new())
                    .await?;
                info!(component = %id, "component started");
                Ok(true)
            }
            Ok(false) => {
                let mut metadata = Map::new();
                metadata.insert(
                    "error".into(),
                    Value::from("initializer reported unhealthy"),
                );
                self.observer
                    .set_state(id, ComponentState::Failed, metadata)
                    .await?;
                error!(component = %id, "component initializer reported unhealthy");
                Ok(false)
            }
            Err(_elapsed) => {
                let blocked_by = self.sick_dependencies(id).await;
                if blocked_by.is_empty() {
                    let mut metadata = Map::new();
                    metadata.insert(
                        "error".into(),
                        Value::from(format!(
                            "start timed out after {}s",
                            start_timeout.as_secs()
                        )),
                    );
                    metadata.insert("failure_reason".into(), Value::from("start_timeout"));
                    self.observer
                        .set_state(id, ComponentState::Failed, metadata)
                        .await?;
                    error!(component = %id, "component start timed out");
                } else {
                    warn!(component = %id, ?blocked_by, "start timed out on sick dependencies");
                    let mut metadata = Map::new();
                    metadata.insert(
                        "blocked_by".into(),
                        Value::from(
                            blocked_by
                                .iter()
                                .map(ToString::to_string)
                                .collect::<Vec<_>>(),
                        ),
                    );
                    metadata.insert(
                        "degraded_reason".into(),
                        Value::from("dependency_timeout"),
                    );
                    self.observer
                        .set_state(id, ComponentState::Degraded, metadata)
                        .await?;
                }
                Ok(false)
            }
        }
    }

    /// Moves a component into graceful shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] when the component is
    /// not in a stoppable state.
    pub async fn stop_component(&self, id: &ComponentId) -> LifecycleResult<()> {
        self.observer
            .set_state(id, ComponentState::Stopping, Map::new())
            .await?;
        info!(component = %id, "component stopping");
        Ok(())
    }

    /// Returns the current state and metadata of a component.
    pub async fn status(&self, id: &ComponentId) -> (ComponentState, Map<String, Value>) {
        self.observer.state_of(id).await
    }

    /// Returns states for every tracked component.
    pub async fn all_status(
        &self,
    ) -> HashMap<ComponentId, (ComponentState, Map<String, Value>)> {
        self.observer.all().await
    }

    /// Starts the deadlock monitor sweep.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidConfig`] when the monitor
    /// configuration is invalid.
    pub async fn start(&self) -> LifecycleResult<()> {
        self.monitor.start().await
    }

    /// Stops the deadlock monitor sweep.
    pub async fn stop(&self) {
        self.monitor.stop().await;
    }

    async fn sick_dependencies(&self, id: &ComponentId) -> Vec<ComponentId> {
        let mut blocked = Vec::new();
        for dependency in self.monitor.dependencies_of(id).await {
            let (state, _) = self.observer.state_of(&dependency).await;
            if state != ComponentState::Ready {
                blocked.push(dependency);
            }
        }
        blocked
    }

    async fn warn_on_sick_dependencies(&self, id: &ComponentId) {
        for dependency in self.monitor.dependencies_of(id).await {
            let (state, _) = self.observer.state_of(&dependency).await;
            if !state.is_operational() {
                warn!(component = %id, dependency = %dependency, state = %state, "dependency not ready at start");
            }
        }
    }
}
