//! Deadlock monitoring: operation timeouts, stuck startups, and cycle
//! arbitration.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use fabric_bus::{Headers, MessageBus, topics};
use fabric_primitives::ComponentId;

use crate::error::{LifecycleError, LifecycleResult};
use crate::graph::DependencyGraph;
use crate::observer::StateObserver;
use crate::state::ComponentState;

/// Metadata key the supervisor stamps when a component enters
/// INITIALIZING, as Unix milliseconds.
pub(crate) const START_TIME_KEY: &str = "start_time";

/// Configuration for the deadlock monitor.
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    operation_timeout: Duration,
    initializing_timeout: Duration,
    sweep_interval: Duration,
}

impl MonitorConfig {
    /// Creates a new configuration.
    #[must_use]
    pub const fn new(
        operation_timeout: Duration,
        initializing_timeout: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            operation_timeout,
            initializing_timeout,
            sweep_interval,
        }
    }

    /// Returns the timeout applied to tracked operations.
    #[must_use]
    pub const fn operation_timeout(self) -> Duration {
        self.operation_timeout
    }

    /// Returns the window after which a component stuck in INITIALIZING is
    /// arbitrated.
    #[must_use]
    pub const fn initializing_timeout(self) -> Duration {
        self.initializing_timeout
    }

    /// Returns the interval between monitor sweeps.
    #[must_use]
    pub const fn sweep_interval(self) -> Duration {
        self.sweep_interval
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidConfig`] when any duration is zero.
    pub fn validate(self) -> LifecycleResult<()> {
        if self.operation_timeout.is_zero() {
            return Err(LifecycleError::InvalidConfig(
                "operation timeout must be greater than zero",
            ));
        }
        if self.initializing_timeout.is_zero() {
            return Err(LifecycleError::InvalidConfig(
                "initializing timeout must be greater than zero",
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(LifecycleError::InvalidConfig(
                "sweep interval must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(60),
            initializing_timeout: Duration::from_secs(120),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

/// A tracked long-running operation.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Unique identifier of the operation.
    pub operation_id: String,
    /// Component the operation runs on behalf of.
    pub component_id: ComponentId,
    /// Kind of operation (`"start"`, `"migrate"`, ...).
    pub operation_type: String,
    /// When the operation began.
    pub started_at: DateTime<Utc>,
    /// Caller-supplied context.
    pub metadata: Map<String, Value>,
}

/// Watches for operation timeouts, stuck startups, and dependency cycles.
pub struct DeadlockMonitor {
    config: MonitorConfig,
    observer: Arc<StateObserver>,
    bus: Arc<dyn MessageBus>,
    graph: RwLock<DependencyGraph>,
    operations: Mutex<HashMap<String, Operation>>,
    shutdown: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeadlockMonitor {
    /// Creates a monitor over the given observer and bus.
    #[must_use]
    pub fn new(
        config: MonitorConfig,
        observer: Arc<StateObserver>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            config,
            observer,
            bus,
            graph: RwLock::new(DependencyGraph::new()),
            operations: Mutex::new(HashMap::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Returns the monitor configuration.
    #[must_use]
    pub const fn config(&self) -> MonitorConfig {
        self.config
    }

    /// Records the dependencies of a component, replacing previous edges.
    pub async fn register_dependency(
        &self,
        component: ComponentId,
        dependencies: Vec<ComponentId>,
    ) {
        self.graph
            .write()
            .await
            .register_dependency(component, dependencies);
    }

    /// Returns the direct dependencies of a component.
    pub async fn dependencies_of(&self, component: &ComponentId) -> Vec<ComponentId> {
        self.graph.read().await.dependencies_of(component)
    }

    /// Detects cycles in the dependency graph.
    pub async fn detect_cycles(&self) -> Vec<Vec<ComponentId>> {
        self.graph.read().await.detect_cycles()
    }

    /// Breaks each detected cycle by removing one edge, publishing a
    /// `lifecycle.deadlock.detected` event with the findings.
    pub async fn resolve_cycles(&self) -> Vec<(ComponentId, ComponentId)> {
        let (cycles, removed) = {
            let mut graph = self.graph.write().await;
            let cycles = graph.detect_cycles();
            if cycles.is_empty() {
                return Vec::new();
            }
            let removed = graph.resolve_cycles();
            (cycles, removed)
        };

        let payload = json!({
            "cycles": cycles,
            "removed_edges": removed,
            "detected_at": Utc::now(),
        });
        if let Err(err) = self
            .bus
            .publish(topics::LIFECYCLE_DEADLOCK, payload, Headers::new())
            .await
        {
            warn!(%err, "failed to publish deadlock event");
        }

        removed
    }

    /// Registers a long-running operation for timeout tracking.
    pub async fn register_operation(
        &self,
        operation_id: impl Into<String>,
        component_id: ComponentId,
        operation_type: impl Into<String>,
        metadata: Map<String, Value>,
    ) {
        let operation_id = operation_id.into();
        let operation = Operation {
            operation_id: operation_id.clone(),
            component_id,
            operation_type: operation_type.into(),
            started_at: Utc::now(),
            metadata,
        };
        self.operations.lock().await.insert(operation_id, operation);
    }

    /// Clears a completed operation; returns `false` when unknown.
    pub async fn complete_operation(&self, operation_id: &str) -> bool {
        self.operations.lock().await.remove(operation_id).is_some()
    }

    /// Returns the number of operations currently in flight.
    pub async fn pending_operations(&self) -> usize {
        self.operations.lock().await.len()
    }

    /// Starts the periodic monitor sweep.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidConfig`] when the configuration is
    /// invalid.
    pub async fn start(self: &Arc<Self>) -> LifecycleResult<()> {
        self.config.validate()?;
        let mut slot = self.worker.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        self.shutdown.store(false, Ordering::Release);
        let monitor = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.config.sweep_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            while !shutdown.load(Ordering::Acquire) {
                ticker.tick().await;
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                monitor.sweep_once().await;
            }
        }));
        info!("deadlock monitoring started");
        Ok(())
    }

    /// Stops the periodic monitor sweep.
    pub async fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.worker.lock().await.take() {
            handle.abort();
        }
        info!("deadlock monitoring stopped");
    }

    /// Runs a single monitor sweep.
    ///
    /// Exposed for deterministic tests; the background loop calls this on
    /// every tick.
    pub async fn sweep_once(&self) {
        self.expire_operations().await;
        self.arbitrate_stuck_initializing().await;

        if !self.detect_cycles().await.is_empty() {
            self.resolve_cycles().await;
        }
    }

    async fn expire_operations(&self) {
        let now = Utc::now();
        let timeout = chrono::Duration::from_std(self.config.operation_timeout())
            .unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 1_000));

        let expired: Vec<Operation> = {
            let mut guard = self.operations.lock().await;
            let stale: Vec<String> = guard
                .values()
                .filter(|op| now - op.started_at > timeout)
                .map(|op| op.operation_id.clone())
                .collect();
            stale
                .iter()
                .filter_map(|operation_id| guard.remove(operation_id))
                .collect()
        };

        for operation in expired {
            warn!(
                operation = %operation.operation_id,
                component = %operation.component_id,
                kind = %operation.operation_type,
                "operation timed out"
            );
            let mut metadata = Map::new();
            metadata.insert(
                "error".into(),
                Value::from(format!(
                    "operation {} timed out",
                    operation.operation_type
                )),
            );
            metadata.insert("failure_reason".into(), Value::from("operation_timeout"));
            if let Err(err) = self
                .observer
                .set_state(&operation.component_id, ComponentState::Failed, metadata)
                .await
            {
                warn!(component = %operation.component_id, %err, "could not fail component after operation timeout");
            }
        }
    }

    async fn arbitrate_stuck_initializing(&self) {
        let now_millis = Utc::now().timestamp_millis();
        let timeout_millis =
            i64::try_from(self.config.initializing_timeout().as_millis()).unwrap_or(i64::MAX);

        let components = self.observer.all().await;
        for (component, (state, metadata)) in components {
            if state != ComponentState::Initializing {
                continue;
            }
            let Some(started) = metadata.get(START_TIME_KEY).and_then(Value::as_i64) else {
                continue;
            };
            if now_millis - started <= timeout_millis {
                continue;
            }
            warn!(component = %component, "component stuck in initializing");

            let dependencies = self.dependencies_of(&component).await;
            let mut blocked_by = Vec::new();
            for dependency in dependencies {
                let (dep_state, _) = self.observer.state_of(&dependency).await;
                if dep_state != ComponentState::Ready {
                    blocked_by.push(dependency);
                }
            }

            if blocked_by.is_empty() {
                let mut metadata = Map::new();
                metadata.insert("error".into(), Value::from("start timed out"));
                metadata.insert("failure_reason".into(), Value::from("start_timeout"));
                if let Err(err) = self
                    .observer
                    .set_state(&component, ComponentState::Failed, metadata)
                    .await
                {
                    warn!(component = %component, %err, "could not fail stuck component");
                }
            } else {
                warn!(component = %component, ?blocked_by, "component blocked by dependencies");
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
                if let Err(err) = self
                    .observer
                    .set_state(&component, ComponentState::Degraded, metadata)
                    .await
                {
                    warn!(component = %component, %err, "could not degrade stuck component");
                } else {
                    info!(component = %component, "degraded to prevent deadlock");
                }
            }
        }
    }
}
