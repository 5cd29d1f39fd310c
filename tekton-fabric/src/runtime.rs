//! Process-wide fabric context.

use std::sync::Arc;

use tracing::info;

use fabric_bus::{InMemoryBus, MessageBus};
use fabric_lifecycle::{LifecycleSupervisor, MonitorConfig};
use fabric_primitives::ComponentId;
use fabric_registry::{
    RegistrationConfig, RegistrationManager, RegistryConfig, RegistryError, ServiceRegistry,
};
use fabric_store::{ComponentStoreClient, DatabaseManager, StoreConfig};
use fabric_tasks::TaskManager;

/// Builder for [`FabricRuntime`].
pub struct FabricRuntimeBuilder {
    secret: Vec<u8>,
    bus: Option<Arc<dyn MessageBus>>,
    registry_config: RegistryConfig,
    monitor_config: MonitorConfig,
    store_config: StoreConfig,
}

impl FabricRuntimeBuilder {
    /// Starts a builder with the shared token secret.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            bus: None,
            registry_config: RegistryConfig::default(),
            monitor_config: MonitorConfig::default(),
            store_config: StoreConfig::default(),
        }
    }

    /// Installs a message bus implementation (defaults to [`InMemoryBus`]).
    #[must_use]
    pub fn with_bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Overrides the directory liveness configuration.
    #[must_use]
    pub fn with_registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry_config = config;
        self
    }

    /// Overrides the deadlock monitor configuration.
    #[must_use]
    pub fn with_monitor_config(mut self, config: MonitorConfig) -> Self {
        self.monitor_config = config;
        self
    }

    /// Overrides the database facade configuration.
    #[must_use]
    pub fn with_store_config(mut self, config: StoreConfig) -> Self {
        self.store_config = config;
        self
    }

    /// Constructs the runtime. Construction is one-shot; subsystems
    /// reference each other through the returned context only.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] when the registration
    /// configuration is invalid.
    pub fn build(self) -> Result<FabricRuntime, RegistryError> {
        let bus = self
            .bus
            .unwrap_or_else(|| Arc::new(InMemoryBus::new()) as Arc<dyn MessageBus>);
        let registry = Arc::new(ServiceRegistry::new(self.registry_config));
        let registration = Arc::new(RegistrationManager::new(
            Arc::clone(&registry),
            Arc::clone(&bus),
            RegistrationConfig::new(self.secret),
        )?);
        let supervisor = Arc::new(LifecycleSupervisor::new(
            Arc::clone(&bus),
            self.monitor_config,
        ));
        let database = Arc::new(DatabaseManager::new(self.store_config));
        let tasks = Arc::new(TaskManager::new());

        Ok(FabricRuntime {
            bus,
            registry,
            registration,
            supervisor,
            database,
            tasks,
        })
    }
}

/// Owner of every fabric subsystem in one process.
pub struct FabricRuntime {
    bus: Arc<dyn MessageBus>,
    registry: Arc<ServiceRegistry>,
    registration: Arc<RegistrationManager>,
    supervisor: Arc<LifecycleSupervisor>,
    database: Arc<DatabaseManager>,
    tasks: Arc<TaskManager>,
}

impl FabricRuntime {
    /// Starts building a runtime.
    #[must_use]
    pub fn builder(secret: impl Into<Vec<u8>>) -> FabricRuntimeBuilder {
        FabricRuntimeBuilder::new(secret)
    }

    /// Returns the message bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    /// Returns the service directory.
    #[must_use]
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Returns the registration manager.
    #[must_use]
    pub fn registration(&self) -> &Arc<RegistrationManager> {
        &self.registration
    }

    /// Returns the lifecycle supervisor.
    #[must_use]
    pub fn supervisor(&self) -> &Arc<LifecycleSupervisor> {
        &self.supervisor
    }

    /// Returns the database facade.
    #[must_use]
    pub fn database(&self) -> &Arc<DatabaseManager> {
        &self.database
    }

    /// Returns the task manager.
    #[must_use]
    pub fn tasks(&self) -> &Arc<TaskManager> {
        &self.tasks
    }

    /// Returns a database client scoped to one component.
    #[must_use]
    pub fn store_client(&self, component: ComponentId) -> ComponentStoreClient {
        ComponentStoreClient::new(Arc::clone(&self.database), component)
    }

    /// Starts background services: the directory liveness sweep, the
    /// deadlock monitor, and the bus-driven registration handlers.
    ///
    /// # Errors
    ///
    /// Propagates configuration and subscription failures.
    pub async fn start(&self) -> Result<(), RegistryError> {
        self.registry.start().await?;
        self.supervisor
            .start()
            .await
            .map_err(|err| RegistryError::Unavailable {
                reason: err.to_string(),
            })?;
        self.registration
            .attach_bus_handlers()
            .await
            .map_err(|err| RegistryError::Unavailable {
                reason: err.to_string(),
            })?;
        info!("fabric runtime started");
        Ok(())
    }

    /// Ordered teardown: stop sweeps, then flush and close database
    /// adapters.
    pub async fn shutdown(&self) {
        self.supervisor.stop().await;
        self.registry.stop().await;
        self.database.close_all().await;
        info!("fabric runtime stopped");
    }
}
