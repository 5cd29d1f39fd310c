//! Authoritative in-memory component directory with liveness sweeps.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use fabric_primitives::{Availability, AvailabilityStatus, ComponentDescriptor, ComponentId};

use crate::{RegistryError, RegistryResult};

/// Configuration for the directory's liveness sweep.
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    check_interval: Duration,
    offline_multiplier: u32,
}

impl RegistryConfig {
    /// Creates a new configuration.
    #[must_use]
    pub const fn new(check_interval: Duration, offline_multiplier: u32) -> Self {
        Self {
            check_interval,
            offline_multiplier,
        }
    }

    /// Returns the interval between liveness sweeps.
    #[must_use]
    pub const fn check_interval(self) -> Duration {
        self.check_interval
    }

    /// Returns the window, as a multiple of the check interval, after which
    /// a silent component is marked offline.
    #[must_use]
    pub const fn offline_multiplier(self) -> u32 {
        self.offline_multiplier
    }

    /// Returns the absolute silence window before a component goes offline.
    #[must_use]
    pub fn offline_after(self) -> Duration {
        self.check_interval * self.offline_multiplier
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] when the interval is zero or
    /// the multiplier is zero.
    pub fn validate(self) -> RegistryResult<()> {
        if self.check_interval.is_zero() {
            return Err(RegistryError::InvalidConfig(
                "check interval must be greater than zero",
            ));
        }
        if self.offline_multiplier == 0 {
            return Err(RegistryError::InvalidConfig(
                "offline multiplier must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            offline_multiplier: 3,
        }
    }
}

/// Callback invoked with the component id and a descriptor snapshot.
pub type DirectoryCallback = Arc<dyn Fn(&ComponentId, &ComponentDescriptor) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    registered: Vec<DirectoryCallback>,
    unregistered: Vec<DirectoryCallback>,
    updated: Vec<DirectoryCallback>,
}

/// Capability-indexed directory of live components.
///
/// Mutations and reads are serialized behind a single lock; callbacks are
/// invoked after the guard is dropped so handlers can re-enter the
/// directory, and a panicking callback never disturbs the sweep.
pub struct ServiceRegistry {
    config: RegistryConfig,
    components: RwLock<HashMap<ComponentId, ComponentDescriptor>>,
    callbacks: std::sync::RwLock<Callbacks>,
    shutdown: Arc<AtomicBool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ServiceRegistry {
    /// Creates an empty directory.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            components: RwLock::new(HashMap::new()),
            callbacks: std::sync::RwLock::new(Callbacks::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
            sweeper: Mutex::new(None),
        }
    }

    /// Returns the sweep configuration.
    #[must_use]
    pub const fn config(&self) -> RegistryConfig {
        self.config
    }

    /// Inserts or refreshes a descriptor, returning its id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] only through config
    /// validation at sweep start; insertion itself always succeeds for a
    /// well-formed descriptor.
    pub async fn register(&self, descriptor: ComponentDescriptor) -> RegistryResult<ComponentId> {
        let id = descriptor.id().clone();
        let snapshot = descriptor.clone();
        {
            let mut guard = self.components.write().await;
            guard.insert(id.clone(), descriptor);
        }
        info!(component = %id, name = snapshot.name(), "component registered");
        self.fire(|cb| &cb.registered, &id, &snapshot);
        Ok(id)
    }

    /// Removes a component; returns `false` when the id is unknown.
    pub async fn unregister(&self, id: &ComponentId) -> bool {
        let removed = {
            let mut guard = self.components.write().await;
            guard.remove(id)
        };
        match removed {
            Some(descriptor) => {
                info!(component = %id, "component unregistered");
                self.fire(|cb| &cb.unregistered, id, &descriptor);
                true
            }
            None => {
                warn!(component = %id, "unregister for unknown component");
                false
            }
        }
    }

    /// Returns a snapshot of the descriptor for `id`.
    pub async fn get(&self, id: &ComponentId) -> Option<ComponentDescriptor> {
        self.components.read().await.get(id).cloned()
    }

    /// Finds components advertising the given capability.
    ///
    /// Searches both flat capability lists and structured
    /// `category.domain.capability` declarations.
    pub async fn find_by_capability(&self, capability: &str) -> Vec<ComponentDescriptor> {
        self.components
            .read()
            .await
            .values()
            .filter(|descriptor| descriptor.has_capability(capability))
            .cloned()
            .collect()
    }

    /// Finds components of the given type.
    pub async fn find_by_type(&self, component_type: &str) -> Vec<ComponentDescriptor> {
        self.components
            .read()
            .await
            .values()
            .filter(|descriptor| descriptor.component_type() == component_type)
            .cloned()
            .collect()
    }

    /// Records a liveness signal, optionally replacing availability.
    ///
    /// Touches `last_seen` (flipping an offline component back to
    /// available) and fires `updated` callbacks. Returns `false` when the
    /// id is unknown.
    pub async fn update_status(
        &self,
        id: &ComponentId,
        availability: Option<Availability>,
    ) -> bool {
        let snapshot = {
            let mut guard = self.components.write().await;
            let Some(descriptor) = guard.get_mut(id) else {
                warn!(component = %id, "status update for unknown component");
                return false;
            };
            descriptor.touch_seen(Utc::now());
            if let Some(availability) = availability {
                descriptor.set_availability(availability);
            }
            descriptor.clone()
        };
        debug!(component = %id, "status updated");
        self.fire(|cb| &cb.updated, id, &snapshot);
        true
    }

    /// Returns a snapshot of every registered component.
    pub async fn all(&self) -> HashMap<ComponentId, ComponentDescriptor> {
        self.components.read().await.clone()
    }

    /// Returns the number of registered components.
    pub async fn len(&self) -> usize {
        self.components.read().await.len()
    }

    /// Returns `true` when the directory is empty.
    pub async fn is_empty(&self) -> bool {
        self.components.read().await.is_empty()
    }

    /// Registers a callback fired after each accepted registration.
    pub fn on_registered(&self, callback: DirectoryCallback) {
        self.callbacks
            .write()
            .expect("callback lock poisoned")
            .registered
            .push(callback);
    }

    /// Registers a callback fired after each removal.
    pub fn on_unregistered(&self, callback: DirectoryCallback) {
        self.callbacks
            .write()
            .expect("callback lock poisoned")
            .unregistered
            .push(callback);
    }

    /// Registers a callback fired after status updates and offline sweeps.
    pub fn on_updated(&self, callback: DirectoryCallback) {
        self.callbacks
            .write()
            .expect("callback lock poisoned")
            .updated
            .push(callback);
    }

    /// Starts the background liveness sweep.
    ///
    /// A component silent for longer than `check_interval ×
    /// offline_multiplier` is marked offline exactly once and retained;
    /// removal only happens on explicit unregister.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] when the sweep
    /// configuration is invalid.
    pub async fn start(self: &Arc<Self>) -> RegistryResult<()> {
        self.config.validate()?;
        let mut slot = self.sweeper.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        self.shutdown.store(false, Ordering::Release);
        let registry = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(registry.config.check_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            while !shutdown.load(Ordering::Acquire) {
                ticker.tick().await;
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                registry.sweep_once().await;
            }
        });
        *slot = Some(handle);
        info!("registry liveness sweep started");
        Ok(())
    }

    /// Stops the background liveness sweep.
    pub async fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }
        info!("registry liveness sweep stopped");
    }

    /// Runs one liveness sweep over the directory.
    ///
    /// Exposed for deterministic tests; the background loop calls this on
    /// every tick.
    pub async fn sweep_once(&self) {
        let offline_after = chrono::Duration::from_std(self.config.offline_after())
            .unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 1_000));
        let now = Utc::now();

        let mut flagged = Vec::new();
        {
            let mut guard = self.components.write().await;
            for (id, descriptor) in guard.iter_mut() {
                if descriptor.availability().status == AvailabilityStatus::Offline {
                    continue;
                }
                if now - descriptor.last_seen() > offline_after {
                    descriptor.mark_offline();
                    warn!(component = %id, "component marked offline");
                    flagged.push((id.clone(), descriptor.clone()));
                }
            }
        }

        for (id, descriptor) in flagged {
            self.fire(|cb| &cb.updated, &id, &descriptor);
        }
    }

    fn fire<F>(&self, select: F, id: &ComponentId, descriptor: &ComponentDescriptor)
    where
        F: Fn(&Callbacks) -> &Vec<DirectoryCallback>,
    {
        let callbacks: Vec<DirectoryCallback> = {
            let guard = self.callbacks.read().expect("callback lock poisoned");
            select(&guard).clone()
        };
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(id, descriptor))).is_err() {
                error!(component = %id, "registry callback panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use fabric_primitives::CapabilitySet;

    fn descriptor(id: &str, capability: &str) -> ComponentDescriptor {
        ComponentDescriptor::builder(ComponentId::new(id).unwrap())
            .name(id.to_uppercase())
            .unwrap()
            .version("1.0.0")
            .unwrap()
            .component_type("test")
            .unwrap()
            .capabilities(CapabilitySet::from_names([capability]))
            .build()
            .unwrap()
    }

    fn registry() -> Arc<ServiceRegistry> {
        Arc::new(ServiceRegistry::new(RegistryConfig::default()))
    }

    #[tokio::test]
    async fn register_and_lookup() {
        let registry = registry();
        registry.register(descriptor("athena", "plan")).await.unwrap();

        let found = registry.find_by_capability("plan").await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id().as_str(), "athena");

        assert!(registry.find_by_capability("reason").await.is_empty());
        assert_eq!(registry.find_by_type("test").await.len(), 1);
    }

    #[tokio::test]
    async fn callbacks_fire_once_per_mutation() {
        let registry = registry();
        let registered = Arc::new(AtomicUsize::new(0));
        let unregistered = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&registered);
        registry.on_registered(Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let counter = Arc::clone(&unregistered);
        registry.on_unregistered(Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let id = registry.register(descriptor("athena", "plan")).await.unwrap();
        assert!(registry.unregister(&id).await);
        // Rejected mutation: unknown id fires nothing.
        assert!(!registry.unregister(&id).await);

        assert_eq!(registered.load(Ordering::SeqCst), 1);
        assert_eq!(unregistered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sweep_marks_offline_exactly_once() {
        let config = RegistryConfig::new(Duration::from_millis(10), 3);
        let registry = Arc::new(ServiceRegistry::new(config));
        let updates = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&updates);
        registry.on_updated(Arc::new(move |_, descriptor| {
            if descriptor.availability().status == AvailabilityStatus::Offline {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let id = registry.register(descriptor("athena", "plan")).await.unwrap();

        // Within the window nothing happens.
        registry.sweep_once().await;
        assert_eq!(updates.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(40)).await;
        registry.sweep_once().await;
        registry.sweep_once().await;
        registry.sweep_once().await;

        assert_eq!(updates.load(Ordering::SeqCst), 1);
        let descriptor = registry.get(&id).await.unwrap();
        assert_eq!(descriptor.availability().status, AvailabilityStatus::Offline);
        // Offline components are retained until explicit unregister.
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn heartbeat_recovers_offline_component() {
        let config = RegistryConfig::new(Duration::from_millis(10), 3);
        let registry = Arc::new(ServiceRegistry::new(config));
        let id = registry.register(descriptor("athena", "plan")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        registry.sweep_once().await;
        assert_eq!(
            registry.get(&id).await.unwrap().availability().status,
            AvailabilityStatus::Offline
        );

        assert!(registry.update_status(&id, None).await);
        assert_eq!(
            registry.get(&id).await.unwrap().availability().status,
            AvailabilityStatus::Available
        );
    }

    #[tokio::test]
    async fn panicking_callback_is_isolated() {
        let registry = registry();
        registry.on_registered(Arc::new(|_, _| panic!("callback exploded")));

        let after = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&after);
        registry.on_registered(Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        registry.register(descriptor("athena", "plan")).await.unwrap();
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }
}
