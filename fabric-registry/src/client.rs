//! Component-side registration and heartbeat maintenance.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, sleep, timeout};
use tracing::{info, warn};

use fabric_primitives::{ComponentDescriptor, ComponentId};

use crate::{RegistrationManager, RegistryError, RegistryResult};

/// Configuration for registration and heartbeat maintenance.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    heartbeat_interval: Duration,
    initial_retry_delay: Duration,
    max_retry_delay: Duration,
    max_consecutive_failures: NonZeroUsize,
    shutdown_grace: Duration,
}

impl HeartbeatConfig {
    /// Creates a new configuration.
    #[must_use]
    pub fn new(
        heartbeat_interval: Duration,
        initial_retry_delay: Duration,
        max_retry_delay: Duration,
        max_consecutive_failures: NonZeroUsize,
    ) -> Self {
        Self {
            heartbeat_interval,
            initial_retry_delay,
            max_retry_delay,
            max_consecutive_failures,
            shutdown_grace: Duration::from_secs(5),
        }
    }

    /// Returns the heartbeat interval.
    #[must_use]
    pub const fn heartbeat_interval(self) -> Duration {
        self.heartbeat_interval
    }

    /// Returns the initial retry delay.
    #[must_use]
    pub const fn initial_retry_delay(self) -> Duration {
        self.initial_retry_delay
    }

    /// Returns the maximum retry delay.
    #[must_use]
    pub const fn max_retry_delay(self) -> Duration {
        self.max_retry_delay
    }

    /// Returns the limit on consecutive heartbeat failures before the
    /// controller re-registers.
    #[must_use]
    pub const fn max_consecutive_failures(self) -> NonZeroUsize {
        self.max_consecutive_failures
    }

    /// Returns the deadline applied to the best-effort unregister at
    /// shutdown.
    #[must_use]
    pub const fn shutdown_grace(self) -> Duration {
        self.shutdown_grace
    }

    /// Overrides the shutdown deadline.
    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] when any duration is zero
    /// or the retry delay bounds are inconsistent.
    pub fn validate(self) -> RegistryResult<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(RegistryError::InvalidConfig(
                "heartbeat interval must be greater than zero",
            ));
        }
        if self.initial_retry_delay.is_zero() {
            return Err(RegistryError::InvalidConfig(
                "initial retry delay must be greater than zero",
            ));
        }
        if self.max_retry_delay.is_zero() {
            return Err(RegistryError::InvalidConfig(
                "max retry delay must be greater than zero",
            ));
        }
        if self.initial_retry_delay > self.max_retry_delay {
            return Err(RegistryError::InvalidConfig(
                "initial retry delay cannot exceed max retry delay",
            ));
        }
        Ok(())
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            initial_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
            max_consecutive_failures: NonZeroUsize::new(3).expect("non-zero"),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Transport a component uses to reach the registration manager.
///
/// The in-process manager implements this directly; the `tekton-register`
/// CLI provides an HTTP implementation for remote registries.
#[async_trait]
pub trait RegistrationTransport: Send + Sync {
    /// Registers the component, returning the encoded token.
    async fn register(&self, descriptor: &ComponentDescriptor) -> RegistryResult<String>;

    /// Sends a heartbeat under the previously issued token.
    async fn heartbeat(&self, id: &ComponentId, token: &str) -> RegistryResult<()>;

    /// Removes the registration under the previously issued token.
    async fn unregister(&self, id: &ComponentId, token: &str) -> RegistryResult<()>;
}

#[async_trait]
impl RegistrationTransport for RegistrationManager {
    async fn register(&self, descriptor: &ComponentDescriptor) -> RegistryResult<String> {
        let token = RegistrationManager::register(self, descriptor.clone(), None).await?;
        token.encode()
    }

    async fn heartbeat(&self, id: &ComponentId, token: &str) -> RegistryResult<()> {
        RegistrationManager::heartbeat(self, id, token, None).await
    }

    async fn unregister(&self, id: &ComponentId, token: &str) -> RegistryResult<()> {
        RegistrationManager::unregister(self, id, token).await
    }
}

/// Drives a register → heartbeat loop for one component.
///
/// Registration is retried with exponential backoff; once registered, the
/// controller heartbeats at the configured interval and re-registers after
/// too many consecutive failures. [`shutdown`](Self::shutdown) stops the
/// loop and performs a best-effort unregister bounded by the shutdown
/// grace period.
pub struct HeartbeatController {
    transport: Arc<dyn RegistrationTransport>,
    descriptor: Arc<ComponentDescriptor>,
    config: HeartbeatConfig,
    shutdown: Arc<AtomicBool>,
    token: Arc<RwLock<Option<String>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatController {
    /// Creates a controller for the given component descriptor.
    #[must_use]
    pub fn new(
        transport: Arc<dyn RegistrationTransport>,
        descriptor: ComponentDescriptor,
        config: HeartbeatConfig,
    ) -> Self {
        Self {
            transport,
            descriptor: Arc::new(descriptor),
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            token: Arc::new(RwLock::new(None)),
            worker: Mutex::new(None),
        }
    }

    /// Returns the most recently issued token, if any.
    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    /// Starts the registration loop.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] when the configuration is
    /// invalid.
    pub async fn start(&self) -> RegistryResult<()> {
        self.config.validate()?;
        let mut slot = self.worker.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        self.shutdown.store(false, Ordering::Release);
        let transport = Arc::clone(&self.transport);
        let descriptor = Arc::clone(&self.descriptor);
        let shutdown = Arc::clone(&self.shutdown);
        let token = Arc::clone(&self.token);
        let config = self.config;

        *slot = Some(tokio::spawn(async move {
            run_registration_loop(transport, descriptor, shutdown, token, config).await;
        }));
        Ok(())
    }

    /// Stops the loop and performs a best-effort unregister.
    ///
    /// The unregister call is bounded by the configured shutdown grace; if
    /// it fails, the registry's liveness sweep will mark the component
    /// offline on its own.
    pub async fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.worker.lock().await.take() {
            handle.abort();
        }

        let token = self.token.write().await.take();
        if let Some(token) = token {
            let id = self.descriptor.id();
            let attempt = timeout(
                self.config.shutdown_grace(),
                self.transport.unregister(id, &token),
            )
            .await;
            match attempt {
                Ok(Ok(())) => info!(component = %id, "component unregistered at shutdown"),
                Ok(Err(err)) => {
                    warn!(component = %id, %err, "unregister failed; registry sweep will flag us offline");
                }
                Err(_) => {
                    warn!(component = %id, "unregister timed out; registry sweep will flag us offline");
                }
            }
        }
    }
}

async fn run_registration_loop(
    transport: Arc<dyn RegistrationTransport>,
    descriptor: Arc<ComponentDescriptor>,
    shutdown: Arc<AtomicBool>,
    token: Arc<RwLock<Option<String>>>,
    config: HeartbeatConfig,
) {
    let mut retry_delay = config.initial_retry_delay();

    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        match transport.register(&descriptor).await {
            Ok(issued) => {
                info!(component = %descriptor.id(), "component registered");
                retry_delay = config.initial_retry_delay();
                *token.write().await = Some(issued.clone());
                if run_heartbeat_loop(
                    Arc::clone(&transport),
                    Arc::clone(&descriptor),
                    Arc::clone(&shutdown),
                    issued,
                    config,
                )
                .await
                {
                    break;
                }
                // Heartbeat failure threshold reached: fall through to
                // re-registration.
            }
            Err(err) => {
                warn!(component = %descriptor.id(), %err, "registration failed; retrying");
                sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(config.max_retry_delay());
            }
        }
    }
}

/// Returns `true` when the loop exited because of shutdown, `false` when
/// re-registration is required.
async fn run_heartbeat_loop(
    transport: Arc<dyn RegistrationTransport>,
    descriptor: Arc<ComponentDescriptor>,
    shutdown: Arc<AtomicBool>,
    token: String,
    config: HeartbeatConfig,
) -> bool {
    let mut failures: usize = 0;
    let mut ticker = tokio::time::interval(config.heartbeat_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !shutdown.load(Ordering::Acquire) {
        ticker.tick().await;
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        match transport.heartbeat(descriptor.id(), &token).await {
            Ok(()) => {
                failures = 0;
            }
            Err(err) => {
                failures += 1;
                warn!(component = %descriptor.id(), %err, failures, "heartbeat failure");
                if failures >= config.max_consecutive_failures().get() {
                    warn!(
                        component = %descriptor.id(),
                        failures,
                        "heartbeat failure threshold reached; re-registering"
                    );
                    return false;
                }
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use fabric_primitives::CapabilitySet;

    struct MockTransport {
        registers: AtomicUsize,
        heartbeats: AtomicUsize,
        unregisters: AtomicUsize,
        fail_heartbeats: AtomicBool,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                registers: AtomicUsize::new(0),
                heartbeats: AtomicUsize::new(0),
                unregisters: AtomicUsize::new(0),
                fail_heartbeats: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl RegistrationTransport for MockTransport {
        async fn register(&self, _descriptor: &ComponentDescriptor) -> RegistryResult<String> {
            self.registers.fetch_add(1, Ordering::SeqCst);
            Ok("mock-token".to_string())
        }

        async fn heartbeat(&self, _id: &ComponentId, _token: &str) -> RegistryResult<()> {
            self.heartbeats.fetch_add(1, Ordering::SeqCst);
            if self.fail_heartbeats.load(Ordering::SeqCst) {
                Err(RegistryError::transport("injected failure"))
            } else {
                Ok(())
            }
        }

        async fn unregister(&self, _id: &ComponentId, _token: &str) -> RegistryResult<()> {
            self.unregisters.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::builder(ComponentId::new("athena").unwrap())
            .name("Athena")
            .unwrap()
            .version("1.0.0")
            .unwrap()
            .component_type("test")
            .unwrap()
            .capabilities(CapabilitySet::from_names(["plan"]))
            .build()
            .unwrap()
    }

    fn config() -> HeartbeatConfig {
        HeartbeatConfig::new(
            Duration::from_millis(10),
            Duration::from_millis(5),
            Duration::from_millis(20),
            NonZeroUsize::new(3).unwrap(),
        )
        .with_shutdown_grace(Duration::from_millis(100))
    }

    #[tokio::test]
    async fn registers_heartbeats_and_unregisters() {
        let transport = Arc::new(MockTransport::new());
        let controller = HeartbeatController::new(transport.clone(), descriptor(), config());

        controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(transport.registers.load(Ordering::SeqCst), 1);
        assert!(transport.heartbeats.load(Ordering::SeqCst) >= 1);
        assert_eq!(controller.token().await.as_deref(), Some("mock-token"));

        controller.shutdown().await;
        assert_eq!(transport.unregisters.load(Ordering::SeqCst), 1);
        assert!(controller.token().await.is_none());
    }

    #[tokio::test]
    async fn reregisters_after_heartbeat_failures() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_heartbeats.store(true, Ordering::SeqCst);
        let controller = HeartbeatController::new(transport.clone(), descriptor(), config());

        controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(transport.registers.load(Ordering::SeqCst) >= 2);
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let transport = Arc::new(MockTransport::new());
        let bad = HeartbeatConfig::new(
            Duration::ZERO,
            Duration::from_millis(5),
            Duration::from_millis(20),
            NonZeroUsize::new(3).unwrap(),
        );
        let controller = HeartbeatController::new(transport, descriptor(), bad);
        assert!(matches!(
            controller.start().await,
            Err(RegistryError::InvalidConfig(_))
        ));
    }
}
