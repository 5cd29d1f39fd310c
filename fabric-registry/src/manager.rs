//! Unified Registration Protocol manager.
//!
//! The identity gate for the fabric: every component registers here before
//! interacting with the rest of the platform, and every privileged action
//! carries the token minted at registration. The directory is the source
//! of truth; bus events are advisory and never roll back state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use fabric_bus::{Headers, MessageBus, SubscriptionId, handler, topics};
use fabric_primitives::{
    Availability, CapabilitySet, ComponentDescriptor, ComponentId, TokenId,
};

use crate::directory::ServiceRegistry;
use crate::token::{SignedToken, TokenClaims, TokenSigner};
use crate::{RegistryError, RegistryResult};

/// Configuration for token issuance.
#[derive(Clone)]
pub struct RegistrationConfig {
    secret: Vec<u8>,
    token_ttl: Duration,
}

impl std::fmt::Debug for RegistrationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationConfig")
            .field("secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

impl RegistrationConfig {
    /// Creates a configuration with the default one-hour token lifetime.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            token_ttl: Duration::from_secs(3600),
        }
    }

    /// Overrides the token lifetime.
    #[must_use]
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Returns the token lifetime.
    #[must_use]
    pub const fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] when the secret is empty or
    /// the lifetime is zero.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.secret.is_empty() {
            return Err(RegistryError::InvalidConfig(
                "shared secret must not be empty",
            ));
        }
        if self.token_ttl.is_zero() {
            return Err(RegistryError::InvalidConfig(
                "token lifetime must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Central manager for component registration.
pub struct RegistrationManager {
    registry: Arc<ServiceRegistry>,
    bus: Arc<dyn MessageBus>,
    signer: TokenSigner,
    active: Mutex<HashMap<TokenId, ComponentId>>,
}

impl RegistrationManager {
    /// Creates a registration manager over the given directory and bus.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] when the configuration is
    /// invalid.
    pub fn new(
        registry: Arc<ServiceRegistry>,
        bus: Arc<dyn MessageBus>,
        config: RegistrationConfig,
    ) -> RegistryResult<Self> {
        config.validate()?;
        let signer = TokenSigner::new(config.secret.clone(), config.token_ttl);
        info!("registration manager initialized");
        Ok(Self {
            registry,
            bus,
            signer,
            active: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the backing directory.
    #[must_use]
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Registers a component and mints its token.
    ///
    /// A live id may only be re-registered when `presented` carries a token
    /// that still authorizes the component; re-registration retires every
    /// previously issued token. The event is published only after the
    /// directory insertion succeeds; a publish failure is logged and
    /// swallowed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyExists`] for unauthorized
    /// re-registration and [`RegistryError::Unavailable`] when the
    /// directory refuses the insertion.
    pub async fn register(
        &self,
        descriptor: ComponentDescriptor,
        presented: Option<&str>,
    ) -> RegistryResult<SignedToken> {
        let id = descriptor.id().clone();

        if self.registry.get(&id).await.is_some() {
            let authorized = match presented {
                Some(token) => self.validate(&id, token).await,
                None => false,
            };
            if !authorized {
                return Err(RegistryError::AlreadyExists { id });
            }
        }

        let name = descriptor.name().to_string();
        let component_type = descriptor.component_type().to_string();
        let version = descriptor.version().to_string();
        let capabilities = descriptor.capabilities().spec().clone();

        self.registry.register(descriptor).await?;

        let token = self.signer.mint(&id)?;
        {
            let mut active = self.active.lock().await;
            active.retain(|_, component| component != &id);
            active.insert(token.payload.token_id, id.clone());
        }

        self.publish_advisory(
            topics::REGISTRATION_COMPLETED,
            json!({
                "component_id": id,
                "name": name,
                "type": component_type,
                "version": version,
                "capabilities": capabilities,
                "registered_at": Utc::now(),
            }),
            &id,
            "component_registration",
        )
        .await;

        info!(component = %id, "component registration completed");
        Ok(token)
    }

    /// Removes a registration after verifying the presented token.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unauthenticated`] when the token is
    /// invalid and [`RegistryError::NotFound`] when the id is absent.
    pub async fn unregister(&self, id: &ComponentId, token: &str) -> RegistryResult<()> {
        self.verify_for(id, token).await?;

        if !self.registry.unregister(id).await {
            return Err(RegistryError::NotFound { id: id.clone() });
        }

        self.active.lock().await.retain(|_, component| component != id);

        self.publish_advisory(
            topics::REGISTRATION_REVOKED,
            json!({
                "component_id": id,
                "revoked_at": Utc::now(),
            }),
            id,
            "component_unregistration",
        )
        .await;

        info!(component = %id, "component unregistered");
        Ok(())
    }

    /// Verifies a registration without side effects.
    pub async fn validate(&self, id: &ComponentId, token: &str) -> bool {
        if self.verify_for(id, token).await.is_err() {
            return false;
        }
        self.registry.get(id).await.is_some()
    }

    /// Records a heartbeat for a registered component.
    ///
    /// Duplicates are idempotent; each accepted heartbeat touches
    /// `last_seen` and republishes the event.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unauthenticated`] on token failure and
    /// [`RegistryError::NotFound`] when the id is absent.
    pub async fn heartbeat(
        &self,
        id: &ComponentId,
        token: &str,
        availability: Option<Availability>,
    ) -> RegistryResult<()> {
        self.verify_for(id, token).await?;

        if !self.registry.update_status(id, availability).await {
            return Err(RegistryError::NotFound { id: id.clone() });
        }

        self.publish_advisory(
            topics::REGISTRATION_HEARTBEAT,
            json!({
                "component_id": id,
                "timestamp": Utc::now(),
                "status": availability,
            }),
            id,
            "component_heartbeat",
        )
        .await;

        debug!(component = %id, "heartbeat accepted");
        Ok(())
    }

    /// Subscribes the manager to registration topics on the bus so that
    /// remote components can register without a direct handle.
    ///
    /// Handled topics: `tekton.registration.request`,
    /// `tekton.registration.revoke`, and `tekton.registration.heartbeat`
    /// (token-bearing messages only); responses go out on
    /// `tekton.registration.response.<id>`.
    ///
    /// # Errors
    ///
    /// Propagates subscription failures from the bus.
    pub async fn attach_bus_handlers(
        self: &Arc<Self>,
    ) -> fabric_bus::BusResult<Vec<SubscriptionId>> {
        let mut subscriptions = Vec::with_capacity(3);

        let manager = Arc::clone(self);
        subscriptions.push(
            self.bus
                .subscribe(
                    topics::REGISTRATION_REQUEST,
                    handler(move |envelope| {
                        let manager = Arc::clone(&manager);
                        async move {
                            manager.handle_registration_request(envelope.payload()).await;
                        }
                    }),
                )
                .await?,
        );

        let manager = Arc::clone(self);
        subscriptions.push(
            self.bus
                .subscribe(
                    topics::REGISTRATION_REVOKE,
                    handler(move |envelope| {
                        let manager = Arc::clone(&manager);
                        async move {
                            manager.handle_revocation_request(envelope.payload()).await;
                        }
                    }),
                )
                .await?,
        );

        let manager = Arc::clone(self);
        subscriptions.push(
            self.bus
                .subscribe(
                    topics::REGISTRATION_HEARTBEAT,
                    handler(move |envelope| {
                        let manager = Arc::clone(&manager);
                        async move {
                            manager.handle_heartbeat_request(envelope.payload()).await;
                        }
                    }),
                )
                .await?,
        );

        info!("registration event subscriptions established");
        Ok(subscriptions)
    }

    async fn handle_registration_request(&self, payload: &Value) {
        let descriptor = match descriptor_from_request(payload) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                warn!(%err, "rejected malformed registration request");
                return;
            }
        };
        let id = descriptor.id().clone();
        let token = payload.get("token").and_then(Value::as_str);

        let response = match self.register(descriptor, token).await {
            Ok(token) => match token.encode() {
                Ok(encoded) => json!({"success": true, "token": encoded}),
                Err(err) => json!({"success": false, "error": err.to_string()}),
            },
            Err(err) => json!({"success": false, "error": err.to_string()}),
        };

        self.publish_advisory(
            &topics::registration_response(&id),
            response,
            &id,
            "registration_response",
        )
        .await;
    }

    async fn handle_revocation_request(&self, payload: &Value) {
        let Some((id, token)) = id_and_token(payload) else {
            warn!("rejected malformed revocation request");
            return;
        };

        let response = match self.unregister(&id, &token).await {
            Ok(()) => json!({"success": true}),
            Err(err) => json!({"success": false, "error": err.to_string()}),
        };

        self.publish_advisory(
            &topics::registration_response(&id),
            response,
            &id,
            "registration_response",
        )
        .await;
    }

    async fn handle_heartbeat_request(&self, payload: &Value) {
        // Advisory heartbeat events republished by this manager carry no
        // token; only token-bearing messages from components are handled.
        let Some((id, token)) = id_and_token(payload) else {
            return;
        };
        let availability = payload
            .get("status")
            .and_then(|status| serde_json::from_value(status.clone()).ok());

        if let Err(err) = self.heartbeat(&id, &token, availability).await {
            warn!(component = %id, %err, "bus heartbeat rejected");
        }
    }

    async fn verify_for(&self, id: &ComponentId, token: &str) -> RegistryResult<TokenClaims> {
        let claims = self.signer.verify(token)?;
        if &claims.component_id != id {
            return Err(RegistryError::unauthenticated(
                "token is not bound to this component",
            ));
        }
        if !self.active.lock().await.contains_key(&claims.token_id) {
            return Err(RegistryError::unauthenticated("token has been retired"));
        }
        Ok(claims)
    }

    async fn publish_advisory(
        &self,
        topic: &str,
        payload: Value,
        component: &ComponentId,
        event_type: &str,
    ) {
        let mut headers = Headers::new();
        headers.insert("event_type".into(), event_type.into());
        headers.insert("component_id".into(), component.to_string());
        if let Err(err) = self.bus.publish(topic, payload, headers).await {
            warn!(topic, %err, "event publish failed; registry state is unaffected");
        }
    }
}

fn id_and_token(payload: &Value) -> Option<(ComponentId, String)> {
    let id = payload
        .get("component_id")
        .and_then(Value::as_str)
        .and_then(|raw| ComponentId::new(raw).ok())?;
    let token = payload.get("token").and_then(Value::as_str)?;
    Some((id, token.to_string()))
}

fn descriptor_from_request(payload: &Value) -> RegistryResult<ComponentDescriptor> {
    let id = match payload.get("component_id").and_then(Value::as_str) {
        Some(raw) => ComponentId::new(raw)?,
        None => ComponentId::generate(),
    };

    let missing = |field: &str| {
        RegistryError::InvalidInput(fabric_primitives::Error::InvalidDescriptor {
            reason: format!("registration request is missing `{field}`"),
        })
    };

    let name = payload
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| missing("name"))?;
    let version = payload
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| missing("version"))?;
    let component_type = payload
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| missing("type"))?;

    let capabilities = match payload.get("capabilities") {
        Some(spec) => CapabilitySet::from_spec(serde_json::from_value(spec.clone())?),
        None => CapabilitySet::default(),
    };

    let mut builder = ComponentDescriptor::builder(id)
        .name(name)?
        .version(version)?
        .component_type(component_type)?
        .capabilities(capabilities);

    if let Some(endpoint) = payload.get("endpoint").and_then(Value::as_str) {
        builder = builder.endpoint(endpoint);
    }
    if let Some(Value::Object(metadata)) = payload.get("metadata") {
        builder = builder.merge_metadata(metadata.clone());
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::RegistryConfig;

    use fabric_bus::InMemoryBus;
    use std::sync::Mutex as StdMutex;

    fn descriptor(id: &str) -> ComponentDescriptor {
        ComponentDescriptor::builder(ComponentId::new(id).unwrap())
            .name(id.to_uppercase())
            .unwrap()
            .version("1.0.0")
            .unwrap()
            .component_type("test")
            .unwrap()
            .capabilities(CapabilitySet::from_names(["plan"]))
            .build()
            .unwrap()
    }

    fn manager_with_bus() -> (Arc<RegistrationManager>, Arc<InMemoryBus>) {
        let registry = Arc::new(ServiceRegistry::new(RegistryConfig::default()));
        let bus = Arc::new(InMemoryBus::new());
        let manager = RegistrationManager::new(
            registry,
            bus.clone(),
            RegistrationConfig::new(b"unit-test-secret".to_vec()),
        )
        .unwrap();
        (Arc::new(manager), bus)
    }

    #[tokio::test]
    async fn register_mints_valid_token_and_publishes() {
        let (manager, bus) = manager_with_bus();
        let completed = Arc::new(StdMutex::new(Vec::new()));

        let sink = Arc::clone(&completed);
        bus.subscribe(
            topics::REGISTRATION_COMPLETED,
            handler(move |envelope| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().unwrap().push(envelope.payload().clone());
                }
            }),
        )
        .await
        .unwrap();

        let id = ComponentId::new("athena").unwrap();
        let token = manager.register(descriptor("athena"), None).await.unwrap();
        let encoded = token.encode().unwrap();

        assert!(manager.validate(&id, &encoded).await);
        let events = completed.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["component_id"], "athena");
    }

    #[tokio::test]
    async fn duplicate_registration_requires_token() {
        let (manager, _bus) = manager_with_bus();
        let token = manager.register(descriptor("athena"), None).await.unwrap();

        let err = manager
            .register(descriptor("athena"), None)
            .await
            .expect_err("re-register without token must fail");
        assert!(matches!(err, RegistryError::AlreadyExists { .. }));

        // A valid token authorizes re-registration and rotates the token.
        let encoded = token.encode().unwrap();
        let second = manager
            .register(descriptor("athena"), Some(&encoded))
            .await
            .unwrap();
        let id = ComponentId::new("athena").unwrap();
        assert!(!manager.validate(&id, &encoded).await);
        assert!(manager.validate(&id, &second.encode().unwrap()).await);
    }

    #[tokio::test]
    async fn unregister_retires_token() {
        let (manager, _bus) = manager_with_bus();
        let id = ComponentId::new("athena").unwrap();
        let token = manager.register(descriptor("athena"), None).await.unwrap();
        let encoded = token.encode().unwrap();

        manager.unregister(&id, &encoded).await.unwrap();
        assert!(!manager.validate(&id, &encoded).await);

        // Register again: the old token stays dead, the new one works.
        let second = manager.register(descriptor("athena"), None).await.unwrap();
        assert!(!manager.validate(&id, &encoded).await);
        assert!(manager.validate(&id, &second.encode().unwrap()).await);
    }

    #[tokio::test]
    async fn unregister_rejects_foreign_token() {
        let (manager, _bus) = manager_with_bus();
        let athena = ComponentId::new("athena").unwrap();
        manager.register(descriptor("athena"), None).await.unwrap();
        let ergon_token = manager
            .register(descriptor("ergon"), None)
            .await
            .unwrap()
            .encode()
            .unwrap();

        let err = manager
            .unregister(&athena, &ergon_token)
            .await
            .expect_err("foreign token must be rejected");
        assert!(matches!(err, RegistryError::Unauthenticated { .. }));
    }

    #[tokio::test]
    async fn heartbeat_touches_last_seen() {
        let (manager, _bus) = manager_with_bus();
        let id = ComponentId::new("athena").unwrap();
        let token = manager
            .register(descriptor("athena"), None)
            .await
            .unwrap()
            .encode()
            .unwrap();

        let before = manager.registry().get(&id).await.unwrap().last_seen();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        manager.heartbeat(&id, &token, None).await.unwrap();
        let after = manager.registry().get(&id).await.unwrap().last_seen();
        assert!(after > before);

        // Heartbeats are idempotent.
        manager.heartbeat(&id, &token, None).await.unwrap();
    }

    #[tokio::test]
    async fn bus_registration_round_trip() {
        let (manager, bus) = manager_with_bus();
        manager.attach_bus_handlers().await.unwrap();

        let responses = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&responses);
        bus.subscribe(
            "tekton.registration.response.#",
            handler(move |envelope| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().unwrap().push(envelope.payload().clone());
                }
            }),
        )
        .await
        .unwrap();

        bus.publish(
            topics::REGISTRATION_REQUEST,
            json!({
                "component_id": "ergon",
                "name": "Ergon",
                "version": "2.0.0",
                "type": "agent",
                "capabilities": ["task.execute"],
            }),
            Headers::new(),
        )
        .await
        .unwrap();

        let responses = responses.lock().unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["success"], true);
        assert!(responses[0]["token"].is_string());
    }
}
