//! HTTP client for a remote Hermes registration endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Client, Method, Request};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use serde_json::{Value, json};
use tracing::debug;
use webpki_roots::TLS_SERVER_ROOTS;

use fabric_primitives::{ComponentDescriptor, ComponentId};
use fabric_registry::{RegistrationTransport, RegistryError, RegistryResult};

type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

fn build_https_client() -> HyperClient {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));
    Client::builder().build::<_, Body>(connector)
}

/// Talks to the registration API exposed by a Hermes gateway.
pub struct HermesClient {
    base_url: String,
    client: HyperClient,
}

impl HermesClient {
    /// Creates a client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: build_https_client(),
        }
    }

    async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> RegistryResult<Value> {
        let uri = format!("{}{path}", self.base_url);
        debug!(%method, %uri, "hermes request");

        let mut builder = Request::builder().method(method).uri(&uri);
        let request = match body {
            Some(body) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                builder.body(Body::from(body.to_string()))
            }
            None => builder.body(Body::empty()),
        }
        .map_err(|err| RegistryError::transport(err.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|err| RegistryError::transport(err.to_string()))?;

        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|err| RegistryError::transport(err.to_string()))?;
        let payload: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .map_err(|err| RegistryError::transport(format!("bad response body: {err}")))?
        };

        if !status.is_success() {
            return Err(RegistryError::transport(format!(
                "{uri} returned {status}: {payload}"
            )));
        }
        Ok(payload)
    }

    fn expect_success(payload: &Value) -> RegistryResult<()> {
        if payload.get("success").and_then(Value::as_bool) == Some(false) {
            let reason = payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("request rejected");
            return Err(RegistryError::transport(reason.to_string()));
        }
        Ok(())
    }

    /// Fetches the registration status of one component.
    pub async fn status(&self, component: &str) -> RegistryResult<Value> {
        self.request_json(Method::GET, &format!("/api/registration/{component}"), None)
            .await
    }

    /// Fetches every registered component.
    pub async fn list(&self) -> RegistryResult<Value> {
        self.request_json(Method::GET, "/api/components", None).await
    }
}

#[async_trait]
impl RegistrationTransport for HermesClient {
    async fn register(&self, descriptor: &ComponentDescriptor) -> RegistryResult<String> {
        let body = json!({
            "component_id": descriptor.id(),
            "name": descriptor.name(),
            "version": descriptor.version(),
            "type": descriptor.component_type(),
            "endpoint": descriptor.endpoint(),
            "capabilities": descriptor.capabilities().spec(),
            "metadata": descriptor.metadata(),
        });
        let payload = self
            .request_json(Method::POST, "/api/register", Some(body))
            .await?;
        Self::expect_success(&payload)?;

        payload
            .get("token")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| RegistryError::transport("registration response carried no token"))
    }

    async fn heartbeat(&self, id: &ComponentId, token: &str) -> RegistryResult<()> {
        let body = json!({"component_id": id, "token": token});
        let payload = self
            .request_json(Method::POST, "/api/heartbeat", Some(body))
            .await?;
        Self::expect_success(&payload)
    }

    async fn unregister(&self, id: &ComponentId, token: &str) -> RegistryResult<()> {
        let body = json!({"component_id": id, "token": token});
        let payload = self
            .request_json(Method::POST, "/api/unregister", Some(body))
            .await?;
        Self::expect_success(&payload)
    }
}
