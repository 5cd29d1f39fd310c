//! Topic-based publish/subscribe contract for the Tekton service fabric.
//!
//! The fabric depends on the bus as an abstraction only: registration,
//! heartbeat, lifecycle, and deadlock events are all broadcast through
//! [`MessageBus`]. [`InMemoryBus`] is the reference implementation used by
//! the runtime context and the test suites; gateway processes substitute
//! their own transport behind the same trait.

#![warn(missing_docs, clippy::pedantic)]

mod memory;
pub mod topics;

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use memory::InMemoryBus;

/// Header map attached to every published message.
pub type Headers = BTreeMap<String, String>;

/// A message delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEnvelope {
    topic: String,
    payload: Value,
    #[serde(default)]
    headers: Headers,
    published_at: DateTime<Utc>,
}

impl BusEnvelope {
    /// Creates an envelope stamped with the current time.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: Value, headers: Headers) -> Self {
        Self {
            topic: topic.into(),
            payload,
            headers,
            published_at: Utc::now(),
        }
    }

    /// Returns the concrete topic the message was published on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the message payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the attached headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the publish timestamp.
    #[must_use]
    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }
}

/// Handle identifying an active subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Callback invoked for every delivered message.
pub type BusHandler = Arc<dyn Fn(BusEnvelope) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wraps an async closure into a [`BusHandler`].
pub fn handler<F, Fut>(f: F) -> BusHandler
where
    F: Fn(BusEnvelope) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Arc::new(move |envelope| Box::pin(f(envelope)))
}

/// Result alias for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Errors surfaced by bus implementations.
#[derive(Debug, Error)]
pub enum BusError {
    /// Subscription pattern failed validation.
    #[error("invalid topic pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// Transport-level delivery failure.
    #[error("bus delivery failed: {reason}")]
    Delivery {
        /// Human-readable context from the transport.
        reason: String,
    },
}

impl BusError {
    /// Convenience constructor for delivery failures.
    #[must_use]
    pub fn delivery(reason: impl Into<String>) -> Self {
        Self::Delivery {
            reason: reason.into(),
        }
    }
}

/// Topic-based publish/subscribe transport.
///
/// Delivery is at-least-once; consumers must be idempotent. Ordering is
/// preserved per topic per publisher but not across topics.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes a message to all subscribers whose pattern matches `topic`.
    async fn publish(&self, topic: &str, payload: Value, headers: Headers) -> BusResult<()>;

    /// Subscribes a handler to a topic pattern (`#` suffix is a wildcard).
    async fn subscribe(&self, pattern: &str, handler: BusHandler) -> BusResult<SubscriptionId>;

    /// Removes a subscription; returns `false` when the id is unknown.
    async fn unsubscribe(&self, id: SubscriptionId) -> BusResult<bool>;
}
