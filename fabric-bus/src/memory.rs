//! In-process reference bus.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::topics::topic_matches;
use crate::{BusEnvelope, BusError, BusHandler, BusResult, Headers, MessageBus, SubscriptionId};

struct Subscription {
    id: SubscriptionId,
    pattern: String,
    handler: BusHandler,
}

/// In-memory [`MessageBus`] delivering to subscribers within the process.
///
/// Handlers for a published message are awaited sequentially, which
/// preserves per-topic ordering from a single publisher. A panicking
/// handler is isolated and logged; it never poisons the publisher.
pub struct InMemoryBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl InMemoryBus {
    /// Creates a bus with no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns the number of active subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_pattern(pattern: &str) -> BusResult<()> {
    if pattern.is_empty() {
        return Err(BusError::InvalidPattern {
            pattern: pattern.into(),
            reason: "pattern cannot be empty",
        });
    }
    if let Some(pos) = pattern.find('#') {
        if pos != pattern.len() - 1 {
            return Err(BusError::InvalidPattern {
                pattern: pattern.into(),
                reason: "wildcard `#` is only allowed as a suffix",
            });
        }
    }
    Ok(())
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, payload: Value, headers: Headers) -> BusResult<()> {
        let matched: Vec<(SubscriptionId, BusHandler)> = {
            let guard = self.subscriptions.read().await;
            guard
                .iter()
                .filter(|sub| topic_matches(&sub.pattern, topic))
                .map(|sub| (sub.id, Arc::clone(&sub.handler)))
                .collect()
        };

        debug!(topic, subscribers = matched.len(), "publishing message");

        let envelope = BusEnvelope::new(topic, payload, headers);
        for (id, handler) in matched {
            let delivery = std::panic::AssertUnwindSafe(handler(envelope.clone()))
                .catch_unwind()
                .await;
            if delivery.is_err() {
                error!(topic, subscription = %id, "bus handler panicked");
            }
        }

        Ok(())
    }

    async fn subscribe(&self, pattern: &str, handler: BusHandler) -> BusResult<SubscriptionId> {
        validate_pattern(pattern)?;
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut guard = self.subscriptions.write().await;
        guard.push(Subscription {
            id,
            pattern: pattern.to_string(),
            handler,
        });
        debug!(pattern, subscription = %id, "subscription added");
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> BusResult<bool> {
        let mut guard = self.subscriptions.write().await;
        let before = guard.len();
        guard.retain(|sub| sub.id != id);
        Ok(guard.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler;
    use std::sync::Mutex;

    use serde_json::json;

    #[tokio::test]
    async fn delivers_to_matching_subscribers() {
        let bus = InMemoryBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.subscribe(
            "tekton.registration.#",
            handler(move |envelope| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().unwrap().push(envelope.topic().to_string());
                }
            }),
        )
        .await
        .unwrap();

        bus.publish(
            "tekton.registration.completed",
            json!({"component_id": "athena"}),
            Headers::new(),
        )
        .await
        .unwrap();
        bus.publish("lifecycle.state.athena", json!({}), Headers::new())
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), ["tekton.registration.completed"]);
    }

    #[tokio::test]
    async fn preserves_publish_order_per_topic() {
        let bus = InMemoryBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.subscribe(
            "events.counter",
            handler(move |envelope| {
                let sink = Arc::clone(&sink);
                async move {
                    let n = envelope.payload()["n"].as_u64().unwrap();
                    sink.lock().unwrap().push(n);
                }
            }),
        )
        .await
        .unwrap();

        for n in 0..8_u64 {
            bus.publish("events.counter", json!({ "n": n }), Headers::new())
                .await
                .unwrap();
        }

        assert_eq!(seen.lock().unwrap().as_slice(), &[0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = InMemoryBus::new();
        let seen = Arc::new(Mutex::new(0_usize));

        let sink = Arc::clone(&seen);
        let id = bus
            .subscribe(
                "events.once",
                handler(move |_| {
                    let sink = Arc::clone(&sink);
                    async move {
                        *sink.lock().unwrap() += 1;
                    }
                }),
            )
            .await
            .unwrap();

        bus.publish("events.once", json!({}), Headers::new())
            .await
            .unwrap();
        assert!(bus.unsubscribe(id).await.unwrap());
        bus.publish("events.once", json!({}), Headers::new())
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), 1);
        assert!(!bus.unsubscribe(id).await.unwrap());
    }

    #[tokio::test]
    async fn rejects_inner_wildcards() {
        let bus = InMemoryBus::new();
        let result = bus
            .subscribe("tekton.#.completed", handler(|_| async {}))
            .await;
        assert!(matches!(result, Err(BusError::InvalidPattern { .. })));
    }

    #[tokio::test]
    async fn panicking_handler_is_isolated() {
        let bus = InMemoryBus::new();
        let seen = Arc::new(Mutex::new(0_usize));

        bus.subscribe(
            "events.blast",
            handler(|_| async {
                panic!("handler blew up");
            }),
        )
        .await
        .unwrap();

        let sink = Arc::clone(&seen);
        bus.subscribe(
            "events.blast",
            handler(move |_| {
                let sink = Arc::clone(&sink);
                async move {
                    *sink.lock().unwrap() += 1;
                }
            }),
        )
        .await
        .unwrap();

        bus.publish("events.blast", json!({}), Headers::new())
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
