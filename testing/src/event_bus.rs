//! In-memory event bus.
//!
//! Every named subscription gets its own queue; `publish` fans the message out
//! to all of them. A worker per subscription hands deliveries out one at a time
//! and redelivers on `Retry`, exactly like the broker adapter.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use agora_core::event_bus::{
    DeliveryReport, DeliveryStream, Envelope, EventBus, EventBusError, MessageId,
    RedeliveryPolicy, deliver_with_redelivery,
};
use agora_core::events::PostEvent;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// A message accepted by [`InMemoryEventBus::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Routing key
    pub routing_key: String,
    /// Raw payload
    pub payload: Vec<u8>,
    /// Assigned id
    pub message_id: MessageId,
}

#[derive(Default)]
struct Inner {
    subscriptions: Mutex<HashMap<String, mpsc::UnboundedSender<Envelope>>>,
    published: Mutex<Vec<PublishedMessage>>,
    exhausted: Mutex<Vec<Envelope>>,
    fail_publish: AtomicBool,
    next_offset: AtomicU64,
}

/// In-memory [`EventBus`] for tests.
#[derive(Clone)]
pub struct InMemoryEventBus {
    inner: Arc<Inner>,
    policy: RedeliveryPolicy,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    /// Bus with three attempts per message and no backoff.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(RedeliveryPolicy {
            max_attempts: 3,
            backoff: Duration::ZERO,
        })
    }

    /// Bus with a custom redelivery policy.
    #[must_use]
    pub fn with_policy(policy: RedeliveryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            policy,
        }
    }

    /// Make subsequent publishes fail (simulates a broker outage).
    pub fn set_publish_failing(&self, failing: bool) {
        self.inner.fail_publish.store(failing, Ordering::SeqCst);
    }

    /// Every message accepted so far, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.inner.published.lock().unwrap().clone()
    }

    /// Accepted messages decoded as lifecycle events; undecodable ones are skipped.
    #[must_use]
    pub fn published_events(&self) -> Vec<PostEvent> {
        self.published()
            .iter()
            .filter_map(|m| PostEvent::decode(&m.routing_key, &m.payload).ok())
            .collect()
    }

    /// Messages a subscriber gave up on after exhausting the redelivery policy.
    #[must_use]
    pub fn exhausted(&self) -> Vec<Envelope> {
        self.inner.exhausted.lock().unwrap().clone()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        routing_key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<MessageId, EventBusError>> + Send + '_>> {
        let routing_key = routing_key.to_string();
        let payload = payload.to_vec();

        Box::pin(async move {
            if self.inner.fail_publish.load(Ordering::SeqCst) {
                return Err(EventBusError::PublishFailed {
                    routing_key,
                    reason: "broker unavailable".to_string(),
                });
            }

            let offset = self.inner.next_offset.fetch_add(1, Ordering::SeqCst);
            let message_id = MessageId::new(format!("memory/0/{offset}"));

            self.inner.published.lock().unwrap().push(PublishedMessage {
                routing_key: routing_key.clone(),
                payload: payload.clone(),
                message_id: message_id.clone(),
            });

            let subscriptions = self.inner.subscriptions.lock().unwrap();
            for queue in subscriptions.values() {
                let _ = queue.send(Envelope {
                    routing_key: routing_key.clone(),
                    payload: payload.clone(),
                    message_id: message_id.clone(),
                    attempt: 1,
                });
            }

            Ok(message_id)
        })
    }

    fn subscribe(
        &self,
        subscription: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>> {
        let subscription = subscription.to_string();

        Box::pin(async move {
            let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<Envelope>();
            {
                let mut subscriptions = self.inner.subscriptions.lock().unwrap();
                if subscriptions.contains_key(&subscription) {
                    return Err(EventBusError::SubscriptionFailed {
                        subscription,
                        reason: "subscription already has an active consumer".to_string(),
                    });
                }
                subscriptions.insert(subscription.clone(), queue_tx);
            }

            let (tx, rx) = mpsc::channel(1);
            let inner = Arc::clone(&self.inner);
            let policy = self.policy;

            tokio::spawn(async move {
                while let Some(envelope) = queue_rx.recv().await {
                    match deliver_with_redelivery(envelope.clone(), &tx, policy).await {
                        DeliveryReport::Acknowledged { .. } => {}
                        DeliveryReport::Exhausted { .. } => {
                            inner.exhausted.lock().unwrap().push(envelope);
                        }
                        DeliveryReport::Abandoned => break,
                    }
                }
                inner.subscriptions.lock().unwrap().remove(&subscription);
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::event_bus::HandlerOutcome;
    use futures::StreamExt;

    #[tokio::test]
    async fn every_subscription_sees_every_message() {
        let bus = InMemoryEventBus::new();
        let mut search = bus.subscribe("search-service").await.unwrap();
        let mut media = bus.subscribe("media-service").await.unwrap();

        bus.publish("post.deleted", b"{}").await.unwrap();

        for stream in [&mut search, &mut media] {
            let delivery = stream.next().await.unwrap().unwrap();
            assert_eq!(delivery.envelope().routing_key, "post.deleted");
            delivery.settle(HandlerOutcome::Ack);
        }
    }

    #[tokio::test]
    async fn retried_message_comes_back_with_next_attempt() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe("search-service").await.unwrap();
        bus.publish("post.created", b"{}").await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        let id = first.envelope().message_id.clone();
        first.settle(HandlerOutcome::Retry {
            reason: "boom".to_string(),
        });

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.envelope().message_id, id);
        assert_eq!(second.envelope().attempt, 2);
        second.settle(HandlerOutcome::Ack);
    }

    #[tokio::test]
    async fn exhausted_messages_are_recorded_and_skipped() {
        let bus = InMemoryEventBus::with_policy(RedeliveryPolicy {
            max_attempts: 1,
            backoff: Duration::ZERO,
        });
        let mut stream = bus.subscribe("search-service").await.unwrap();
        bus.publish("post.created", b"poison").await.unwrap();
        bus.publish("post.created", b"{}").await.unwrap();

        let poison = stream.next().await.unwrap().unwrap();
        poison.settle(HandlerOutcome::Retry {
            reason: "cannot parse".to_string(),
        });

        let next = stream.next().await.unwrap().unwrap();
        assert_eq!(next.envelope().payload, b"{}".to_vec());
        next.settle(HandlerOutcome::Ack);

        assert_eq!(bus.exhausted().len(), 1);
        assert_eq!(bus.exhausted()[0].payload, b"poison".to_vec());
    }

    #[tokio::test]
    async fn failing_publish_is_reported() {
        let bus = InMemoryEventBus::new();
        bus.set_publish_failing(true);

        let result = bus.publish("post.created", b"{}").await;
        assert!(matches!(result, Err(EventBusError::PublishFailed { .. })));
        assert!(bus.published().is_empty());
    }
}
