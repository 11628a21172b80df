//! Event bus abstraction for cross-service communication.
//!
//! Services publish lifecycle events to a single topic with the routing key as
//! message metadata. Each consuming service reads the topic through its own
//! named subscription and settles every delivery explicitly.
//!
//! # Delivery protocol
//!
//! ```text
//! broker ──► Delivery ──► handler ──► settle(Ack | Retry)
//!               ▲                          │
//!               └──── redeliver (attempt+1)┘  while attempt < max_attempts
//! ```
//!
//! - **At-least-once**: a delivery that is not acknowledged is delivered again
//! - **Idempotency**: subscribers must tolerate duplicates
//! - **No ordering**: nothing orders deliveries across messages
//! - A delivery dropped without being settled counts as `Retry`
//! - Once a message exhausts its [`RedeliveryPolicy`] the adapter logs it and
//!   acknowledges it so the subscription keeps moving
//!
//! # Implementations
//!
//! - `InMemoryEventBus` (agora-testing) - for tests
//! - `RedpandaEventBus` (agora-redpanda) - for production (Kafka-compatible)

use crate::events::{EventError, PostEvent};
use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the broker
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message
    #[error("Publish failed for routing key '{routing_key}': {reason}")]
    PublishFailed {
        /// Routing key of the message that failed
        routing_key: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to open a subscription
    #[error("Subscription '{subscription}' failed: {reason}")]
    SubscriptionFailed {
        /// Subscription name
        subscription: String,
        /// The reason for failure
        reason: String,
    },

    /// The event was rejected before reaching the broker
    #[error("Invalid event: {0}")]
    InvalidEvent(#[from] EventError),

    /// Transport error while consuming
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Opaque identifier the broker assigned to a published message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    /// Wrap a broker-specific identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message as received from a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Routing key attribute
    pub routing_key: String,
    /// Raw payload body
    pub payload: Vec<u8>,
    /// Broker-assigned id
    pub message_id: MessageId,
    /// 1 for the first delivery, incremented on each redelivery
    pub attempt: u32,
}

/// Result a subscriber hands back for one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Processing finished; the message must not be delivered again
    Ack,
    /// Processing failed transiently; deliver the message again
    Retry {
        /// Logged by the adapter
        reason: String,
    },
}

/// One in-flight delivery awaiting settlement.
#[derive(Debug)]
pub struct Delivery {
    envelope: Envelope,
    settle_tx: oneshot::Sender<HandlerOutcome>,
}

/// The adapter's side of a [`Delivery`].
#[derive(Debug)]
pub struct Settlement(oneshot::Receiver<HandlerOutcome>);

impl Delivery {
    /// Pair an envelope with its settlement channel.
    #[must_use]
    pub fn new(envelope: Envelope) -> (Self, Settlement) {
        let (settle_tx, settle_rx) = oneshot::channel();
        (
            Self {
                envelope,
                settle_tx,
            },
            Settlement(settle_rx),
        )
    }

    /// Inspect the message.
    #[must_use]
    pub const fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Settle the delivery, consuming it.
    pub fn settle(self, outcome: HandlerOutcome) {
        // The adapter may already be gone during shutdown; the broker then redelivers.
        let _ = self.settle_tx.send(outcome);
    }
}

impl Settlement {
    /// Wait for the subscriber's verdict. A dropped delivery means `Retry`.
    pub async fn outcome(self) -> HandlerOutcome {
        self.0.await.unwrap_or_else(|_| HandlerOutcome::Retry {
            reason: "delivery dropped before settlement".to_string(),
        })
    }
}

/// How often a message is retried before the adapter gives up on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    /// Total deliveries allowed, including the first
    pub max_attempts: u32,
    /// Pause before each redelivery
    pub backoff: Duration,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(1),
        }
    }
}

/// What finally happened to a message handed to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReport {
    /// The subscriber acknowledged it on attempt `attempts`
    Acknowledged {
        /// Attempts used
        attempts: u32,
    },
    /// Every attempt asked for a retry
    Exhausted {
        /// Attempts used
        attempts: u32,
        /// Reason given on the last attempt
        last_reason: String,
    },
    /// The subscriber stream was dropped; the message stays unacknowledged
    Abandoned,
}

/// Hand `envelope` to a subscriber stream and redeliver it per `policy` until it
/// is acknowledged or exhausted.
///
/// Shared by bus adapters so they agree on the settlement protocol.
pub async fn deliver_with_redelivery(
    mut envelope: Envelope,
    sender: &mpsc::Sender<Result<Delivery, EventBusError>>,
    policy: RedeliveryPolicy,
) -> DeliveryReport {
    loop {
        let (delivery, settlement) = Delivery::new(envelope.clone());
        if sender.send(Ok(delivery)).await.is_err() {
            return DeliveryReport::Abandoned;
        }

        match settlement.outcome().await {
            HandlerOutcome::Ack => {
                return DeliveryReport::Acknowledged {
                    attempts: envelope.attempt,
                };
            }
            HandlerOutcome::Retry { reason } => {
                if sender.is_closed() {
                    return DeliveryReport::Abandoned;
                }
                if envelope.attempt >= policy.max_attempts {
                    return DeliveryReport::Exhausted {
                        attempts: envelope.attempt,
                        last_reason: reason,
                    };
                }
                tokio::time::sleep(policy.backoff).await;
                envelope.attempt += 1;
            }
        }
    }
}

/// Stream of deliveries for one subscription.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Event bus for publishing and subscribing to lifecycle events.
///
/// Methods return boxed futures so the trait can be used as `Arc<dyn EventBus>`.
pub trait EventBus: Send + Sync {
    /// Publish `payload` under `routing_key`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker does not accept the message.
    fn publish(
        &self,
        routing_key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<MessageId, EventBusError>> + Send + '_>>;

    /// Open (or join) the named subscription.
    ///
    /// Every subscription receives every message; instances sharing a name
    /// share the work.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the subscription cannot be opened.
    fn subscribe(
        &self,
        subscription: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>>;
}

/// Validate, encode and publish a typed event.
///
/// # Errors
///
/// Returns [`EventBusError::InvalidEvent`] when the event fails validation, or the
/// bus error when publishing fails.
pub async fn publish_event(
    bus: &dyn EventBus,
    event: &PostEvent,
) -> Result<MessageId, EventBusError> {
    let payload = event.encode()?;
    bus.publish(event.routing_key().as_str(), &payload).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn envelope() -> Envelope {
        Envelope {
            routing_key: "post.created".to_string(),
            payload: b"{}".to_vec(),
            message_id: MessageId::new("0-1"),
            attempt: 1,
        }
    }

    fn fast_policy(max_attempts: u32) -> RedeliveryPolicy {
        RedeliveryPolicy {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn dropped_delivery_counts_as_retry() {
        let (delivery, settlement) = Delivery::new(envelope());
        drop(delivery);
        assert!(matches!(settlement.outcome().await, HandlerOutcome::Retry { .. }));
    }

    #[tokio::test]
    async fn redelivers_until_acknowledged() {
        let (tx, mut rx) = mpsc::channel(1);
        let driver = tokio::spawn(async move {
            deliver_with_redelivery(envelope(), &tx, fast_policy(5)).await
        });

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.envelope().attempt, 1);
        first.settle(HandlerOutcome::Retry {
            reason: "store down".to_string(),
        });

        let second = rx.recv().await.unwrap().unwrap();
        assert_eq!(second.envelope().attempt, 2);
        second.settle(HandlerOutcome::Ack);

        assert_eq!(
            driver.await.unwrap(),
            DeliveryReport::Acknowledged { attempts: 2 }
        );
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (tx, mut rx) = mpsc::channel(1);
        let driver = tokio::spawn(async move {
            deliver_with_redelivery(envelope(), &tx, fast_policy(2)).await
        });

        for _ in 0..2 {
            let delivery = rx.recv().await.unwrap().unwrap();
            delivery.settle(HandlerOutcome::Retry {
                reason: "still down".to_string(),
            });
        }

        assert_eq!(
            driver.await.unwrap(),
            DeliveryReport::Exhausted {
                attempts: 2,
                last_reason: "still down".to_string(),
            }
        );
    }
}
