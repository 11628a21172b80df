//! Routing-key dispatch from a bus subscription to projections.

use agora_core::event_bus::{Delivery, Envelope, EventBus, EventBusError, HandlerOutcome};
use agora_core::events::{EventError, PostEvent, RoutingKey};
use agora_core::projection::Projection;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Errors that stop a subscriber loop.
#[derive(Error, Debug)]
pub enum SubscriberError {
    /// The subscription could not be opened
    #[error("Failed to subscribe: {0}")]
    Subscribe(#[from] EventBusError),

    /// The delivery stream ended without a shutdown signal
    #[error("Subscription '{0}' ended unexpectedly")]
    StreamEnded(String),
}

/// Dispatches deliveries of one subscription to the projections registered per
/// routing key.
///
/// Handlers for a key run in registration order. A delivery is acknowledged
/// only once every handler for its key succeeded; any failure asks for a
/// redelivery, so handlers must be idempotent.
///
/// # Example
///
/// ```ignore
/// let search = Arc::new(SearchProjection::new(index));
/// let subscriber = EventSubscriber::new("search-service")
///     .on(RoutingKey::PostCreated, search.clone())
///     .on(RoutingKey::PostDeleted, search);
///
/// subscriber.run(event_bus, shutdown_rx).await?;
/// ```
pub struct EventSubscriber {
    subscription: String,
    handlers: HashMap<RoutingKey, Vec<Arc<dyn Projection>>>,
}

impl EventSubscriber {
    /// Subscriber for the named subscription with no handlers yet.
    #[must_use]
    pub fn new(subscription: impl Into<String>) -> Self {
        Self {
            subscription: subscription.into(),
            handlers: HashMap::new(),
        }
    }

    /// Register `projection` for `routing_key`.
    #[must_use]
    pub fn on(mut self, routing_key: RoutingKey, projection: Arc<dyn Projection>) -> Self {
        self.handlers.entry(routing_key).or_default().push(projection);
        self
    }

    /// Subscription name.
    #[must_use]
    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    /// Run the handlers for one envelope and decide its outcome.
    pub async fn dispatch(&self, envelope: &Envelope) -> HandlerOutcome {
        let event = match PostEvent::decode(&envelope.routing_key, &envelope.payload) {
            Ok(event) => event,
            Err(EventError::UnknownRoutingKey(key)) => {
                tracing::debug!(
                    subscription = %self.subscription,
                    routing_key = %key,
                    "Ignoring message with unknown routing key"
                );
                return HandlerOutcome::Ack;
            }
            Err(e) => {
                // Redelivering cannot fix a payload that does not parse
                tracing::error!(
                    subscription = %self.subscription,
                    message_id = %envelope.message_id,
                    error = %e,
                    "Dropping malformed event"
                );
                metrics::counter!("agora_events_malformed_total", "subscription" => self.subscription.clone())
                    .increment(1);
                return HandlerOutcome::Ack;
            }
        };

        let routing_key = event.routing_key();
        let Some(handlers) = self.handlers.get(&routing_key) else {
            tracing::trace!(
                subscription = %self.subscription,
                routing_key = %routing_key,
                "No handler registered, acknowledging"
            );
            return HandlerOutcome::Ack;
        };

        for handler in handlers {
            if let Err(e) = handler.apply_event(&event).await {
                tracing::error!(
                    subscription = %self.subscription,
                    projection = handler.name(),
                    routing_key = %routing_key,
                    post_id = %event.post_id(),
                    attempt = envelope.attempt,
                    error = %e,
                    "Projection failed, requesting redelivery"
                );
                metrics::counter!(
                    "agora_events_failed_total",
                    "projection" => handler.name().to_string(),
                    "routing_key" => routing_key.as_str()
                )
                .increment(1);
                return HandlerOutcome::Retry {
                    reason: e.to_string(),
                };
            }
        }

        tracing::debug!(
            subscription = %self.subscription,
            routing_key = %routing_key,
            post_id = %event.post_id(),
            "Event applied"
        );
        metrics::counter!("agora_events_handled_total", "routing_key" => routing_key.as_str())
            .increment(1);
        HandlerOutcome::Ack
    }

    /// Dispatch one delivery and settle it.
    pub async fn process(&self, delivery: Delivery) {
        let outcome = self.dispatch(delivery.envelope()).await;
        delivery.settle(outcome);
    }

    /// Consume the subscription until `shutdown` flips to `true`.
    ///
    /// Deliveries are processed one at a time. Transport errors are logged and
    /// the loop continues; the bus adapter owns reconnection.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriberError`] if the subscription cannot be opened or the
    /// stream ends before shutdown.
    pub async fn run(
        self,
        event_bus: Arc<dyn EventBus>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), SubscriberError> {
        let mut stream = event_bus.subscribe(&self.subscription).await?;

        tracing::info!(
            subscription = %self.subscription,
            routing_keys = ?self.handlers.keys().map(|k| k.as_str()).collect::<Vec<_>>(),
            "Event subscriber started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                next = stream.next() => match next {
                    Some(Ok(delivery)) => self.process(delivery).await,
                    Some(Err(e)) => {
                        tracing::error!(
                            subscription = %self.subscription,
                            error = %e,
                            "Error receiving event from bus"
                        );
                    }
                    None => return Err(SubscriberError::StreamEnded(self.subscription)),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(subscription = %self.subscription, "Event subscriber stopped");
        Ok(())
    }
}
