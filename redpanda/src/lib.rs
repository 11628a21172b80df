//! Redpanda event bus for Agora services.
//!
//! Every lifecycle event goes to one topic. The routing key travels in the
//! `routingKey` message header, never in the body. Each subscription name maps
//! to a Kafka consumer group, so every subscribing service sees every message
//! while instances of the same service share partitions.
//!
//! # Delivery
//!
//! Offsets are committed manually, and only after the subscriber settles the
//! delivery with `Ack` (or the message exhausted its redelivery policy).
//! A crash before the commit means the message is consumed again.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use agora_core::event_bus::{
    DeliveryReport, DeliveryStream, Envelope, EventBus, EventBusError, MessageId,
    RedeliveryPolicy, deliver_with_redelivery,
};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Message header carrying the routing key.
pub const ROUTING_KEY_HEADER: &str = "routingKey";

/// Default topic for post lifecycle events.
pub const DEFAULT_TOPIC: &str = "social-events";

/// Redpanda event bus implementation.
///
/// # Example
///
/// ```no_run
/// use agora_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092")
///     .topic("social-events")
///     .producer_acks("all")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    producer: FutureProducer,
    brokers: String,
    topic: String,
    timeout: Duration,
    buffer_size: usize,
    auto_offset_reset: String,
    redelivery: RedeliveryPolicy,
}

impl RedpandaEventBus {
    /// Create an event bus with default configuration on [`DEFAULT_TOPIC`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Topic every event is published to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
    redelivery: Option<RedeliveryPolicy>,
}

impl RedpandaEventBusBuilder {
    /// Comma-separated broker addresses.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Topic to publish to and consume from. Default: [`DEFAULT_TOPIC`].
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Producer acknowledgment mode: "0", "1" or "all". Default: "all".
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Compression codec. Default: "none".
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Producer send timeout. Default: 5 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Deliveries buffered between the consumer task and the subscriber.
    /// Values below 1 are raised to 1. Default: 16.
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Where new consumer groups start reading. Default: "earliest".
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Redelivery policy for deliveries settled with `Retry`.
    #[must_use]
    pub const fn redelivery(mut self, policy: RedeliveryPolicy) -> Self {
        self.redelivery = Some(policy);
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are missing or the
    /// producer cannot be created.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self.brokers.ok_or_else(|| {
            EventBusError::ConnectionFailed("Brokers not configured".to_string())
        })?;
        let acks = self.producer_acks.unwrap_or_else(|| "all".to_string());
        let compression = self.compression.unwrap_or_else(|| "none".to_string());

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", &acks)
            .set("compression.type", &compression)
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        let bus = RedpandaEventBus {
            producer,
            brokers,
            topic: self.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            buffer_size: self.buffer_size.unwrap_or(16),
            auto_offset_reset: self
                .auto_offset_reset
                .unwrap_or_else(|| "earliest".to_string()),
            redelivery: self.redelivery.unwrap_or_default(),
        };

        tracing::info!(
            brokers = %bus.brokers,
            topic = %bus.topic,
            acks = %acks,
            compression = %compression,
            max_attempts = bus.redelivery.max_attempts,
            "RedpandaEventBus created successfully"
        );

        Ok(bus)
    }
}

fn routing_key_of<M: Message>(message: &M) -> Option<String> {
    message
        .headers()?
        .iter()
        .find(|header| header.key == ROUTING_KEY_HEADER)
        .and_then(|header| header.value)
        .and_then(|value| std::str::from_utf8(value).ok())
        .map(str::to_string)
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        routing_key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<MessageId, EventBusError>> + Send + '_>> {
        let routing_key = routing_key.to_string();
        let payload = payload.to_vec();

        Box::pin(async move {
            let headers = OwnedHeaders::new().insert(Header {
                key: ROUTING_KEY_HEADER,
                value: Some(routing_key.as_bytes()),
            });
            let record = FutureRecord::to(&self.topic)
                .payload(&payload)
                .key(routing_key.as_bytes())
                .headers(headers);

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    metrics::counter!("agora_events_published_total", "routing_key" => routing_key.clone())
                        .increment(1);
                    tracing::debug!(
                        topic = %self.topic,
                        partition = partition,
                        offset = offset,
                        routing_key = %routing_key,
                        "Event published successfully"
                    );
                    Ok(MessageId::new(format!("{}/{partition}/{offset}", self.topic)))
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %self.topic,
                        routing_key = %routing_key,
                        error = %kafka_error,
                        "Failed to publish event"
                    );
                    Err(EventBusError::PublishFailed {
                        routing_key,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe(
        &self,
        subscription: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>> {
        let subscription = subscription.to_string();

        Box::pin(async move {
            let subscription_failed = |reason: String| EventBusError::SubscriptionFailed {
                subscription: subscription.clone(),
                reason,
            };

            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &self.brokers)
                .set("group.id", &subscription)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &self.auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| subscription_failed(format!("Failed to create consumer: {e}")))?;

            consumer
                .subscribe(&[self.topic.as_str()])
                .map_err(|e| subscription_failed(format!("Failed to subscribe: {e}")))?;

            tracing::info!(
                topic = %self.topic,
                subscription = %subscription,
                manual_commit = true,
                "Subscribed to topic"
            );

            let (tx, rx) = tokio::sync::mpsc::channel(self.buffer_size);
            let policy = self.redelivery;

            tokio::spawn(async move {
                use futures::StreamExt;

                let mut stream = consumer.stream();

                while let Some(msg_result) = stream.next().await {
                    let message = match msg_result {
                        Ok(message) => message,
                        Err(e) => {
                            let err = EventBusError::TransportError(format!(
                                "Failed to receive message: {e}"
                            ));
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                            continue;
                        }
                    };

                    let message_id = MessageId::new(format!(
                        "{}/{}/{}",
                        message.topic(),
                        message.partition(),
                        message.offset()
                    ));

                    let report = if let Some(routing_key) = routing_key_of(&message) {
                        let envelope = Envelope {
                            routing_key,
                            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                            message_id: message_id.clone(),
                            attempt: 1,
                        };
                        deliver_with_redelivery(envelope, &tx, policy).await
                    } else {
                        tracing::warn!(
                            message_id = %message_id,
                            "Message without routing key, skipping"
                        );
                        DeliveryReport::Acknowledged { attempts: 0 }
                    };

                    match report {
                        DeliveryReport::Acknowledged { .. } => {}
                        DeliveryReport::Exhausted {
                            attempts,
                            last_reason,
                        } => {
                            tracing::error!(
                                message_id = %message_id,
                                attempts = attempts,
                                reason = %last_reason,
                                "Giving up on message after repeated failures"
                            );
                        }
                        DeliveryReport::Abandoned => {
                            tracing::debug!("Subscriber dropped, exiting consumer task");
                            break;
                        }
                    }

                    // Only reached once the message is settled for good
                    if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                        tracing::warn!(
                            message_id = %message_id,
                            error = %e,
                            "Failed to commit offset (message may be redelivered)"
                        );
                    }
                }

                tracing::debug!(subscription = %subscription, "Consumer task exiting");
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
