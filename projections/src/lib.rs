//! # Agora Projections
//!
//! [`EventSubscriber`] connects projections to the event bus: one subscriber
//! per service subscription, handlers registered per routing key, every
//! delivery settled from the handler's result.
//!
//! ```text
//! ┌─────────────┐
//! │  Event Bus  │ (Redpanda)
//! └──────┬──────┘
//!        │ deliveries (one at a time)
//!        ▼
//! ┌─────────────────┐   unknown / unregistered key ──► Ack (dropped)
//! │ EventSubscriber │   malformed payload          ──► Ack (dropped, logged)
//! └────────┬────────┘
//!          │ PostEvent
//!          ▼
//! ┌─────────────────┐   Ok  ──► Ack
//! │   Projection    │   Err ──► Retry
//! └─────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod subscriber;

pub use subscriber::{EventSubscriber, SubscriberError};
