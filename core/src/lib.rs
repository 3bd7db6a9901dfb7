//! # Leasebus Core
//!
//! Core types and seams for lease-based message consumption over a
//! queue/topic/event-stream broker.
//!
//! This crate holds everything that does not need an async runtime:
//!
//! - **Entities**: the tagged [`Entity`](entity::Entity) variant and its
//!   receive/send/provision capabilities
//! - **Configuration**: [`EndpointConfig`](config::EndpointConfig), parsed from a
//!   connection URI
//! - **Broker seam**: the [`BrokerClient`](broker::BrokerClient) trait the policy
//!   layer drives
//! - **Host seam**: [`Exchange`](exchange::Exchange),
//!   [`Processor`](exchange::Processor) and
//!   [`CompletionOutcome`](exchange::CompletionOutcome)
//! - **Translation**: the pure
//!   [`AttributeTranslator`](translator::AttributeTranslator)
//! - **Errors** and the non-fatal [`ExceptionSink`](sink::ExceptionSink)
//!
//! ## Delivery guarantees
//!
//! - **Peek-lock** (default): at-least-once. A message is deleted only after
//!   downstream processing succeeds; any other path leaves it to reappear.
//! - **Receive-and-delete**: at-most-once. The broker removes the message on
//!   receive and a downstream failure loses it.
//!
//! The runtime that enforces these lives in `leasebus-runtime`.

pub mod broker;
pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod exchange;
pub mod message;
pub mod metadata;
pub mod provisioning;
pub mod sink;
pub mod translator;

// Re-export commonly used types
pub use broker::{BrokerClient, BrokerConnector, ReceiveMode, ReceiveOptions};
pub use config::EndpointConfig;
pub use entity::{Entity, EntityKind, SubQueue};
pub use exchange::{CompletionOutcome, Exchange, Payload, Processor};
pub use message::{LeaseEnvelope, WireMessage};
pub use metadata::{HeaderValue, Metadata, headers};
pub use translator::AttributeTranslator;
