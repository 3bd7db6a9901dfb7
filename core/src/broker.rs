//! Broker client seam.
//!
//! The connector is a policy layer over a client that can receive in
//! peek-lock or receive-and-delete mode, settle leased messages by lock token,
//! send, and list/create entities. This module defines that client boundary.
//!
//! # Lease lifecycle
//!
//! ```text
//!   receive(PeekLock)
//!         │
//!         ▼
//!   ┌───────────┐   delete(token)    ┌─────────┐
//!   │  Leased   │───────────────────►│ Removed │
//!   │ (locked)  │                    └─────────┘
//!   └─────┬─────┘   unlock(token)    ┌───────────┐
//!         ├─────────────────────────►│ Available │◄─── lock expiry
//!         │                          └───────────┘
//!         │         dead_letter(token)  ┌─────────────────┐
//!         └────────────────────────────►│ $DeadLetterQueue│
//!                                       └─────────────────┘
//! ```
//!
//! In receive-and-delete mode the broker removes the message at receive time
//! and none of the settlement calls apply.
//!
//! # Dyn Compatibility
//!
//! Like the rest of the crate's async seams, methods return boxed futures so
//! that endpoints can hold an `Arc<dyn BrokerClient>`.

use crate::config::EndpointConfig;
use crate::entity::{ReceiveSource, SendTarget};
use crate::error::BrokerError;
use crate::message::WireMessage;
use crate::provisioning::ProvisioningDescriptor;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Boxed future returned by broker client methods.
pub type BrokerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BrokerError>> + Send + 'a>>;

/// How a receive call treats the message it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReceiveMode {
    /// Lease the message; it stays on the broker until deleted or its lock expires
    #[default]
    PeekLock,
    /// The broker removes the message as it is returned
    ReceiveAndDelete,
}

impl ReceiveMode {
    /// Whether received messages must later be settled.
    #[must_use]
    pub const fn is_peek_lock(self) -> bool {
        matches!(self, Self::PeekLock)
    }
}

impl fmt::Display for ReceiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeekLock => f.write_str("peek-lock"),
            Self::ReceiveAndDelete => f.write_str("receive-and-delete"),
        }
    }
}

/// Options for a single receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiveOptions {
    /// Receive mode
    pub mode: ReceiveMode,
    /// How long to wait for a message; `None` uses the client default
    pub timeout: Option<Duration>,
}

/// A listable collection of entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityCollection {
    /// All queues in the namespace
    Queues,
    /// All topics in the namespace
    Topics,
    /// Subscriptions under one topic
    Subscriptions {
        /// Parent topic path
        topic: String,
    },
    /// All event streams in the namespace
    EventStreams,
}

impl fmt::Display for EntityCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queues => f.write_str("queues"),
            Self::Topics => f.write_str("topics"),
            Self::Subscriptions { topic } => write!(f, "subscriptions of {topic}"),
            Self::EventStreams => f.write_str("event streams"),
        }
    }
}

/// A listed or created entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityInfo {
    /// Entity name as reported by the broker
    pub name: String,
}

impl EntityInfo {
    /// Create an entity info record.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Reason recorded on a dead-lettered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterReason {
    /// Short reason
    pub reason: String,
    /// Longer description
    pub description: String,
}

/// The operations the connector needs from a broker client.
///
/// Implementations must be `Send + Sync`: one handle is shared by every
/// consumer and producer derived from an endpoint, and completion runs on
/// arbitrary tasks.
pub trait BrokerClient: Send + Sync {
    /// Receive at most one message from `source`.
    ///
    /// Returns `Ok(None)` when nothing arrived before the timeout.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] if the receive call fails.
    fn receive<'a>(
        &'a self,
        source: &'a ReceiveSource,
        options: ReceiveOptions,
    ) -> BrokerFuture<'a, Option<WireMessage>>;

    /// Delete a leased message.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::LockLost`] if the lock expired or is unknown.
    fn delete<'a>(&'a self, lock_token: &'a str) -> BrokerFuture<'a, ()>;

    /// Release a leased message so it can be redelivered.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::LockLost`] if the lock expired or is unknown.
    fn unlock<'a>(&'a self, lock_token: &'a str) -> BrokerFuture<'a, ()>;

    /// Move a leased message to its entity's dead-letter sub-queue.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::LockLost`] if the lock expired or is unknown.
    fn dead_letter<'a>(
        &'a self,
        lock_token: &'a str,
        reason: &'a DeadLetterReason,
    ) -> BrokerFuture<'a, ()>;

    /// Send a message, returning once the broker has accepted it.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] if the broker does not accept the message.
    fn send<'a>(&'a self, target: &'a SendTarget, message: WireMessage) -> BrokerFuture<'a, ()>;

    /// List the entities of a collection.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] if listing fails.
    fn list<'a>(&'a self, collection: &'a EntityCollection) -> BrokerFuture<'a, Vec<EntityInfo>>;

    /// Create an entity from a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::AlreadyExists`] if another creator won a race,
    /// or another [`BrokerError`] if the broker rejects the request.
    fn create<'a>(
        &'a self,
        descriptor: &'a ProvisioningDescriptor,
    ) -> BrokerFuture<'a, Option<EntityInfo>>;
}

/// Creates connected broker clients for endpoints.
pub trait BrokerConnector: Send + Sync {
    /// Connect using the endpoint's namespace and credentials.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] if no client can be created.
    fn connect<'a>(&'a self, config: &'a EndpointConfig) -> BrokerFuture<'a, Arc<dyn BrokerClient>>;
}
