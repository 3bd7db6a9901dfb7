//! Error taxonomy for lease-based consumption, completion and provisioning.
//!
//! Only [`ProvisioningError`] and [`SendError`] are surfaced as hard failures to
//! their callers. [`ReceiveError`], [`CommitError`] and [`RollbackError`] are
//! absorbed by the runtime and routed to an
//! [`ExceptionSink`](crate::sink::ExceptionSink) so the poll loop stays live.

use thiserror::Error;

/// Errors reported by a broker client implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The entity being created already exists
    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    /// The addressed entity does not exist
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// The lock token is unknown to the broker or its lock has expired
    #[error("Lock lost or expired for token {0}")]
    LockLost(String),

    /// Credentials were rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A namespace quota would be exceeded
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The request was rejected as malformed or carried invalid settings
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Generic error for other failures
    #[error("Broker error: {0}")]
    Other(String),
}

impl BrokerError {
    /// Whether this error means a create call lost a race against another creator.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

/// Errors raised while building an [`EndpointConfig`](crate::config::EndpointConfig).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The endpoint URI could not be parsed
    #[error("Invalid endpoint URI '{uri}': {reason}")]
    InvalidUri {
        /// The offending URI
        uri: String,
        /// Why it was rejected
        reason: String,
    },

    /// The URI addresses an entity kind other than queue, topic or event
    #[error("Unsupported entity kind: {0}")]
    UnsupportedEntityKind(String),

    /// A parameter required by the entity kind is missing
    #[error("Missing required parameter '{parameter}' for {kind} endpoints")]
    MissingParameter {
        /// The parameter name
        parameter: &'static str,
        /// The entity kind that requires it
        kind: &'static str,
    },

    /// A parameter value could not be parsed
    #[error("Invalid value '{value}' for parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// The raw value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// The parameter is not recognised for this entity kind
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// The assembled configuration is inconsistent
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Fatal startup error: an entity could not be verified or created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningError {
    /// Listing existing entities failed
    #[error("Failed to list {collection}: {source}")]
    ListFailed {
        /// Which collection was being listed
        collection: String,
        /// The broker failure
        source: BrokerError,
    },

    /// The broker rejected the create call
    #[error("Failed to create {entity}: {source}")]
    CreateFailed {
        /// The entity path
        entity: String,
        /// The broker failure
        source: BrokerError,
    },

    /// Automatic creation is disabled and the entity does not exist
    #[error("Entity {0} does not exist and automatic creation is disabled")]
    Missing(String),
}

/// Transient poll failure, surfaced to the poll scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiveError {
    /// The broker receive call failed
    #[error("Receive from '{path}' failed: {source}")]
    Broker {
        /// The entity path polled
        path: String,
        /// The broker failure
        source: BrokerError,
    },

    /// A peek-lock receive returned a message that cannot be settled later
    #[error("Message {message_id} was received in peek-lock mode without a lock token")]
    MissingLockToken {
        /// The message id reported by the broker
        message_id: String,
    },
}

/// Non-fatal failure to delete a leased message after successful processing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to commit message {message_id:?} (lock token {lock_token}): {source}")]
pub struct CommitError {
    /// The message id, if the broker reported one
    pub message_id: Option<String>,
    /// The lock token used for the delete call
    pub lock_token: String,
    /// The broker failure
    pub source: BrokerError,
}

/// Non-fatal failure to release a leased message after failed processing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RollbackError {
    /// The unlock call failed; the lock will expire on its own
    #[error("Failed to unlock message {message_id:?} (lock token {lock_token}): {source}")]
    Unlock {
        /// The message id, if the broker reported one
        message_id: Option<String>,
        /// The lock token used for the unlock call
        lock_token: String,
        /// The broker failure
        source: BrokerError,
    },

    /// The dead-letter call failed; the lock will expire on its own
    #[error("Failed to dead-letter message {message_id:?} (lock token {lock_token}): {source}")]
    DeadLetter {
        /// The message id, if the broker reported one
        message_id: Option<String>,
        /// The lock token used for the dead-letter call
        lock_token: String,
        /// The broker failure
        source: BrokerError,
    },
}

/// Outbound send failure, propagated to the caller.
#[derive(Error, Debug)]
pub enum SendError {
    /// The broker did not accept the message
    #[error("Send to '{target}' failed: {source}")]
    Broker {
        /// The target entity path
        target: String,
        /// The broker failure
        source: BrokerError,
    },

    /// The streaming body could not be read
    #[error("Failed to read message body: {0}")]
    Body(#[from] std::io::Error),
}

/// Downstream processing failure carried by a rolled-back outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProcessingError {
    message: String,
    kind: Option<String>,
}

impl ProcessingError {
    /// Create a processing error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }

    /// Create a processing error from any error, remembering its type name.
    pub fn from_error<E: std::error::Error>(error: &E) -> Self {
        Self {
            message: error.to_string(),
            kind: Some(std::any::type_name::<E>().to_string()),
        }
    }

    /// Attach a classification such as the failing error's type name.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// The failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The failure classification, if known.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }
}

/// Endpoint lifecycle errors.
#[derive(Error, Debug)]
pub enum EndpointError {
    /// The broker client could not be created
    #[error("Failed to connect to broker: {0}")]
    Connect(BrokerError),

    /// Provisioning failed; the endpoint must not start
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    /// The endpoint configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The configured entity cannot be consumed from
    #[error("Entity {0} cannot be consumed from; a queue or a topic subscription is required")]
    NotConsumable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("downstream exploded")]
    struct Downstream;

    #[test]
    fn already_exists_is_classified() {
        assert!(BrokerError::AlreadyExists("orders".into()).is_already_exists());
        assert!(!BrokerError::NotFound("orders".into()).is_already_exists());
    }

    #[test]
    fn processing_error_keeps_type_name() {
        let err = ProcessingError::from_error(&Downstream);
        assert_eq!(err.message(), "downstream exploded");
        assert!(err.kind().is_some_and(|k| k.ends_with("Downstream")));
    }

    #[test]
    fn commit_error_renders_token() {
        let err = CommitError {
            message_id: Some("m-1".into()),
            lock_token: "tok".into(),
            source: BrokerError::LockLost("tok".into()),
        };
        assert!(err.to_string().contains("lock token tok"));
    }
}
