//! Units of work handed to, and received from, the host framework.

use crate::error::ProcessingError;
use crate::metadata::Metadata;
use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// Streaming body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, std::io::Error>> + Send>>;

/// Body of an exchange.
#[derive(Default)]
pub enum Payload {
    /// No body
    #[default]
    Empty,
    /// String body
    Text(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Streaming body, preferred by the sender when present
    Stream(ByteStream),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// A unit of work flowing through the host framework.
#[derive(Debug)]
pub struct Exchange {
    /// Local identity of this unit of work
    pub id: Uuid,
    /// Explicit message id; takes precedence over the message id header when sending
    pub message_id: Option<String>,
    /// Body
    pub payload: Payload,
    /// Headers
    pub metadata: Metadata,
}

impl Exchange {
    /// Create an exchange with a fresh id.
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_id: None,
            payload: payload.into(),
            metadata: Metadata::new(),
        }
    }

    /// Set the explicit message id.
    #[must_use]
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Replace the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Result of downstream processing of one leased message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Processing succeeded; the lease is committed
    Committed,
    /// Processing failed; the lease is rolled back
    RolledBack(ProcessingError),
}

impl From<Result<(), ProcessingError>> for CompletionOutcome {
    fn from(result: Result<(), ProcessingError>) -> Self {
        match result {
            Ok(()) => Self::Committed,
            Err(error) => Self::RolledBack(error),
        }
    }
}

/// Boxed future returned by [`Processor::process`].
pub type ProcessFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ProcessingError>> + Send + 'a>>;

/// Downstream processing supplied by the host framework.
///
/// Consumers hand each received exchange to `process` on a spawned task and
/// turn the result into a [`CompletionOutcome`].
pub trait Processor: Send + Sync {
    /// Process one exchange.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError`] when processing fails; the lease is then rolled back.
    fn process(&self, exchange: Exchange) -> ProcessFuture<'_>;
}
