//! Generic message metadata exposed to downstream processing.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Stable header names, one per wire field.
pub mod headers {
    /// Prefix reserved for connector-defined headers.
    pub const RESERVED_PREFIX: &str = "LeaseBus";

    /// Message identifier
    pub const MESSAGE_ID: &str = "LeaseBusMessageId";
    /// Correlation identifier
    pub const CORRELATION_ID: &str = "LeaseBusCorrelationId";
    /// Delivery count
    pub const DELIVERY_COUNT: &str = "LeaseBusDeliveryCount";
    /// Label
    pub const LABEL: &str = "LeaseBusLabel";
    /// Locked-until instant
    pub const LOCKED_UNTIL: &str = "LeaseBusLockedUntil";
    /// Lock location
    pub const LOCK_LOCATION: &str = "LeaseBusLockLocation";
    /// Lock token
    pub const LOCK_TOKEN: &str = "LeaseBusLockToken";
    /// Message location
    pub const MESSAGE_LOCATION: &str = "LeaseBusMessageLocation";
    /// Partition key
    pub const PARTITION_KEY: &str = "LeaseBusPartitionKey";
    /// Reply-to address
    pub const REPLY_TO: &str = "LeaseBusReplyTo";
    /// Reply-to session id
    pub const REPLY_TO_SESSION_ID: &str = "LeaseBusReplyToSessionId";
    /// Scheduled enqueue instant
    pub const SCHEDULED_ENQUEUE_TIME: &str = "LeaseBusScheduledEnqueueTime";
    /// Sequence number
    pub const SEQUENCE_NUMBER: &str = "LeaseBusSequenceNumber";
    /// Time to live
    pub const TIME_TO_LIVE: &str = "LeaseBusTimeToLive";
    /// Session id
    pub const SESSION_ID: &str = "LeaseBusSessionId";
    /// "To" address
    pub const TO: &str = "LeaseBusTo";
    /// Via-partition key
    pub const VIA_PARTITION_KEY: &str = "LeaseBusViaPartitionKey";
    /// Bundle of all set broker properties
    pub const BROKER_PROPERTIES: &str = "LeaseBusBrokerProperties";
    /// Content type
    pub const CONTENT_TYPE: &str = "LeaseBusContentType";
    /// Enqueued instant
    pub const ENQUEUED_TIME: &str = "LeaseBusEnqueuedTime";
    /// Dead-letter reason
    pub const DEAD_LETTER_REASON: &str = "LeaseBusDeadLetterReason";
    /// Dead-letter error description
    pub const DEAD_LETTER_ERROR_DESCRIPTION: &str = "LeaseBusDeadLetterErrorDescription";
    /// Dead-letter source entity
    pub const DEAD_LETTER_SOURCE: &str = "LeaseBusDeadLetterSource";
    /// Bundle of application properties
    pub const APPLICATION_PROPERTIES: &str = "LeaseBusApplicationProperties";
}

/// A metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    /// Known field with no value
    Null,
    /// Text
    Text(String),
    /// Integer
    Integer(i64),
    /// Instant
    Timestamp(DateTime<Utc>),
    /// Duration
    Duration(Duration),
    /// Property bundle
    Properties(Map<String, Value>),
}

impl HeaderValue {
    /// Text content, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Integer content, if this is an integer value.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Whether this is the null marker.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert an application property value into a header value.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::String(text) => Self::Text(text.clone()),
            Value::Number(number) => number
                .as_i64()
                .map_or_else(|| Self::Text(number.to_string()), Self::Integer),
            Value::Object(map) => Self::Properties(map.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<DateTime<Utc>> for HeaderValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Duration> for HeaderValue {
    fn from(value: Duration) -> Self {
        Self::Duration(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for HeaderValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Ordered header map attached to an exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata(BTreeMap<String, HeaderValue>);

impl Metadata {
    /// An empty metadata map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.0.get(name)
    }

    /// Look up a text header.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(HeaderValue::as_text)
    }

    /// Whether the header is present, null or not.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Remove a header.
    pub fn remove(&mut self, name: &str) -> Option<HeaderValue> {
        self.0.remove(name)
    }

    /// Iterate headers in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<HeaderValue>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_option_becomes_null() {
        let metadata = Metadata::new().with(headers::LABEL, None::<String>);
        assert!(metadata.contains(headers::LABEL));
        assert!(metadata.get(headers::LABEL).is_some_and(HeaderValue::is_null));
    }

    #[test]
    fn json_numbers_become_integers() {
        assert_eq!(HeaderValue::from_json(&Value::from(7)), HeaderValue::Integer(7));
        assert_eq!(
            HeaderValue::from_json(&Value::from(1.5)),
            HeaderValue::Text("1.5".into())
        );
    }
}
