//! Provisioning descriptors: per-entity-kind optional settings for broker-side create calls.
//!
//! Every setting is an `Option`. `None` means "leave the broker default alone";
//! only settings that were explicitly configured end up in a create request.

use crate::broker::EntityCollection;
use crate::entity::subscription_path;
use std::fmt;
use std::time::Duration;

/// A single explicitly configured setting value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    /// Boolean flag
    Flag(bool),
    /// Count or size
    Count(u64),
    /// Duration
    Duration(Duration),
    /// Free text (forwarding targets, user metadata)
    Text(String),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(v) => write!(f, "{v}"),
            Self::Count(v) => write!(f, "{v}"),
            Self::Duration(v) => write!(f, "{}s", v.as_secs()),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<u32> for SettingValue {
    fn from(value: u32) -> Self {
        Self::Count(u64::from(value))
    }
}

impl From<u64> for SettingValue {
    fn from(value: u64) -> Self {
        Self::Count(value)
    }
}

impl From<Duration> for SettingValue {
    fn from(value: Duration) -> Self {
        Self::Duration(value)
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Explicitly configured settings, in declaration order.
pub type ExplicitSettings = Vec<(&'static str, SettingValue)>;

fn push<T: Clone + Into<SettingValue>>(out: &mut ExplicitSettings, name: &'static str, value: Option<&T>) {
    if let Some(value) = value {
        out.push((name, value.clone().into()));
    }
}

/// Optional queue settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSettings {
    /// Peek-lock duration
    pub lock_duration: Option<Duration>,
    /// Maximum queue size
    pub max_size_in_megabytes: Option<u64>,
    /// Enable duplicate detection
    pub requires_duplicate_detection: Option<bool>,
    /// Require sessions
    pub requires_session: Option<bool>,
    /// Default message TTL
    pub default_message_time_to_live: Option<Duration>,
    /// Dead-letter expired messages
    pub dead_lettering_on_message_expiration: Option<bool>,
    /// Duplicate detection window
    pub duplicate_detection_history_time_window: Option<Duration>,
    /// Deliveries before dead-lettering
    pub max_delivery_count: Option<u32>,
    /// Server-side batching
    pub enable_batched_operations: Option<bool>,
    /// Partitioned entity
    pub enable_partitioning: Option<bool>,
    /// Idle interval after which the queue is deleted
    pub auto_delete_on_idle: Option<Duration>,
    /// Auto-forward target
    pub forward_to: Option<String>,
    /// Opaque user metadata
    pub user_metadata: Option<String>,
}

impl QueueSettings {
    /// Settings that were explicitly configured.
    #[must_use]
    pub fn explicit_settings(&self) -> ExplicitSettings {
        let mut out = Vec::new();
        push(&mut out, "lockDuration", self.lock_duration.as_ref());
        push(&mut out, "maxSizeInMegabytes", self.max_size_in_megabytes.as_ref());
        push(&mut out, "requiresDuplicateDetection", self.requires_duplicate_detection.as_ref());
        push(&mut out, "requiresSession", self.requires_session.as_ref());
        push(&mut out, "defaultMessageTimeToLive", self.default_message_time_to_live.as_ref());
        push(
            &mut out,
            "deadLetteringOnMessageExpiration",
            self.dead_lettering_on_message_expiration.as_ref(),
        );
        push(
            &mut out,
            "duplicateDetectionHistoryTimeWindow",
            self.duplicate_detection_history_time_window.as_ref(),
        );
        push(&mut out, "maxDeliveryCount", self.max_delivery_count.as_ref());
        push(&mut out, "enableBatchedOperations", self.enable_batched_operations.as_ref());
        push(&mut out, "enablePartitioning", self.enable_partitioning.as_ref());
        push(&mut out, "autoDeleteOnIdle", self.auto_delete_on_idle.as_ref());
        push(&mut out, "forwardTo", self.forward_to.as_ref());
        push(&mut out, "userMetadata", self.user_metadata.as_ref());
        out
    }
}

/// Optional topic settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicSettings {
    /// Default message TTL
    pub default_message_time_to_live: Option<Duration>,
    /// Maximum topic size
    pub max_size_in_megabytes: Option<u64>,
    /// Enable duplicate detection
    pub requires_duplicate_detection: Option<bool>,
    /// Duplicate detection window
    pub duplicate_detection_history_time_window: Option<Duration>,
    /// Server-side batching
    pub enable_batched_operations: Option<bool>,
    /// Partitioned entity
    pub enable_partitioning: Option<bool>,
    /// Preserve publish order
    pub support_ordering: Option<bool>,
    /// Idle interval after which the topic is deleted
    pub auto_delete_on_idle: Option<Duration>,
    /// Opaque user metadata
    pub user_metadata: Option<String>,
}

impl TopicSettings {
    /// Settings that were explicitly configured.
    #[must_use]
    pub fn explicit_settings(&self) -> ExplicitSettings {
        let mut out = Vec::new();
        push(&mut out, "defaultMessageTimeToLive", self.default_message_time_to_live.as_ref());
        push(&mut out, "maxSizeInMegabytes", self.max_size_in_megabytes.as_ref());
        push(&mut out, "requiresDuplicateDetection", self.requires_duplicate_detection.as_ref());
        push(
            &mut out,
            "duplicateDetectionHistoryTimeWindow",
            self.duplicate_detection_history_time_window.as_ref(),
        );
        push(&mut out, "enableBatchedOperations", self.enable_batched_operations.as_ref());
        push(&mut out, "enablePartitioning", self.enable_partitioning.as_ref());
        push(&mut out, "supportOrdering", self.support_ordering.as_ref());
        push(&mut out, "autoDeleteOnIdle", self.auto_delete_on_idle.as_ref());
        push(&mut out, "userMetadata", self.user_metadata.as_ref());
        out
    }
}

/// Optional subscription settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSettings {
    /// Peek-lock duration
    pub lock_duration: Option<Duration>,
    /// Require sessions
    pub requires_session: Option<bool>,
    /// Default message TTL
    pub default_message_time_to_live: Option<Duration>,
    /// Dead-letter expired messages
    pub dead_lettering_on_message_expiration: Option<bool>,
    /// Dead-letter messages whose filter evaluation fails
    pub dead_lettering_on_filter_evaluation_exceptions: Option<bool>,
    /// Deliveries before dead-lettering
    pub max_delivery_count: Option<u32>,
    /// Server-side batching
    pub enable_batched_operations: Option<bool>,
    /// Idle interval after which the subscription is deleted
    pub auto_delete_on_idle: Option<Duration>,
    /// Auto-forward target
    pub forward_to: Option<String>,
    /// Opaque user metadata
    pub user_metadata: Option<String>,
}

impl SubscriptionSettings {
    /// Settings that were explicitly configured.
    #[must_use]
    pub fn explicit_settings(&self) -> ExplicitSettings {
        let mut out = Vec::new();
        push(&mut out, "lockDuration", self.lock_duration.as_ref());
        push(&mut out, "requiresSession", self.requires_session.as_ref());
        push(&mut out, "defaultMessageTimeToLive", self.default_message_time_to_live.as_ref());
        push(
            &mut out,
            "deadLetteringOnMessageExpiration",
            self.dead_lettering_on_message_expiration.as_ref(),
        );
        push(
            &mut out,
            "deadLetteringOnFilterEvaluationExceptions",
            self.dead_lettering_on_filter_evaluation_exceptions.as_ref(),
        );
        push(&mut out, "maxDeliveryCount", self.max_delivery_count.as_ref());
        push(&mut out, "enableBatchedOperations", self.enable_batched_operations.as_ref());
        push(&mut out, "autoDeleteOnIdle", self.auto_delete_on_idle.as_ref());
        push(&mut out, "forwardTo", self.forward_to.as_ref());
        push(&mut out, "userMetadata", self.user_metadata.as_ref());
        out
    }
}

/// Optional event stream settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStreamSettings {
    /// Retention in days
    pub message_retention_in_days: Option<u64>,
    /// Number of partitions
    pub partition_count: Option<u64>,
    /// Opaque user metadata
    pub user_metadata: Option<String>,
}

impl EventStreamSettings {
    /// Settings that were explicitly configured.
    #[must_use]
    pub fn explicit_settings(&self) -> ExplicitSettings {
        let mut out = Vec::new();
        push(&mut out, "messageRetentionInDays", self.message_retention_in_days.as_ref());
        push(&mut out, "partitionCount", self.partition_count.as_ref());
        push(&mut out, "userMetadata", self.user_metadata.as_ref());
        out
    }
}

/// All provisioning settings carried by an endpoint configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningSettings {
    /// Applied when the endpoint targets a queue
    pub queue: QueueSettings,
    /// Applied to the topic of a topic endpoint
    pub topic: TopicSettings,
    /// Applied to the subscription of a topic endpoint
    pub subscription: SubscriptionSettings,
    /// Applied when the endpoint targets an event stream
    pub event_stream: EventStreamSettings,
}

/// A broker-side create request for one entity.
///
/// Built once at endpoint start from the configuration and discarded after use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningDescriptor {
    /// Create a queue
    Queue {
        /// Queue name
        name: String,
        /// Optional settings
        settings: QueueSettings,
    },
    /// Create a topic
    Topic {
        /// Topic path
        path: String,
        /// Optional settings
        settings: TopicSettings,
    },
    /// Create a subscription under an existing topic
    Subscription {
        /// Parent topic path
        topic: String,
        /// Subscription name
        name: String,
        /// Optional settings
        settings: SubscriptionSettings,
    },
    /// Create an event stream
    EventStream {
        /// Event stream path
        path: String,
        /// Optional settings
        settings: EventStreamSettings,
    },
}

impl ProvisioningDescriptor {
    /// Name matched against the listing of [`Self::collection`].
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Queue { name, .. } | Self::Subscription { name, .. } => name,
            Self::Topic { path, .. } | Self::EventStream { path, .. } => path,
        }
    }

    /// The collection that must be listed to check for existence.
    #[must_use]
    pub fn collection(&self) -> EntityCollection {
        match self {
            Self::Queue { .. } => EntityCollection::Queues,
            Self::Topic { .. } => EntityCollection::Topics,
            Self::Subscription { topic, .. } => EntityCollection::Subscriptions {
                topic: topic.clone(),
            },
            Self::EventStream { .. } => EntityCollection::EventStreams,
        }
    }

    /// Full broker path of the entity.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Subscription { topic, name, .. } => subscription_path(topic, name),
            other => other.name().to_string(),
        }
    }

    /// Only the settings that were explicitly configured.
    #[must_use]
    pub fn explicit_settings(&self) -> ExplicitSettings {
        match self {
            Self::Queue { settings, .. } => settings.explicit_settings(),
            Self::Topic { settings, .. } => settings.explicit_settings(),
            Self::Subscription { settings, .. } => settings.explicit_settings(),
            Self::EventStream { settings, .. } => settings.explicit_settings(),
        }
    }
}
