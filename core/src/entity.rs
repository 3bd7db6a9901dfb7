//! Messaging entities addressed by an endpoint.
//!
//! An endpoint targets exactly one [`Entity`]. Rather than a separate consumer,
//! producer and endpoint type per entity kind, each variant answers three
//! capability questions:
//!
//! - where can it be received from ([`Entity::receive_source`])
//! - where are outbound messages sent ([`Entity::send_target`])
//! - which broker-side entities must exist first ([`Entity::provisioning_plan`])

use crate::provisioning::{ProvisioningDescriptor, ProvisioningSettings};
use std::fmt;
use std::str::FromStr;

/// The category of messaging resource named in an endpoint URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A point-to-point queue
    Queue,
    /// A publish/subscribe topic, optionally with a subscription
    Topic,
    /// An append-only event stream
    EventStream,
}

impl EntityKind {
    /// The URI path segment for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Topic => "topic",
            Self::EventStream => "event",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = crate::error::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queue" => Ok(Self::Queue),
            "topic" => Ok(Self::Topic),
            "event" => Ok(Self::EventStream),
            _ => Err(crate::error::ConfigError::UnsupportedEntityKind(s.to_string())),
        }
    }
}

/// Dead-letter sub-queue selection for consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SubQueue {
    /// The entity itself
    #[default]
    None,
    /// The entity's dead-letter sub-queue
    DeadLetter,
    /// The entity's transfer dead-letter sub-queue
    TransferDeadLetter,
}

impl SubQueue {
    /// Path suffix appended to the entity path.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::None => "",
            Self::DeadLetter => "/$DeadLetterQueue",
            Self::TransferDeadLetter => "/$Transfer/$DeadLetterQueue",
        }
    }

    /// Whether this selects a dead-letter sub-queue.
    #[must_use]
    pub const fn is_dead_letter(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl FromStr for SubQueue {
    type Err = crate::error::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "deadletter" => Ok(Self::DeadLetter),
            "transferdeadletter" => Ok(Self::TransferDeadLetter),
            _ => Err(crate::error::ConfigError::InvalidParameter {
                parameter: "subQueue".to_string(),
                value: s.to_string(),
                reason: "expected none, deadLetter or transferDeadLetter".to_string(),
            }),
        }
    }
}

/// The entity an endpoint is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Entity {
    /// A queue
    Queue {
        /// Queue name
        name: String,
    },
    /// A topic; consumers additionally need a subscription
    Topic {
        /// Topic path
        topic: String,
        /// Subscription name, required for consuming
        subscription: Option<String>,
    },
    /// An event stream (send-only for this connector)
    EventStream {
        /// Event stream path
        path: String,
    },
}

impl Entity {
    /// Shorthand for a queue entity.
    pub fn queue(name: impl Into<String>) -> Self {
        Self::Queue { name: name.into() }
    }

    /// Shorthand for a topic entity without a subscription.
    pub fn topic(topic: impl Into<String>) -> Self {
        Self::Topic {
            topic: topic.into(),
            subscription: None,
        }
    }

    /// Shorthand for a topic entity with a subscription.
    pub fn subscription(topic: impl Into<String>, subscription: impl Into<String>) -> Self {
        Self::Topic {
            topic: topic.into(),
            subscription: Some(subscription.into()),
        }
    }

    /// Shorthand for an event stream entity.
    pub fn event_stream(path: impl Into<String>) -> Self {
        Self::EventStream { path: path.into() }
    }

    /// The kind of this entity.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Queue { .. } => EntityKind::Queue,
            Self::Topic { .. } => EntityKind::Topic,
            Self::EventStream { .. } => EntityKind::EventStream,
        }
    }

    /// Where consumers receive from, or `None` if this entity cannot be consumed.
    #[must_use]
    pub fn receive_source(&self, sub_queue: SubQueue) -> Option<ReceiveSource> {
        match self {
            Self::Queue { name } => Some(ReceiveSource::Queue {
                name: name.clone(),
                sub_queue,
            }),
            Self::Topic {
                topic,
                subscription: Some(subscription),
            } => Some(ReceiveSource::Subscription {
                topic: topic.clone(),
                subscription: subscription.clone(),
                sub_queue,
            }),
            Self::Topic {
                subscription: None, ..
            }
            | Self::EventStream { .. } => None,
        }
    }

    /// Where producers send to.
    #[must_use]
    pub fn send_target(&self) -> SendTarget {
        match self {
            Self::Queue { name } => SendTarget::Queue(name.clone()),
            Self::Topic { topic, .. } => SendTarget::Topic(topic.clone()),
            Self::EventStream { path } => SendTarget::EventStream(path.clone()),
        }
    }

    /// Ordered descriptors for the entities that must exist before use.
    ///
    /// For a topic with a subscription the topic comes first.
    #[must_use]
    pub fn provisioning_plan(&self, settings: &ProvisioningSettings) -> Vec<ProvisioningDescriptor> {
        match self {
            Self::Queue { name } => vec![ProvisioningDescriptor::Queue {
                name: name.clone(),
                settings: settings.queue.clone(),
            }],
            Self::Topic {
                topic,
                subscription,
            } => {
                let mut plan = vec![ProvisioningDescriptor::Topic {
                    path: topic.clone(),
                    settings: settings.topic.clone(),
                }];
                if let Some(subscription) = subscription {
                    plan.push(ProvisioningDescriptor::Subscription {
                        topic: topic.clone(),
                        name: subscription.clone(),
                        settings: settings.subscription.clone(),
                    });
                }
                plan
            }
            Self::EventStream { path } => vec![ProvisioningDescriptor::EventStream {
                path: path.clone(),
                settings: settings.event_stream.clone(),
            }],
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue { name } => write!(f, "queue:{name}"),
            Self::Topic {
                topic,
                subscription: Some(subscription),
            } => write!(f, "topic:{topic}/subscriptions/{subscription}"),
            Self::Topic {
                topic,
                subscription: None,
            } => write!(f, "topic:{topic}"),
            Self::EventStream { path } => write!(f, "event:{path}"),
        }
    }
}

/// A receivable entity: a queue or a topic subscription, possibly a sub-queue of either.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReceiveSource {
    /// A queue
    Queue {
        /// Queue name
        name: String,
        /// Sub-queue selection
        sub_queue: SubQueue,
    },
    /// A subscription under a topic
    Subscription {
        /// Topic path
        topic: String,
        /// Subscription name
        subscription: String,
        /// Sub-queue selection
        sub_queue: SubQueue,
    },
}

impl ReceiveSource {
    /// The broker path of this source.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Queue { name, sub_queue } => format!("{name}{}", sub_queue.suffix()),
            Self::Subscription {
                topic,
                subscription,
                sub_queue,
            } => format!("{}{}", subscription_path(topic, subscription), sub_queue.suffix()),
        }
    }

    /// The sub-queue selection.
    #[must_use]
    pub const fn sub_queue(&self) -> SubQueue {
        match self {
            Self::Queue { sub_queue, .. } | Self::Subscription { sub_queue, .. } => *sub_queue,
        }
    }
}

/// A sendable entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SendTarget {
    /// Send to a queue
    Queue(String),
    /// Publish to a topic
    Topic(String),
    /// Publish to an event stream
    EventStream(String),
}

impl SendTarget {
    /// The broker path of this target.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Queue(path) | Self::Topic(path) | Self::EventStream(path) => path,
        }
    }
}

/// Broker path of a subscription under a topic.
#[must_use]
pub fn subscription_path(topic: &str, subscription: &str) -> String {
    format!("{topic}/subscriptions/{subscription}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_without_subscription_is_not_consumable() {
        assert!(Entity::topic("prices").receive_source(SubQueue::None).is_none());
        assert!(Entity::event_stream("telemetry").receive_source(SubQueue::None).is_none());
    }

    #[test]
    fn sub_queue_paths() {
        let source = Entity::subscription("prices", "audit")
            .receive_source(SubQueue::DeadLetter)
            .unwrap();
        assert_eq!(source.path(), "prices/subscriptions/audit/$DeadLetterQueue");

        let source = Entity::queue("orders")
            .receive_source(SubQueue::TransferDeadLetter)
            .unwrap();
        assert_eq!(source.path(), "orders/$Transfer/$DeadLetterQueue");
    }

    #[test]
    fn topic_is_planned_before_subscription() {
        let plan = Entity::subscription("prices", "audit")
            .provisioning_plan(&ProvisioningSettings::default());
        assert_eq!(plan.len(), 2);
        assert!(matches!(plan[0], ProvisioningDescriptor::Topic { .. }));
        assert!(matches!(plan[1], ProvisioningDescriptor::Subscription { .. }));
    }

    #[test]
    fn entity_kind_parses_case_insensitively() {
        assert_eq!("Queue".parse::<EntityKind>().unwrap(), EntityKind::Queue);
        assert_eq!("event".parse::<EntityKind>().unwrap(), EntityKind::EventStream);
        assert!("relay".parse::<EntityKind>().is_err());
    }
}
