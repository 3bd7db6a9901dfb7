//! In-memory broker with peek-lock semantics.
//!
//! Implements both [`BrokerClient`] and [`BrokerConnector`], records every
//! call, and lets tests inject failures and expire locks.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Only panics on a poisoned mutex

use crate::mocks::test_clock;
use chrono::Duration as ChronoDuration;
use leasebus_core::broker::{
    BrokerClient, BrokerConnector, BrokerFuture, DeadLetterReason, EntityCollection, EntityInfo,
    ReceiveMode, ReceiveOptions,
};
use leasebus_core::clock::Clock;
use leasebus_core::config::EndpointConfig;
use leasebus_core::entity::{ReceiveSource, SendTarget, SubQueue, subscription_path};
use leasebus_core::error::BrokerError;
use leasebus_core::message::WireMessage;
use leasebus_core::provisioning::{ExplicitSettings, ProvisioningDescriptor};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Lock duration applied to every lease.
pub const LOCK_DURATION_SECS: i64 = 60;

/// A recorded broker call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    /// `connect`
    Connect,
    /// `receive`
    Receive {
        /// Source path
        path: String,
        /// Receive mode
        mode: ReceiveMode,
    },
    /// `delete`
    Delete {
        /// Lock token
        lock_token: String,
    },
    /// `unlock`
    Unlock {
        /// Lock token
        lock_token: String,
    },
    /// `dead_letter`
    DeadLetter {
        /// Lock token
        lock_token: String,
        /// Reason
        reason: String,
        /// Description
        description: String,
    },
    /// `send`
    Send {
        /// Target path
        path: String,
        /// Message id
        message_id: Option<String>,
    },
    /// `list`
    List {
        /// Listed collection
        collection: EntityCollection,
    },
    /// `create`
    Create {
        /// Entity path
        path: String,
        /// Settings sent with the create request
        settings: ExplicitSettings,
    },
}

/// Operation selector for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerOp {
    /// `connect`
    Connect,
    /// `receive`
    Receive,
    /// `delete`
    Delete,
    /// `unlock`
    Unlock,
    /// `dead_letter`
    DeadLetter,
    /// `send`
    Send,
    /// `list`
    List,
    /// `create`
    Create,
}

#[derive(Debug)]
struct Lease {
    path: String,
    message: WireMessage,
}

#[derive(Debug, Default)]
struct State {
    queues: BTreeSet<String>,
    topics: BTreeMap<String, BTreeSet<String>>,
    event_streams: BTreeSet<String>,
    mailboxes: HashMap<String, VecDeque<WireMessage>>,
    leases: HashMap<String, Lease>,
    calls: Vec<BrokerCall>,
    failures: HashMap<BrokerOp, VecDeque<BrokerError>>,
    next_sequence: i64,
}

impl State {
    fn take_failure(&mut self, op: BrokerOp) -> Result<(), BrokerError> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn source_exists(&self, source: &ReceiveSource) -> bool {
        match source {
            ReceiveSource::Queue { name, .. } => self.queues.contains(name),
            ReceiveSource::Subscription {
                topic, subscription, ..
            } => self
                .topics
                .get(topic)
                .is_some_and(|subs| subs.contains(subscription)),
        }
    }

    fn release(&mut self, lease: Lease) {
        let mut message = lease.message;
        clear_lock(&mut message);
        self.mailboxes
            .entry(lease.path)
            .or_default()
            .push_front(message);
    }
}

fn contains_ignore_case(names: &BTreeSet<String>, name: &str) -> bool {
    names.iter().any(|candidate| candidate.eq_ignore_ascii_case(name))
}

fn clear_lock(message: &mut WireMessage) {
    message.properties.lock_token = None;
    message.properties.lock_location = None;
    message.properties.locked_until = None;
}

/// Shared in-memory broker.
///
/// Clones share state, so a test can keep one handle for assertions while the
/// endpoint under test holds another.
///
/// # Example
///
/// ```
/// use leasebus_testing::InMemoryBroker;
/// use leasebus_core::WireMessage;
///
/// let broker = InMemoryBroker::new();
/// broker.add_queue("orders");
/// broker.enqueue("orders", WireMessage::new("hello"));
/// assert_eq!(broker.pending("orders"), 1);
/// ```
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBroker")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl InMemoryBroker {
    /// An empty broker stamped by [`test_clock`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(test_clock()))
    }

    /// An empty broker stamped by `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Add a queue.
    pub fn add_queue(&self, name: &str) {
        self.state().queues.insert(name.to_string());
    }

    /// Add a topic.
    pub fn add_topic(&self, name: &str) {
        self.state().topics.entry(name.to_string()).or_default();
    }

    /// Add a subscription, creating its topic if needed.
    pub fn add_subscription(&self, topic: &str, subscription: &str) {
        self.state()
            .topics
            .entry(topic.to_string())
            .or_default()
            .insert(subscription.to_string());
    }

    /// Add an event stream.
    pub fn add_event_stream(&self, path: &str) {
        self.state().event_streams.insert(path.to_string());
    }

    /// Make a message available at `path` without recording a send.
    pub fn enqueue(&self, path: &str, mut message: WireMessage) {
        let mut state = self.state();
        state.next_sequence += 1;
        message.properties.sequence_number = Some(state.next_sequence);
        message.properties.enqueued_time = Some(self.clock.now());
        state
            .mailboxes
            .entry(path.to_string())
            .or_default()
            .push_back(message);
    }

    /// Messages available (not leased) at `path`.
    #[must_use]
    pub fn pending(&self, path: &str) -> usize {
        self.state().mailboxes.get(path).map_or(0, VecDeque::len)
    }

    /// Copies of the messages available at `path`.
    #[must_use]
    pub fn messages(&self, path: &str) -> Vec<WireMessage> {
        self.state()
            .mailboxes
            .get(path)
            .map(|mailbox| mailbox.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of outstanding leases.
    #[must_use]
    pub fn leased(&self) -> usize {
        self.state().leases.len()
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<BrokerCall> {
        self.state().calls.clone()
    }

    /// Lock tokens passed to `delete`.
    #[must_use]
    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BrokerCall::Delete { lock_token } => Some(lock_token),
                _ => None,
            })
            .collect()
    }

    /// Lock tokens passed to `unlock`.
    #[must_use]
    pub fn unlocks(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BrokerCall::Unlock { lock_token } => Some(lock_token),
                _ => None,
            })
            .collect()
    }

    /// `(path, settings)` of every create call.
    #[must_use]
    pub fn creates(&self) -> Vec<(String, ExplicitSettings)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BrokerCall::Create { path, settings } => Some((path, settings)),
                _ => None,
            })
            .collect()
    }

    /// Number of `connect` calls.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, BrokerCall::Connect))
            .count()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Make the next call of `op` fail with `error`. Queued per operation.
    pub fn fail_next(&self, op: BrokerOp, error: BrokerError) {
        self.state().failures.entry(op).or_default().push_back(error);
    }

    /// Expire the lease `lock_token`, making the message available again.
    ///
    /// Returns `false` if no such lease is outstanding.
    pub fn expire_lock(&self, lock_token: &str) -> bool {
        let mut state = self.state();
        match state.leases.remove(lock_token) {
            Some(lease) => {
                state.release(lease);
                true
            }
            None => false,
        }
    }

    /// Expire every outstanding lease.
    pub fn expire_all_locks(&self) {
        let mut state = self.state();
        let leases: Vec<Lease> = state.leases.drain().map(|(_, lease)| lease).collect();
        for lease in leases {
            state.release(lease);
        }
    }

    fn settle(&self, call: BrokerCall, op: BrokerOp, lock_token: &str) -> Result<Lease, BrokerError> {
        let mut state = self.state();
        state.calls.push(call);
        state.take_failure(op)?;
        state
            .leases
            .remove(lock_token)
            .ok_or_else(|| BrokerError::LockLost(lock_token.to_string()))
    }
}

impl BrokerClient for InMemoryBroker {
    fn receive<'a>(
        &'a self,
        source: &'a ReceiveSource,
        options: ReceiveOptions,
    ) -> BrokerFuture<'a, Option<WireMessage>> {
        Box::pin(async move {
            let path = source.path();
            let mut state = self.state();
            state.calls.push(BrokerCall::Receive {
                path: path.clone(),
                mode: options.mode,
            });
            state.take_failure(BrokerOp::Receive)?;
            if !state.source_exists(source) {
                return Err(BrokerError::NotFound(path));
            }

            let Some(mut message) = state.mailboxes.get_mut(&path).and_then(VecDeque::pop_front)
            else {
                return Ok(None);
            };
            message.properties.delivery_count =
                Some(message.properties.delivery_count.unwrap_or(0) + 1);

            match options.mode {
                ReceiveMode::PeekLock => {
                    let token = Uuid::new_v4().to_string();
                    message.properties.lock_token = Some(token.clone());
                    message.properties.lock_location = Some(format!("Lock://{token}"));
                    message.properties.locked_until =
                        Some(self.clock.now() + ChronoDuration::seconds(LOCK_DURATION_SECS));
                    state.leases.insert(
                        token,
                        Lease {
                            path,
                            message: message.clone(),
                        },
                    );
                }
                ReceiveMode::ReceiveAndDelete => clear_lock(&mut message),
            }
            Ok(Some(message))
        })
    }

    fn delete<'a>(&'a self, lock_token: &'a str) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            let call = BrokerCall::Delete {
                lock_token: lock_token.to_string(),
            };
            self.settle(call, BrokerOp::Delete, lock_token).map(|_| ())
        })
    }

    fn unlock<'a>(&'a self, lock_token: &'a str) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            let call = BrokerCall::Unlock {
                lock_token: lock_token.to_string(),
            };
            let lease = self.settle(call, BrokerOp::Unlock, lock_token)?;
            self.state().release(lease);
            Ok(())
        })
    }

    fn dead_letter<'a>(
        &'a self,
        lock_token: &'a str,
        reason: &'a DeadLetterReason,
    ) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            let call = BrokerCall::DeadLetter {
                lock_token: lock_token.to_string(),
                reason: reason.reason.clone(),
                description: reason.description.clone(),
            };
            let lease = self.settle(call, BrokerOp::DeadLetter, lock_token)?;
            let mut message = lease.message;
            clear_lock(&mut message);
            message.properties.dead_letter_reason = Some(reason.reason.clone());
            message.properties.dead_letter_error_description = Some(reason.description.clone());
            message.properties.dead_letter_source = Some(lease.path.clone());
            self.state()
                .mailboxes
                .entry(format!("{}{}", lease.path, SubQueue::DeadLetter.suffix()))
                .or_default()
                .push_back(message);
            Ok(())
        })
    }

    fn send<'a>(&'a self, target: &'a SendTarget, mut message: WireMessage) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            clear_lock(&mut message);
            message.properties.delivery_count = None;
            let destinations: Vec<String> = {
                let mut state = self.state();
                state.calls.push(BrokerCall::Send {
                    path: target.path().to_string(),
                    message_id: message.properties.message_id.clone(),
                });
                state.take_failure(BrokerOp::Send)?;
                match target {
                    SendTarget::Queue(name) if state.queues.contains(name) => vec![name.clone()],
                    SendTarget::Topic(topic) if state.topics.contains_key(topic) => state.topics
                        [topic]
                        .iter()
                        .map(|subscription| subscription_path(topic, subscription))
                        .collect(),
                    SendTarget::EventStream(path) if state.event_streams.contains(path) => {
                        vec![path.clone()]
                    }
                    other => return Err(BrokerError::NotFound(other.path().to_string())),
                }
            };
            for destination in destinations {
                self.enqueue(&destination, message.clone());
            }
            Ok(())
        })
    }

    fn list<'a>(&'a self, collection: &'a EntityCollection) -> BrokerFuture<'a, Vec<EntityInfo>> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(BrokerCall::List {
                collection: collection.clone(),
            });
            state.take_failure(BrokerOp::List)?;
            let names: Vec<String> = match collection {
                EntityCollection::Queues => state.queues.iter().cloned().collect(),
                EntityCollection::Topics => state.topics.keys().cloned().collect(),
                EntityCollection::Subscriptions { topic } => state
                    .topics
                    .get(topic)
                    .ok_or_else(|| BrokerError::NotFound(topic.clone()))?
                    .iter()
                    .cloned()
                    .collect(),
                EntityCollection::EventStreams => state.event_streams.iter().cloned().collect(),
            };
            Ok(names.into_iter().map(EntityInfo::new).collect())
        })
    }

    fn create<'a>(
        &'a self,
        descriptor: &'a ProvisioningDescriptor,
    ) -> BrokerFuture<'a, Option<EntityInfo>> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(BrokerCall::Create {
                path: descriptor.path(),
                settings: descriptor.explicit_settings(),
            });
            state.take_failure(BrokerOp::Create)?;

            let name = descriptor.name();
            let already = match descriptor {
                ProvisioningDescriptor::Queue { .. } => contains_ignore_case(&state.queues, name),
                ProvisioningDescriptor::Topic { .. } => state
                    .topics
                    .keys()
                    .any(|topic| topic.eq_ignore_ascii_case(name)),
                ProvisioningDescriptor::Subscription { topic, .. } => {
                    let subscriptions = state
                        .topics
                        .get(topic)
                        .ok_or_else(|| BrokerError::NotFound(topic.clone()))?;
                    contains_ignore_case(subscriptions, name)
                }
                ProvisioningDescriptor::EventStream { .. } => {
                    contains_ignore_case(&state.event_streams, name)
                }
            };
            if already {
                return Err(BrokerError::AlreadyExists(descriptor.path()));
            }

            let name = name.to_string();
            match descriptor {
                ProvisioningDescriptor::Queue { .. } => {
                    state.queues.insert(name.clone());
                }
                ProvisioningDescriptor::Topic { .. } => {
                    state.topics.entry(name.clone()).or_default();
                }
                ProvisioningDescriptor::Subscription { topic, .. } => {
                    state
                        .topics
                        .entry(topic.clone())
                        .or_default()
                        .insert(name.clone());
                }
                ProvisioningDescriptor::EventStream { .. } => {
                    state.event_streams.insert(name.clone());
                }
            }
            Ok(Some(EntityInfo::new(name)))
        })
    }
}

impl BrokerConnector for InMemoryBroker {
    fn connect<'a>(&'a self, _config: &'a EndpointConfig) -> BrokerFuture<'a, Arc<dyn BrokerClient>> {
        Box::pin(async move {
            {
                let mut state = self.state();
                state.calls.push(BrokerCall::Connect);
                state.take_failure(BrokerOp::Connect)?;
            }
            Ok(Arc::new(self.clone()) as Arc<dyn BrokerClient>)
        })
    }
}
