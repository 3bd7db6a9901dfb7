//! Integration tests for the lease protocol
//!
//! Drives endpoints, consumers and the completion handler against the
//! in-memory broker and checks which settlement calls reach the broker.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use leasebus_core::broker::{ReceiveMode, ReceiveOptions};
use leasebus_core::entity::{Entity, SubQueue};
use leasebus_core::error::{BrokerError, EndpointError, ProcessingError, ProvisioningError, ReceiveError};
use leasebus_core::exchange::Processor;
use leasebus_core::message::WireMessage;
use leasebus_core::metadata::headers;
use leasebus_core::sink::FailureStage;
use leasebus_core::EndpointConfig;
use leasebus_runtime::completion::CompletionHandler;
use leasebus_runtime::{ConsumerState, Endpoint, LeaseConsumer, StartedEndpoint};
use leasebus_testing::{
    BrokerCall, BrokerOp, InMemoryBroker, RecordingExceptionSink, ScriptedProcessor, Step,
};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

fn orders_broker() -> InMemoryBroker {
    let broker = InMemoryBroker::new();
    broker.add_queue("orders");
    broker
}

fn order(id: &str) -> WireMessage {
    WireMessage::new(format!("order {id}"))
        .with_message_id(id)
        .with_correlation_id(format!("corr-{id}"))
}

async fn start(
    config: EndpointConfig,
    broker: &InMemoryBroker,
) -> (StartedEndpoint, RecordingExceptionSink) {
    let sink = RecordingExceptionSink::new();
    let endpoint = Endpoint::new(config, Arc::new(broker.clone()))
        .with_exception_sink(Arc::new(sink.clone()))
        .start()
        .await
        .unwrap();
    (endpoint, sink)
}

fn queue_config() -> EndpointConfig {
    EndpointConfig::builder(Entity::queue("orders")).build().unwrap()
}

async fn consume_one(endpoint: &StartedEndpoint, processor: &ScriptedProcessor) -> LeaseConsumer {
    let consumer = endpoint
        .create_consumer(Arc::new(processor.clone()))
        .unwrap();
    assert_eq!(consumer.poll().await.unwrap(), 1);
    settle(&consumer).await;
    consumer
}

async fn settle(consumer: &LeaseConsumer) {
    consumer
        .in_flight()
        .wait_idle_timeout(Duration::from_secs(1))
        .await
        .unwrap();
}

fn dead_letter_calls(broker: &InMemoryBroker) -> usize {
    broker
        .calls()
        .iter()
        .filter(|call| matches!(call, BrokerCall::DeadLetter { .. }))
        .count()
}

// ============================================================================
// Commit / rollback
// ============================================================================

#[tokio::test]
async fn success_deletes_exactly_once() {
    let broker = orders_broker();
    broker.enqueue("orders", order("m-1"));
    let (endpoint, sink) = start(queue_config(), &broker).await;
    let processor = ScriptedProcessor::succeeding();

    consume_one(&endpoint, &processor).await;

    assert_eq!(broker.deletes().len(), 1);
    assert!(broker.unlocks().is_empty());
    assert_eq!(broker.leased(), 0);
    assert_eq!(broker.pending("orders"), 0);
    assert!(sink.reports().is_empty());
}

#[tokio::test]
async fn exchange_carries_message_identity_and_headers() {
    let broker = orders_broker();
    broker.enqueue(
        "orders",
        order("m-1").with_application_property("tenant", "acme"),
    );
    let (endpoint, _sink) = start(queue_config(), &broker).await;
    let processor = ScriptedProcessor::succeeding();

    consume_one(&endpoint, &processor).await;

    let seen = processor.processed();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].message_id.as_deref(), Some("m-1"));
    assert_eq!(seen[0].body.as_deref(), Some(b"order m-1".as_slice()));
    assert_eq!(seen[0].metadata.text(headers::CORRELATION_ID), Some("corr-m-1"));
    assert_eq!(seen[0].metadata.text("tenant"), Some("acme"));
    assert_eq!(
        seen[0].metadata.get(headers::DELIVERY_COUNT).and_then(|v| v.as_integer()),
        Some(1)
    );
    assert!(seen[0].metadata.text(headers::LOCK_TOKEN).is_some());
}

#[tokio::test]
async fn failure_unlocks_exactly_once_and_reports_correlation_id() {
    let broker = orders_broker();
    broker.enqueue("orders", order("m-1"));
    let (endpoint, sink) = start(queue_config(), &broker).await;
    let processor = ScriptedProcessor::failing("boom");

    consume_one(&endpoint, &processor).await;

    assert!(broker.deletes().is_empty());
    assert_eq!(broker.unlocks().len(), 1);
    assert_eq!(broker.pending("orders"), 1);

    let reports = sink.at_stage(FailureStage::Processing);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].entity, "orders");
    assert_eq!(reports[0].message_id.as_deref(), Some("m-1"));
    assert_eq!(reports[0].correlation_id.as_deref(), Some("corr-m-1"));
    assert_eq!(reports[0].error, "boom");
    assert_eq!(reports[0].lock_token, broker.unlocks().first().cloned());
}

#[tokio::test]
async fn unlocked_message_is_redelivered() {
    let broker = orders_broker();
    broker.enqueue("orders", order("m-1"));
    let (endpoint, _sink) = start(queue_config(), &broker).await;
    let processor = ScriptedProcessor::scripted([Step::Fail(ProcessingError::new("transient"))], Step::Succeed);

    let consumer = consume_one(&endpoint, &processor).await;
    assert_eq!(consumer.poll().await.unwrap(), 1);
    settle(&consumer).await;

    let seen = processor.processed();
    assert_eq!(seen.len(), 2);
    assert_eq!(
        seen[1].metadata.get(headers::DELIVERY_COUNT).and_then(|v| v.as_integer()),
        Some(2)
    );
    assert_eq!(broker.deletes().len(), 1);
    assert_eq!(broker.pending("orders"), 0);
}

#[tokio::test]
async fn processor_panic_rolls_back() {
    let broker = orders_broker();
    broker.enqueue("orders", order("m-1"));
    let (endpoint, sink) = start(queue_config(), &broker).await;
    let processor = ScriptedProcessor::panicking("processor exploded");

    let consumer = consume_one(&endpoint, &processor).await;

    assert_eq!(broker.unlocks().len(), 1);
    assert!(broker.deletes().is_empty());
    assert_eq!(consumer.state(), ConsumerState::Idle);
    let reports = sink.at_stage(FailureStage::Processing);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].error, "panic: processor exploded");
}

#[tokio::test]
async fn receive_and_delete_makes_no_settlement_calls() {
    let broker = orders_broker();
    broker.enqueue("orders", order("m-1"));
    broker.enqueue("orders", order("m-2"));
    let config = EndpointConfig::builder(Entity::queue("orders"))
        .receive_mode(ReceiveMode::ReceiveAndDelete)
        .build()
        .unwrap();
    let (endpoint, sink) = start(config, &broker).await;
    let processor = ScriptedProcessor::scripted([Step::Succeed], Step::Fail(ProcessingError::new("lost")));

    let consumer = consume_one(&endpoint, &processor).await;
    assert_eq!(consumer.poll().await.unwrap(), 1);
    settle(&consumer).await;

    assert!(broker.deletes().is_empty());
    assert!(broker.unlocks().is_empty());
    assert_eq!(dead_letter_calls(&broker), 0);
    assert_eq!(broker.pending("orders"), 0);
    assert_eq!(broker.leased(), 0);
    assert_eq!(sink.at_stage(FailureStage::Processing).len(), 1);
}

// ============================================================================
// Dead-lettering
// ============================================================================

#[tokio::test]
async fn failure_dead_letters_when_enabled() {
    let broker = orders_broker();
    broker.enqueue("orders", order("m-1"));
    let config = EndpointConfig::builder(Entity::queue("orders"))
        .dead_letter_on_failure(true)
        .build()
        .unwrap();
    let (endpoint, _sink) = start(config, &broker).await;
    let processor = ScriptedProcessor::failing("bad payload");

    consume_one(&endpoint, &processor).await;

    assert_eq!(dead_letter_calls(&broker), 1);
    assert!(broker.unlocks().is_empty());
    assert_eq!(broker.pending("orders"), 0);

    let dead = broker.messages("orders/$DeadLetterQueue");
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].properties.dead_letter_reason.as_deref(), Some("bad payload"));
    assert_eq!(dead[0].properties.dead_letter_source.as_deref(), Some("orders"));
    assert!(
        dead[0]
            .properties
            .dead_letter_error_description
            .as_deref()
            .is_some_and(|description| description.contains("orders"))
    );
}

#[tokio::test]
async fn dead_letter_sub_queue_consumer_abandons_instead() {
    let broker = orders_broker();
    broker.enqueue("orders/$DeadLetterQueue", order("m-1"));
    let config = EndpointConfig::builder(Entity::queue("orders"))
        .sub_queue(SubQueue::DeadLetter)
        .dead_letter_on_failure(true)
        .build()
        .unwrap();
    let (endpoint, _sink) = start(config, &broker).await;
    let processor = ScriptedProcessor::failing("still bad");

    consume_one(&endpoint, &processor).await;

    assert_eq!(dead_letter_calls(&broker), 0);
    assert_eq!(broker.unlocks().len(), 1);
    assert_eq!(broker.pending("orders/$DeadLetterQueue"), 1);
}

// ============================================================================
// Absorbed settlement failures
// ============================================================================

#[tokio::test]
async fn commit_failure_is_absorbed_and_message_redelivered_after_expiry() {
    let broker = orders_broker();
    broker.enqueue("orders", order("m-1"));
    broker.fail_next(BrokerOp::Delete, BrokerError::Transport("connection reset".into()));
    let (endpoint, sink) = start(queue_config(), &broker).await;
    let processor = ScriptedProcessor::succeeding();

    let consumer = consume_one(&endpoint, &processor).await;

    let reports = sink.at_stage(FailureStage::Commit);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].message_id.as_deref(), Some("m-1"));
    assert_eq!(broker.leased(), 1);

    broker.expire_all_locks();
    assert_eq!(consumer.poll().await.unwrap(), 1);
    settle(&consumer).await;

    assert_eq!(processor.count(), 2);
    assert_eq!(broker.leased(), 0);
    assert_eq!(broker.pending("orders"), 0);
}

#[tokio::test]
async fn unlock_failure_is_absorbed() {
    let broker = orders_broker();
    broker.enqueue("orders", order("m-1"));
    broker.fail_next(BrokerOp::Unlock, BrokerError::LockLost("expired".into()));
    let (endpoint, sink) = start(queue_config(), &broker).await;

    consume_one(&endpoint, &ScriptedProcessor::failing("boom")).await;

    assert_eq!(sink.at_stage(FailureStage::Processing).len(), 1);
    assert_eq!(sink.at_stage(FailureStage::Rollback).len(), 1);
}

#[tokio::test]
async fn dead_letter_failure_is_absorbed() {
    let broker = orders_broker();
    broker.enqueue("orders", order("m-1"));
    broker.fail_next(BrokerOp::DeadLetter, BrokerError::Transport("timeout".into()));
    let config = EndpointConfig::builder(Entity::queue("orders"))
        .dead_letter_on_failure(true)
        .build()
        .unwrap();
    let (endpoint, sink) = start(config, &broker).await;

    consume_one(&endpoint, &ScriptedProcessor::failing("boom")).await;

    assert_eq!(sink.at_stage(FailureStage::DeadLetter).len(), 1);
    assert!(broker.unlocks().is_empty());
}

// ============================================================================
// Polling
// ============================================================================

#[tokio::test]
async fn empty_poll_returns_zero_without_processing() {
    let broker = orders_broker();
    let config = EndpointConfig::builder(Entity::queue("orders"))
        .timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    let (endpoint, sink) = start(config, &broker).await;
    let processor = ScriptedProcessor::succeeding();
    let consumer = endpoint.create_consumer(Arc::new(processor.clone())).unwrap();

    assert_eq!(consumer.poll().await.unwrap(), 0);

    assert_eq!(processor.count(), 0);
    assert!(broker.deletes().is_empty());
    assert!(broker.unlocks().is_empty());
    assert!(sink.reports().is_empty());
    assert_eq!(consumer.state(), ConsumerState::Idle);
}

#[tokio::test]
async fn message_without_id_is_ignored() {
    let broker = orders_broker();
    broker.enqueue("orders", WireMessage::new("anonymous"));
    let (endpoint, _sink) = start(queue_config(), &broker).await;
    let processor = ScriptedProcessor::succeeding();
    let consumer = endpoint.create_consumer(Arc::new(processor.clone())).unwrap();

    assert_eq!(consumer.poll().await.unwrap(), 0);
    assert_eq!(processor.count(), 0);
}

#[tokio::test]
async fn poll_does_not_wait_for_processing() {
    let broker = orders_broker();
    broker.enqueue("orders", order("m-1"));
    broker.enqueue("orders", order("m-2"));
    let (endpoint, _sink) = start(queue_config(), &broker).await;
    let processor = ScriptedProcessor::succeeding().gated();
    let consumer = endpoint.create_consumer(Arc::new(processor.clone())).unwrap();

    assert_eq!(consumer.poll().await.unwrap(), 1);
    assert_eq!(consumer.poll().await.unwrap(), 1);
    assert_eq!(consumer.state(), ConsumerState::AwaitingCompletion);
    assert_eq!(consumer.in_flight().count(), 2);
    assert_eq!(broker.leased(), 2);

    processor.release(2);
    settle(&consumer).await;

    assert_eq!(consumer.state(), ConsumerState::Idle);
    assert_eq!(broker.deletes().len(), 2);
}

#[tokio::test]
async fn receive_failure_surfaces_from_poll() {
    let broker = orders_broker();
    let (endpoint, _sink) = start(queue_config(), &broker).await;
    let consumer = endpoint
        .create_consumer(Arc::new(ScriptedProcessor::succeeding()))
        .unwrap();
    broker.fail_next(BrokerOp::Receive, BrokerError::Unauthorized("token expired".into()));

    let error = consumer.poll().await.unwrap_err();
    assert!(matches!(error, ReceiveError::Broker { ref path, .. } if path == "orders"));
}

#[tokio::test]
async fn peek_lock_message_without_lock_token_is_rejected() {
    use leasebus_core::broker::{BrokerClient, BrokerFuture, DeadLetterReason, EntityCollection, EntityInfo};
    use leasebus_core::entity::{ReceiveSource, SendTarget};
    use leasebus_core::provisioning::ProvisioningDescriptor;

    struct LocklessBroker;

    impl BrokerClient for LocklessBroker {
        fn receive<'a>(
            &'a self,
            _source: &'a ReceiveSource,
            _options: ReceiveOptions,
        ) -> BrokerFuture<'a, Option<WireMessage>> {
            Box::pin(async { Ok(Some(order("m-1"))) })
        }
        fn delete<'a>(&'a self, _lock_token: &'a str) -> BrokerFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }
        fn unlock<'a>(&'a self, _lock_token: &'a str) -> BrokerFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }
        fn dead_letter<'a>(
            &'a self,
            _lock_token: &'a str,
            _reason: &'a DeadLetterReason,
        ) -> BrokerFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }
        fn send<'a>(&'a self, _target: &'a SendTarget, _message: WireMessage) -> BrokerFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }
        fn list<'a>(&'a self, _collection: &'a EntityCollection) -> BrokerFuture<'a, Vec<EntityInfo>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn create<'a>(
            &'a self,
            _descriptor: &'a ProvisioningDescriptor,
        ) -> BrokerFuture<'a, Option<EntityInfo>> {
            Box::pin(async { Ok(None) })
        }
    }

    let client: Arc<dyn BrokerClient> = Arc::new(LocklessBroker);
    let sink = Arc::new(RecordingExceptionSink::new());
    let processor = ScriptedProcessor::succeeding();
    let consumer = LeaseConsumer::new(
        Arc::clone(&client),
        Entity::queue("orders").receive_source(SubQueue::None).unwrap(),
        ReceiveOptions::default(),
        Arc::new(processor.clone()),
        Arc::new(CompletionHandler::new(client, sink)),
    );

    let error = consumer.poll().await.unwrap_err();
    assert!(matches!(error, ReceiveError::MissingLockToken { ref message_id } if message_id == "m-1"));
    assert_eq!(processor.count(), 0);
}

// ============================================================================
// Endpoint surface
// ============================================================================

#[tokio::test]
async fn event_stream_endpoint_cannot_consume() {
    let broker = InMemoryBroker::new();
    let config = EndpointConfig::builder(Entity::event_stream("telemetry")).build().unwrap();
    let (endpoint, _sink) = start(config, &broker).await;

    let processor: Arc<dyn Processor> = Arc::new(ScriptedProcessor::succeeding());
    assert!(matches!(
        endpoint.create_consumer(processor),
        Err(EndpointError::NotConsumable(_))
    ));
}

#[tokio::test]
async fn concurrent_consumers_share_in_flight_tracking() {
    let broker = orders_broker();
    let config = EndpointConfig::builder(Entity::queue("orders"))
        .concurrent_consumers(3)
        .build()
        .unwrap();
    let (endpoint, _sink) = start(config, &broker).await;
    let processor: Arc<dyn Processor> = Arc::new(ScriptedProcessor::succeeding());

    let consumers = endpoint.create_consumers(&processor).unwrap();
    assert_eq!(consumers.len(), 3);
    assert_eq!(broker.connect_count(), 1);
}

#[tokio::test]
async fn start_fails_when_connect_fails() {
    let broker = orders_broker();
    broker.fail_next(BrokerOp::Connect, BrokerError::Unauthorized("bad key".into()));

    let result = Endpoint::new(queue_config(), Arc::new(broker.clone())).start().await;

    assert!(matches!(result, Err(EndpointError::Connect(BrokerError::Unauthorized(_)))));
}

#[tokio::test]
async fn start_fails_when_provisioning_fails() {
    let broker = InMemoryBroker::new();
    let config = EndpointConfig::builder(Entity::queue("orders"))
        .auto_create(false)
        .build()
        .unwrap();

    let result = Endpoint::new(config, Arc::new(broker.clone())).start().await;

    assert!(matches!(
        result,
        Err(EndpointError::Provisioning(ProvisioningError::Missing(ref path))) if path == "orders"
    ));
    assert!(broker.creates().is_empty());
}
