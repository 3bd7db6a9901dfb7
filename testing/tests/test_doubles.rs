//! Integration tests for the test doubles themselves

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use leasebus_core::broker::{BrokerClient, BrokerConnector, DeadLetterReason, EntityCollection, ReceiveOptions};
use leasebus_core::entity::{Entity, ReceiveSource, SendTarget, SubQueue};
use leasebus_core::error::{BrokerError, ProcessingError};
use leasebus_core::exchange::{Exchange, Processor};
use leasebus_core::message::WireMessage;
use leasebus_core::sink::{ExceptionSink, FailureReport, FailureStage};
use leasebus_core::EndpointConfig;
use leasebus_testing::{BrokerCall, BrokerOp, InMemoryBroker, RecordingExceptionSink, ScriptedProcessor, Step};
use std::time::Duration;

fn orders() -> ReceiveSource {
    Entity::queue("orders").receive_source(SubQueue::None).unwrap()
}

#[tokio::test]
async fn connector_hands_out_shared_state() {
    let broker = InMemoryBroker::new();
    broker.add_queue("orders");
    let config = EndpointConfig::builder(Entity::queue("orders")).build().unwrap();

    let client = broker.connect(&config).await.unwrap();
    client
        .send(&SendTarget::Queue("orders".into()), WireMessage::new("a"))
        .await
        .unwrap();

    assert_eq!(broker.pending("orders"), 1);
    assert_eq!(broker.connect_count(), 1);
}

#[tokio::test]
async fn dead_letter_records_reason_and_source() {
    let broker = InMemoryBroker::new();
    broker.add_queue("orders");
    broker.enqueue("orders", WireMessage::new("a").with_message_id("m-1"));

    let message = broker.receive(&orders(), ReceiveOptions::default()).await.unwrap().unwrap();
    let token = message.properties.lock_token.unwrap();
    let reason = DeadLetterReason {
        reason: "poison".into(),
        description: "consumer-1".into(),
    };
    broker.dead_letter(&token, &reason).await.unwrap();

    let dead = broker.messages("orders/$DeadLetterQueue");
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].properties.dead_letter_reason.as_deref(), Some("poison"));
    assert_eq!(dead[0].properties.dead_letter_source.as_deref(), Some("orders"));
    assert!(dead[0].properties.lock_token.is_none());
    assert_eq!(
        broker.calls().last(),
        Some(&BrokerCall::DeadLetter {
            lock_token: token,
            reason: "poison".into(),
            description: "consumer-1".into(),
        })
    );
}

#[tokio::test]
async fn receiving_from_missing_entity_fails() {
    let broker = InMemoryBroker::new();
    let error = broker
        .receive(&orders(), ReceiveOptions::default())
        .await
        .unwrap_err();
    assert_eq!(error, BrokerError::NotFound("orders".into()));
}

#[tokio::test]
async fn listing_subscriptions_of_missing_topic_fails() {
    let broker = InMemoryBroker::new();
    let collection = EntityCollection::Subscriptions {
        topic: "prices".into(),
    };
    assert!(matches!(
        broker.list(&collection).await,
        Err(BrokerError::NotFound(_))
    ));
}

#[tokio::test]
async fn failures_queue_per_operation() {
    let broker = InMemoryBroker::new();
    broker.add_queue("orders");
    broker.fail_next(BrokerOp::Receive, BrokerError::Transport("one".into()));
    broker.fail_next(BrokerOp::Receive, BrokerError::Transport("two".into()));

    let options = ReceiveOptions::default();
    assert_eq!(
        broker.receive(&orders(), options).await.unwrap_err(),
        BrokerError::Transport("one".into())
    );
    assert_eq!(
        broker.receive(&orders(), options).await.unwrap_err(),
        BrokerError::Transport("two".into())
    );
    assert_eq!(broker.receive(&orders(), options).await.unwrap(), None);
}

#[tokio::test]
async fn scripted_processor_follows_script_then_fallback() {
    let processor = ScriptedProcessor::scripted(
        [Step::Fail(ProcessingError::new("first")), Step::Succeed],
        Step::Fail(ProcessingError::new("fallback")),
    );

    let results = [
        processor.process(Exchange::new("1")).await,
        processor.process(Exchange::new("2")).await,
        processor.process(Exchange::new("3")).await,
    ];

    assert_eq!(results[0], Err(ProcessingError::new("first")));
    assert_eq!(results[1], Ok(()));
    assert_eq!(results[2], Err(ProcessingError::new("fallback")));
    let bodies: Vec<Vec<u8>> = processor
        .processed()
        .into_iter()
        .map(|seen| seen.body.unwrap())
        .collect();
    assert_eq!(bodies, vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]);
}

#[tokio::test]
async fn gated_processor_waits_for_release() {
    let processor = ScriptedProcessor::succeeding().gated();
    let task = {
        let processor = processor.clone();
        tokio::spawn(async move { processor.process(Exchange::new("x")).await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!task.is_finished());

    processor.release(1);
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap(),
        Ok(())
    );
}

#[test]
fn recording_sink_filters_by_stage() {
    let sink = RecordingExceptionSink::new();
    sink.report(FailureReport::new(FailureStage::Commit, "orders", "a"));
    sink.report(FailureReport::new(FailureStage::Rollback, "orders", "b"));

    assert_eq!(sink.reports().len(), 2);
    assert_eq!(sink.at_stage(FailureStage::Commit)[0].error, "a");

    sink.clear();
    assert!(sink.reports().is_empty());
}
