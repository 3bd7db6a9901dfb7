//! Integration tests for idempotent entity provisioning

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use leasebus_core::entity::Entity;
use leasebus_core::error::{BrokerError, ProvisioningError};
use leasebus_core::provisioning::{ProvisioningSettings, QueueSettings, SettingValue};
use leasebus_core::EndpointConfig;
use leasebus_runtime::{EntityProvisioner, ProvisioningStatus};
use leasebus_testing::{BrokerCall, BrokerOp, InMemoryBroker};
use std::sync::Arc;
use std::time::Duration;

fn provisioner(broker: &InMemoryBroker) -> EntityProvisioner {
    EntityProvisioner::new(Arc::new(broker.clone()))
}

#[tokio::test]
async fn ensure_exists_is_idempotent() {
    let broker = InMemoryBroker::new();
    let config = EndpointConfig::builder(Entity::queue("orders")).build().unwrap();

    let first = provisioner(&broker).ensure_exists(&config).await.unwrap();
    let second = provisioner(&broker).ensure_exists(&config).await.unwrap();

    assert_eq!(broker.creates().len(), 1);
    assert_eq!(first.status_of("orders"), Some(ProvisioningStatus::Created));
    assert_eq!(second.status_of("orders"), Some(ProvisioningStatus::AlreadyPresent));
    assert_eq!(second.created(), 0);
}

#[tokio::test]
async fn create_sends_only_explicit_settings() {
    let broker = InMemoryBroker::new();
    let config =
        EndpointConfig::from_uri("leasebus://queue?queueName=orders&defaultMessageTimeToLive=3600")
            .unwrap();

    provisioner(&broker).ensure_exists(&config).await.unwrap();

    assert_eq!(
        broker.creates(),
        vec![(
            "orders".to_string(),
            vec![(
                "defaultMessageTimeToLive",
                SettingValue::Duration(Duration::from_secs(3600))
            )]
        )]
    );
}

#[tokio::test]
async fn builder_settings_reach_create_call() {
    let broker = InMemoryBroker::new();
    let settings = ProvisioningSettings {
        queue: QueueSettings {
            max_delivery_count: Some(5),
            requires_session: Some(true),
            ..QueueSettings::default()
        },
        ..ProvisioningSettings::default()
    };
    let config = EndpointConfig::builder(Entity::queue("orders"))
        .provisioning(settings)
        .build()
        .unwrap();

    provisioner(&broker).ensure_exists(&config).await.unwrap();

    let (_, sent) = broker.creates().pop().unwrap();
    assert!(sent.contains(&("maxDeliveryCount", SettingValue::Count(5))));
    assert!(sent.contains(&("requiresSession", SettingValue::Flag(true))));
    assert_eq!(sent.len(), 2);
}

#[tokio::test]
async fn existing_topic_gets_only_its_missing_subscription() {
    let broker = InMemoryBroker::new();
    broker.add_topic("prices");
    let config = EndpointConfig::builder(Entity::subscription("prices", "audit"))
        .build()
        .unwrap();

    let report = provisioner(&broker).ensure_exists(&config).await.unwrap();

    let created: Vec<String> = broker.creates().into_iter().map(|(path, _)| path).collect();
    assert_eq!(created, vec!["prices/subscriptions/audit".to_string()]);
    assert_eq!(report.status_of("prices"), Some(ProvisioningStatus::AlreadyPresent));
    assert_eq!(
        report.status_of("prices/subscriptions/audit"),
        Some(ProvisioningStatus::Created)
    );
}

#[tokio::test]
async fn topic_is_created_before_its_subscription() {
    let broker = InMemoryBroker::new();
    let config = EndpointConfig::builder(Entity::subscription("prices", "audit"))
        .build()
        .unwrap();

    provisioner(&broker).ensure_exists(&config).await.unwrap();

    let created: Vec<String> = broker.creates().into_iter().map(|(path, _)| path).collect();
    assert_eq!(created, vec!["prices".to_string(), "prices/subscriptions/audit".to_string()]);
}

#[tokio::test]
async fn names_match_case_insensitively() {
    let broker = InMemoryBroker::new();
    broker.add_queue("Orders");
    let config = EndpointConfig::builder(Entity::queue("orders")).build().unwrap();

    let report = provisioner(&broker).ensure_exists(&config).await.unwrap();

    assert!(broker.creates().is_empty());
    assert_eq!(report.status_of("orders"), Some(ProvisioningStatus::AlreadyPresent));
}

#[tokio::test]
async fn concurrent_creation_is_tolerated() {
    let broker = InMemoryBroker::new();
    broker.fail_next(BrokerOp::Create, BrokerError::AlreadyExists("orders".into()));
    let config = EndpointConfig::builder(Entity::queue("orders")).build().unwrap();

    let report = provisioner(&broker).ensure_exists(&config).await.unwrap();

    assert_eq!(
        report.status_of("orders"),
        Some(ProvisioningStatus::CreatedConcurrently)
    );
}

#[tokio::test]
async fn create_failure_stops_provisioning() {
    let broker = InMemoryBroker::new();
    broker.fail_next(BrokerOp::Create, BrokerError::QuotaExceeded("topic limit".into()));
    let config = EndpointConfig::builder(Entity::subscription("prices", "audit"))
        .build()
        .unwrap();

    let error = provisioner(&broker).ensure_exists(&config).await.unwrap_err();

    assert!(matches!(
        error,
        ProvisioningError::CreateFailed { ref entity, source: BrokerError::QuotaExceeded(_) }
            if entity == "prices"
    ));
    assert_eq!(broker.creates().len(), 1);
}

#[tokio::test]
async fn list_failure_stops_provisioning() {
    let broker = InMemoryBroker::new();
    broker.fail_next(BrokerOp::List, BrokerError::Unauthorized("no manage claim".into()));
    let config = EndpointConfig::builder(Entity::queue("orders")).build().unwrap();

    let error = provisioner(&broker).ensure_exists(&config).await.unwrap_err();

    assert!(matches!(error, ProvisioningError::ListFailed { .. }));
    assert!(
        !broker
            .calls()
            .iter()
            .any(|call| matches!(call, BrokerCall::Create { .. }))
    );
}

#[tokio::test]
async fn missing_entity_without_auto_create_is_an_error() {
    let broker = InMemoryBroker::new();
    let config = EndpointConfig::builder(Entity::queue("orders"))
        .auto_create(false)
        .build()
        .unwrap();

    let error = provisioner(&broker).ensure_exists(&config).await.unwrap_err();

    assert!(matches!(error, ProvisioningError::Missing(ref path) if path == "orders"));
    assert!(broker.creates().is_empty());
}

#[tokio::test]
async fn event_stream_is_provisioned() {
    let broker = InMemoryBroker::new();
    let config = EndpointConfig::from_uri(
        "leasebus://event?eventStreamPath=telemetry&partitionCount=4",
    )
    .unwrap();

    let report = provisioner(&broker).ensure_exists(&config).await.unwrap();

    assert_eq!(report.status_of("telemetry"), Some(ProvisioningStatus::Created));
    assert_eq!(
        broker.creates(),
        vec![(
            "telemetry".to_string(),
            vec![("partitionCount", SettingValue::Count(4))]
        )]
    );
}
