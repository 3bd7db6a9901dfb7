//! # Leasebus Runtime
//!
//! The policy layer that drives a [`BrokerClient`](leasebus_core::BrokerClient):
//!
//! - **`EntityProvisioner`**: idempotent check-then-create at endpoint start
//! - **`LeaseConsumer`**: receives at most one message per poll and hands it downstream
//! - **`CompletionHandler`**: deletes, unlocks or dead-letters once processing finishes
//! - **`OutboundSender`**: translates and sends outbound exchanges
//! - **`Endpoint`** and **`PollScheduler`**: lifecycle and poll cadence
//!
//! ## Example
//!
//! ```ignore
//! use leasebus_core::EndpointConfig;
//! use leasebus_runtime::{Endpoint, PollScheduler};
//!
//! let config = EndpointConfig::from_uri("leasebus://queue?queueName=orders&timeout=500")?;
//! let endpoint = Endpoint::new(config, connector).start().await?;
//!
//! let consumers = endpoint.create_consumers(&processor)?;
//! let handle = PollScheduler::default().spawn(consumers);
//!
//! // ... later
//! handle.drain(Duration::from_secs(30)).await?;
//! endpoint.stop();
//! ```

/// Commit/rollback of leased messages
pub mod completion;

/// Poll-driven lease consumer
pub mod consumer;

/// Endpoint lifecycle
pub mod endpoint;

/// In-flight settlement tracking
pub mod inflight;

/// Prometheus metrics for observability
pub mod metrics;

/// Idempotent entity provisioning
pub mod provisioner;

/// Fixed-cadence poll loops
pub mod scheduler;

/// Outbound sends
pub mod sender;

pub use completion::{CompletionHandler, PendingCompletion, Settlement};
pub use consumer::{ConsumerState, LeaseConsumer};
pub use endpoint::{Endpoint, StartedEndpoint};
pub use inflight::InFlight;
pub use provisioner::{EntityProvisioner, ProvisioningReport, ProvisioningStatus};
pub use scheduler::{PollScheduler, SchedulerHandle};
pub use sender::OutboundSender;
