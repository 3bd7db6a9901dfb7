//! # Leasebus Testing
//!
//! Test doubles for the leasebus runtime:
//!
//! - [`InMemoryBroker`]: a peek-lock broker with call recording and fault injection
//! - [`ScriptedProcessor`]: a downstream processor that succeeds, fails or panics on cue
//! - [`RecordingExceptionSink`]: keeps absorbed failures for assertions
//! - [`FixedClock`]: deterministic time for lock expiry and enqueue stamps
//!
//! ## Example
//!
//! ```ignore
//! use leasebus_testing::{InMemoryBroker, ScriptedProcessor};
//! use leasebus_runtime::Endpoint;
//!
//! #[tokio::test]
//! async fn commits_on_success() {
//!     let broker = InMemoryBroker::new();
//!     broker.add_queue("orders");
//!     broker.enqueue("orders", WireMessage::new("hi").with_message_id("m-1"));
//!
//!     let endpoint = Endpoint::new(config, Arc::new(broker.clone())).start().await?;
//!     let consumer = endpoint.create_consumer(Arc::new(ScriptedProcessor::succeeding()))?;
//!     consumer.poll().await?;
//!     consumer.in_flight().wait_idle().await;
//!
//!     assert_eq!(broker.deletes().len(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use leasebus_core::clock::Clock;

/// In-memory broker
pub mod broker;

/// Scripted processor
pub mod processor;

/// Recording exception sink
pub mod sink;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making lock expiry stamps reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use leasebus_testing::mocks::FixedClock;
    /// use leasebus_core::clock::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which it does not.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

pub use broker::{BrokerCall, BrokerOp, InMemoryBroker};
pub use mocks::{FixedClock, test_clock};
pub use processor::{ProcessedExchange, ScriptedProcessor, Step};
pub use sink::RecordingExceptionSink;
