//! Time source abstraction.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability
///
/// Brokers stamp lock expiry and enqueue times from a clock; tests inject a
/// fixed one.
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
