//! Non-fatal failure reporting.
//!
//! Receive, commit and rollback failures never stop the poll loop. They are
//! handed to an [`ExceptionSink`] instead, so they stay observable.

use std::fmt;

/// Where in the lease lifecycle a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureStage {
    /// The receive call failed
    Receive,
    /// Deleting a processed message failed
    Commit,
    /// Unlocking a failed message failed
    Rollback,
    /// Downstream processing failed
    Processing,
    /// Dead-lettering a failed message failed
    DeadLetter,
}

impl FailureStage {
    /// Lowercase name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Receive => "receive",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
            Self::Processing => "processing",
            Self::DeadLetter => "dead_letter",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One absorbed failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    /// Lifecycle stage
    pub stage: FailureStage,
    /// Entity path involved
    pub entity: String,
    /// Message id, if known
    pub message_id: Option<String>,
    /// Correlation id, if known
    pub correlation_id: Option<String>,
    /// Lock token, if the message was leased
    pub lock_token: Option<String>,
    /// Rendered error
    pub error: String,
}

impl FailureReport {
    /// Start a report for `stage` on `entity`.
    pub fn new(stage: FailureStage, entity: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            stage,
            entity: entity.into(),
            message_id: None,
            correlation_id: None,
            lock_token: None,
            error: error.to_string(),
        }
    }

    /// Attach message identifiers.
    #[must_use]
    pub fn with_ids(mut self, message_id: Option<String>, correlation_id: Option<String>) -> Self {
        self.message_id = message_id;
        self.correlation_id = correlation_id;
        self
    }

    /// Attach the lock token.
    #[must_use]
    pub fn with_lock_token(mut self, lock_token: Option<String>) -> Self {
        self.lock_token = lock_token;
        self
    }
}

/// Receives absorbed failures.
pub trait ExceptionSink: Send + Sync {
    /// Report a failure. Must not block.
    fn report(&self, report: FailureReport);
}

/// Logs every report through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingExceptionSink;

impl ExceptionSink for TracingExceptionSink {
    fn report(&self, report: FailureReport) {
        match report.stage {
            FailureStage::Processing => tracing::error!(
                stage = %report.stage,
                entity = %report.entity,
                message_id = ?report.message_id,
                correlation_id = ?report.correlation_id,
                error = %report.error,
                "Downstream processing failed"
            ),
            _ => tracing::warn!(
                stage = %report.stage,
                entity = %report.entity,
                message_id = ?report.message_id,
                correlation_id = ?report.correlation_id,
                lock_token = ?report.lock_token,
                error = %report.error,
                "Absorbed broker failure"
            ),
        }
    }
}
