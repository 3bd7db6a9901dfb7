//! Commit/rollback of leased messages once downstream processing finishes.
//!
//! Each received message yields one [`PendingCompletion`]. It is move-only and
//! [`CompletionHandler::complete`] consumes it, so a message is settled at
//! most once and exactly one of commit or rollback runs for it.
//!
//! | Mode | Outcome | Broker call |
//! |---|---|---|
//! | peek-lock | committed | `delete(token)` |
//! | peek-lock | rolled back | `unlock(token)`, or `dead_letter(token)` when enabled |
//! | receive-and-delete | either | none |
//!
//! Broker failures during settlement are reported to the exception sink and
//! otherwise ignored: the lock expires on its own and the message is
//! redelivered.

use crate::metrics::LeaseMetrics;
use leasebus_core::broker::{BrokerClient, DeadLetterReason, ReceiveMode};
use leasebus_core::config::EndpointConfig;
use leasebus_core::error::{CommitError, ProcessingError, RollbackError};
use leasebus_core::exchange::CompletionOutcome;
use leasebus_core::message::{LeaseEnvelope, LeaseLock};
use leasebus_core::sink::{ExceptionSink, FailureReport, FailureStage};
use std::sync::Arc;
use std::time::Instant;

/// Everything needed to settle one received message.
#[derive(Debug)]
pub struct PendingCompletion {
    source_path: String,
    message_id: Option<String>,
    correlation_id: Option<String>,
    mode: ReceiveMode,
    lock: Option<LeaseLock>,
    received_at: Instant,
}

impl PendingCompletion {
    /// Capture the settlement state of a received envelope.
    #[must_use]
    pub fn from_envelope(envelope: &LeaseEnvelope) -> Self {
        let properties = &envelope.message.properties;
        Self {
            source_path: envelope.source_path.clone(),
            message_id: envelope.message.message_id().map(str::to_string),
            correlation_id: properties.correlation_id.clone(),
            mode: envelope.mode,
            lock: envelope.lock(),
            received_at: Instant::now(),
        }
    }

    /// Entity the message was received from.
    #[must_use]
    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    /// Message id.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Correlation id.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// The lease, absent in receive-and-delete mode.
    #[must_use]
    pub const fn lock(&self) -> Option<&LeaseLock> {
        self.lock.as_ref()
    }

    /// Mode the message was received in.
    #[must_use]
    pub const fn mode(&self) -> ReceiveMode {
        self.mode
    }

    fn report(&self, stage: FailureStage, error: impl std::fmt::Display) -> FailureReport {
        FailureReport::new(stage, self.source_path.clone(), error)
            .with_ids(self.message_id.clone(), self.correlation_id.clone())
            .with_lock_token(self.lock.as_ref().map(|lock| lock.token.clone()))
    }
}

/// What settlement did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Deleted after successful processing
    Deleted,
    /// Released for redelivery after failed processing
    Unlocked,
    /// Moved to the dead-letter sub-queue after failed processing
    DeadLettered,
    /// Received in receive-and-delete mode; nothing to settle
    SettledOnReceive,
    /// The settlement call failed; the lock will expire on its own
    LeftToExpire,
}

/// Settles leased messages.
pub struct CompletionHandler {
    client: Arc<dyn BrokerClient>,
    sink: Arc<dyn ExceptionSink>,
    dead_letter_failures: bool,
    consumer_name: String,
}

impl CompletionHandler {
    /// Create a handler that unlocks failed messages.
    #[must_use]
    pub fn new(client: Arc<dyn BrokerClient>, sink: Arc<dyn ExceptionSink>) -> Self {
        Self {
            client,
            sink,
            dead_letter_failures: false,
            consumer_name: "leasebus".to_string(),
        }
    }

    /// Create a handler with the dead-letter policy of `config`.
    ///
    /// Failed messages are dead-lettered only when `deadLetterOnFailure` is set
    /// and the consumer is not itself reading a dead-letter sub-queue; messages
    /// read from a sub-queue are abandoned instead.
    #[must_use]
    pub fn for_endpoint(
        client: Arc<dyn BrokerClient>,
        sink: Arc<dyn ExceptionSink>,
        config: &EndpointConfig,
    ) -> Self {
        Self::new(client, sink)
            .with_dead_letter_on_failure(
                config.dead_letter_on_failure() && !config.sub_queue().is_dead_letter(),
            )
            .with_consumer_name(format!("leasebus consumer of {}", config.entity()))
    }

    /// Dead-letter failed messages instead of unlocking them.
    #[must_use]
    pub const fn with_dead_letter_on_failure(mut self, enabled: bool) -> Self {
        self.dead_letter_failures = enabled;
        self
    }

    /// Name recorded as the dead-letter description.
    #[must_use]
    pub fn with_consumer_name(mut self, name: impl Into<String>) -> Self {
        self.consumer_name = name.into();
        self
    }

    /// Settle one message according to its processing outcome.
    pub async fn complete(&self, pending: PendingCompletion, outcome: CompletionOutcome) -> Settlement {
        match outcome {
            CompletionOutcome::Committed => self.on_commit(pending).await,
            CompletionOutcome::RolledBack(error) => self.on_rollback(pending, &error).await,
        }
    }

    async fn on_commit(&self, pending: PendingCompletion) -> Settlement {
        LeaseMetrics::record_processing(pending.received_at.elapsed());

        let Some(lock) = pending.lock.as_ref() else {
            tracing::debug!(
                entity = %pending.source_path,
                message_id = ?pending.message_id,
                "Processed message received in receive-and-delete mode"
            );
            return Settlement::SettledOnReceive;
        };

        match self.client.delete(&lock.token).await {
            Ok(()) => {
                tracing::debug!(
                    entity = %pending.source_path,
                    message_id = ?pending.message_id,
                    lock_token = %lock.token,
                    "Committed message"
                );
                LeaseMetrics::record_commit();
                Settlement::Deleted
            }
            Err(source) => {
                let error = CommitError {
                    message_id: pending.message_id.clone(),
                    lock_token: lock.token.clone(),
                    source,
                };
                tracing::warn!(
                    entity = %pending.source_path,
                    error = %error,
                    "Commit failed, message will be redelivered after lock expiry"
                );
                LeaseMetrics::record_commit_error();
                self.sink.report(pending.report(FailureStage::Commit, &error));
                Settlement::LeftToExpire
            }
        }
    }

    async fn on_rollback(&self, pending: PendingCompletion, failure: &ProcessingError) -> Settlement {
        LeaseMetrics::record_processing(pending.received_at.elapsed());

        let mut report = pending.report(FailureStage::Processing, failure);
        if let Some(kind) = failure.kind() {
            report.error = format!("{kind}: {}", report.error);
        }
        self.sink.report(report);

        let Some(lock) = pending.lock.as_ref() else {
            tracing::warn!(
                entity = %pending.source_path,
                message_id = ?pending.message_id,
                error = %failure,
                "Processing failed for message received in receive-and-delete mode; it is lost"
            );
            return Settlement::SettledOnReceive;
        };

        if self.dead_letter_failures {
            let reason = DeadLetterReason {
                reason: failure.message().to_string(),
                description: self.consumer_name.clone(),
            };
            return match self.client.dead_letter(&lock.token, &reason).await {
                Ok(()) => {
                    tracing::debug!(
                        entity = %pending.source_path,
                        message_id = ?pending.message_id,
                        lock_token = %lock.token,
                        "Dead-lettered failed message"
                    );
                    LeaseMetrics::record_dead_letter();
                    Settlement::DeadLettered
                }
                Err(source) => {
                    let error = RollbackError::DeadLetter {
                        message_id: pending.message_id.clone(),
                        lock_token: lock.token.clone(),
                        source,
                    };
                    self.absorb(&pending, FailureStage::DeadLetter, &error)
                }
            };
        }

        match self.client.unlock(&lock.token).await {
            Ok(()) => {
                tracing::debug!(
                    entity = %pending.source_path,
                    message_id = ?pending.message_id,
                    lock_token = %lock.token,
                    "Unlocked failed message"
                );
                LeaseMetrics::record_rollback();
                Settlement::Unlocked
            }
            Err(source) => {
                let error = RollbackError::Unlock {
                    message_id: pending.message_id.clone(),
                    lock_token: lock.token.clone(),
                    source,
                };
                self.absorb(&pending, FailureStage::Rollback, &error)
            }
        }
    }

    fn absorb(&self, pending: &PendingCompletion, stage: FailureStage, error: &RollbackError) -> Settlement {
        tracing::warn!(
            entity = %pending.source_path,
            error = %error,
            "Rollback failed, message will be redelivered after lock expiry"
        );
        LeaseMetrics::record_rollback_error();
        self.sink.report(pending.report(stage, error));
        Settlement::LeftToExpire
    }
}

impl std::fmt::Debug for CompletionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandler")
            .field("dead_letter_failures", &self.dead_letter_failures)
            .field("consumer_name", &self.consumer_name)
            .finish_non_exhaustive()
    }
}
