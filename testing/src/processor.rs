//! Scripted downstream processor.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Only panics on a poisoned mutex or when scripted to

use leasebus_core::error::ProcessingError;
use leasebus_core::exchange::{Exchange, Payload, ProcessFuture, Processor};
use leasebus_core::metadata::Metadata;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// What the processor does with one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Return `Ok(())`
    Succeed,
    /// Return the error
    Fail(ProcessingError),
    /// Panic with the message
    Panic(String),
}

/// What the processor saw.
#[derive(Debug, Clone)]
pub struct ProcessedExchange {
    /// Explicit message id of the exchange
    pub message_id: Option<String>,
    /// Body bytes; `None` for streaming payloads
    pub body: Option<Vec<u8>>,
    /// Headers
    pub metadata: Metadata,
}

#[derive(Debug, Default)]
struct Script {
    steps: VecDeque<Step>,
    seen: Vec<ProcessedExchange>,
}

/// A [`Processor`] that follows a script and records every exchange.
///
/// Steps are consumed in order; once the script runs out the fallback step
/// applies. A gated processor waits for [`ScriptedProcessor::release`] before
/// each exchange completes.
///
/// # Example
///
/// ```
/// use leasebus_testing::ScriptedProcessor;
///
/// let processor = ScriptedProcessor::failing("downstream unavailable");
/// assert_eq!(processor.processed().len(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedProcessor {
    script: Arc<Mutex<Script>>,
    fallback: Step,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedProcessor {
    /// Always succeed.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::with_fallback(Step::Succeed)
    }

    /// Always fail with `message`.
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self::with_fallback(Step::Fail(ProcessingError::new(message)))
    }

    /// Always panic with `message`.
    #[must_use]
    pub fn panicking(message: &str) -> Self {
        Self::with_fallback(Step::Panic(message.to_string()))
    }

    /// Run `steps` in order, then `fallback`.
    #[must_use]
    pub fn scripted(steps: impl IntoIterator<Item = Step>, fallback: Step) -> Self {
        let processor = Self::with_fallback(fallback);
        processor.script.lock().unwrap().steps.extend(steps);
        processor
    }

    fn with_fallback(fallback: Step) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            fallback,
            delay: None,
            gate: None,
        }
    }

    /// Sleep for `delay` before finishing each exchange.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Hold each exchange until released.
    #[must_use]
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let `count` held exchanges finish.
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Every exchange received so far, in order.
    #[must_use]
    pub fn processed(&self) -> Vec<ProcessedExchange> {
        self.script.lock().unwrap().seen.clone()
    }

    /// Number of exchanges received so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.script.lock().unwrap().seen.len()
    }
}

impl Processor for ScriptedProcessor {
    fn process(&self, exchange: Exchange) -> ProcessFuture<'_> {
        let body = match exchange.payload {
            Payload::Empty => Some(Vec::new()),
            Payload::Text(text) => Some(text.into_bytes()),
            Payload::Bytes(bytes) => Some(bytes),
            Payload::Stream(_) => None,
        };
        let step = {
            let mut script = self.script.lock().unwrap();
            script.seen.push(ProcessedExchange {
                message_id: exchange.message_id,
                body,
                metadata: exchange.metadata,
            });
            script
                .steps
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        };

        Box::pin(async move {
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match step {
                Step::Succeed => Ok(()),
                Step::Fail(error) => Err(error),
                #[allow(clippy::panic)]
                Step::Panic(message) => panic!("{message}"),
            }
        })
    }
}
