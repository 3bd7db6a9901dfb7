//! Exception sink that keeps what it is given.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Only panics on a poisoned mutex

use leasebus_core::sink::{ExceptionSink, FailureReport, FailureStage};
use std::sync::{Arc, Mutex};

/// Records every [`FailureReport`]. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingExceptionSink {
    reports: Arc<Mutex<Vec<FailureReport>>>,
}

impl RecordingExceptionSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every report so far, in order.
    #[must_use]
    pub fn reports(&self) -> Vec<FailureReport> {
        self.reports.lock().unwrap().clone()
    }

    /// Reports for one stage.
    #[must_use]
    pub fn at_stage(&self, stage: FailureStage) -> Vec<FailureReport> {
        self.reports()
            .into_iter()
            .filter(|report| report.stage == stage)
            .collect()
    }

    /// Forget all reports.
    pub fn clear(&self) {
        self.reports.lock().unwrap().clear();
    }
}

impl ExceptionSink for RecordingExceptionSink {
    fn report(&self, report: FailureReport) {
        self.reports.lock().unwrap().push(report);
    }
}
