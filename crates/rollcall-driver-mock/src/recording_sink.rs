//! Status sink that keeps every report for later assertions.

use parking_lot::Mutex;
use rollcall_core::feedback::{StatusReport, StatusSink, Tone};

#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<StatusReport>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<StatusReport> {
        self.reports.lock().clone()
    }

    pub fn last(&self) -> Option<StatusReport> {
        self.reports.lock().last().cloned()
    }

    /// Whether any report's primary text equals `primary`.
    pub fn saw(&self, primary: &str) -> bool {
        self.reports.lock().iter().any(|r| r.primary == primary)
    }

    pub fn count_tone(&self, tone: Tone) -> usize {
        self.reports.lock().iter().filter(|r| r.tone == tone).count()
    }

    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

impl StatusSink for RecordingSink {
    fn report(&self, report: StatusReport) {
        self.reports.lock().push(report);
    }
}
