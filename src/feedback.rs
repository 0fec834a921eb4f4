//! Status sink that renders reports as tracing events.
//!
//! Stands in for the OLED, LEDs and buzzer on a host: the tone picks the
//! event level, the texts and buffer count become structured fields.

use rollcall_core::feedback::{StatusReport, StatusSink, Tone};
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn report(&self, report: StatusReport) {
        let secondary = report.secondary.as_deref().unwrap_or("");
        let buffered = report.buffer_count;
        match report.tone {
            Tone::Busy => debug!(target: "rollcall::status", secondary, ?buffered, "{}", report.primary),
            Tone::Info | Tone::Success => {
                info!(target: "rollcall::status", secondary, ?buffered, tone = ?report.tone, "{}", report.primary)
            }
            Tone::Warning => warn!(target: "rollcall::status", secondary, ?buffered, "{}", report.primary),
            Tone::Error | Tone::Critical => {
                error!(target: "rollcall::status", secondary, ?buffered, tone = ?report.tone, "{}", report.primary)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_reports_become_events() {
        let sink = TracingSink;
        sink.report(StatusReport::new("Send Failed").detail("Retry 1/3").tone(Tone::Error));
        sink.report(StatusReport::new("Ready").with_buffer(2).tone(Tone::Success));

        assert!(logs_contain("Send Failed"));
        assert!(logs_contain("Retry 1/3"));
        assert!(logs_contain("Ready"));
    }
}
