//! Status reporting toward the display, LEDs and buzzer.
//!
//! The core only produces [`StatusReport`]s; how they are rendered is up to
//! the [`StatusSink`]. Reports are fire-and-forget.

/// Feedback pattern accompanying a report (LED colour / beep pattern on the
/// device).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    /// Long-running operation in progress.
    Busy,
    Success,
    Warning,
    Error,
    /// Escalation: restart pending or operator attention needed.
    Critical,
}

/// One status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub primary: String,
    pub secondary: Option<String>,
    /// Buffered record count to show alongside the text.
    pub buffer_count: Option<usize>,
    pub tone: Tone,
}

impl StatusReport {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: None,
            buffer_count: None,
            tone: Tone::Info,
        }
    }

    pub fn detail(mut self, secondary: impl Into<String>) -> Self {
        self.secondary = Some(secondary.into());
        self
    }

    pub fn with_buffer(mut self, occupied: usize) -> Self {
        self.buffer_count = Some(occupied);
        self
    }

    pub fn tone(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }
}

impl std::fmt::Display for StatusReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.primary)?;
        if let Some(secondary) = &self.secondary {
            write!(f, " | {}", secondary)?;
        }
        if let Some(count) = self.buffer_count {
            write!(f, " | buffered: {}", count)?;
        }
        Ok(())
    }
}

/// Receiver of status updates.
pub trait StatusSink: Send + Sync {
    fn report(&self, report: StatusReport);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_display() {
        let report = StatusReport::new("Send Failed")
            .detail("Retry 1/3")
            .with_buffer(4)
            .tone(Tone::Error);
        assert_eq!(report.to_string(), "Send Failed | Retry 1/3 | buffered: 4");
        assert_eq!(report.tone, Tone::Error);
    }

    #[test]
    fn test_report_defaults() {
        let report = StatusReport::new("Ready");
        assert_eq!(report.to_string(), "Ready");
        assert_eq!(report.tone, Tone::Info);
    }
}
