//! When to hand buffered records to the dispatcher.

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::FlushConfig;

/// Why a flush fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// A full batch is waiting.
    BatchReady,
    /// Records are waiting and no card was captured for `send_timeout`.
    Timeout,
}

impl FlushTrigger {
    /// Headline shown while the flush runs.
    pub fn headline(self) -> &'static str {
        match self {
            FlushTrigger::BatchReady => "Buffer Full",
            FlushTrigger::Timeout => "Timeout",
        }
    }
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushTrigger::BatchReady => f.write_str("batch_ready"),
            FlushTrigger::Timeout => f.write_str("timeout"),
        }
    }
}

/// Size and age thresholds for flushing.
///
/// The timer reference is `SessionState::last_capture_at`, which moves on
/// every capture and every delivered batch but not on a failed flush, so a
/// failed flush is retried on the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    min_batch_size: usize,
    send_timeout: Duration,
}

impl FlushPolicy {
    pub fn new(min_batch_size: usize, send_timeout: Duration) -> Self {
        Self {
            min_batch_size: min_batch_size.max(1),
            send_timeout,
        }
    }

    pub fn from_config(config: &FlushConfig) -> Self {
        Self::new(config.min_batch_size, config.send_timeout())
    }

    pub fn min_batch_size(&self) -> usize {
        self.min_batch_size
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Whether capture should pause because a flush is due.
    pub fn applies_back_pressure(&self, occupied: usize) -> bool {
        occupied >= self.min_batch_size
    }

    pub fn should_flush(
        &self,
        occupied: usize,
        last_capture_at: Instant,
        now: Instant,
    ) -> Option<FlushTrigger> {
        if occupied >= self.min_batch_size {
            return Some(FlushTrigger::BatchReady);
        }
        if occupied > 0 && now.saturating_duration_since(last_capture_at) >= self.send_timeout {
            return Some(FlushTrigger::Timeout);
        }
        None
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::from_config(&FlushConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_nine_records_without_timeout_do_not_flush() {
        let policy = FlushPolicy::default();
        let start = Instant::now();
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(policy.should_flush(9, start, Instant::now()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_batch_flushes_regardless_of_timer() {
        let policy = FlushPolicy::default();
        let now = Instant::now();
        assert_eq!(policy.should_flush(10, now, now), Some(FlushTrigger::BatchReady));
        assert!(policy.applies_back_pressure(10));
        assert!(!policy.applies_back_pressure(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_record_flushes_after_timeout() {
        let policy = FlushPolicy::default();
        let start = Instant::now();
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(
            policy.should_flush(1, start, Instant::now()),
            Some(FlushTrigger::Timeout)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_buffer_never_flushes() {
        let policy = FlushPolicy::default();
        let start = Instant::now();
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(policy.should_flush(0, start, Instant::now()), None);
    }

    #[test]
    fn test_zero_batch_size_is_raised_to_one() {
        let policy = FlushPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.min_batch_size(), 1);
    }
}
