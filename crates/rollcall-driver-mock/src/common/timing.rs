//! Timing configuration for realistic mode.

use std::time::Duration;

/// Simulated latencies, applied only when the mode asks for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingConfig {
    /// One RF poll (presence or anticollision)
    pub rf_poll_ms: u64,
    /// Authenticate plus read of a single block
    pub block_read_ms: u64,
    /// One HTTP round trip
    pub round_trip_ms: u64,
}

impl TimingConfig {
    /// MFRC522-class reader on SPI
    pub fn reader() -> Self {
        Self {
            rf_poll_ms: 2,
            block_read_ms: 8,
            round_trip_ms: 0,
        }
    }

    /// Apps Script web app over TLS
    pub fn endpoint() -> Self {
        Self {
            rf_poll_ms: 0,
            block_read_ms: 0,
            round_trip_ms: 350,
        }
    }

    pub fn rf_poll(&self) -> Duration {
        Duration::from_millis(self.rf_poll_ms)
    }

    pub fn block_read(&self) -> Duration {
        Duration::from_millis(self.block_read_ms)
    }

    pub fn round_trip(&self) -> Duration {
        Duration::from_millis(self.round_trip_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing_is_zero() {
        let config = TimingConfig::default();
        assert_eq!(config.rf_poll(), Duration::ZERO);
        assert_eq!(config.round_trip(), Duration::ZERO);
    }

    #[test]
    fn test_presets() {
        assert_eq!(TimingConfig::reader().block_read_ms, 8);
        assert_eq!(TimingConfig::endpoint().round_trip_ms, 350);
    }
}
