//! Operational modes for simulated collaborators.
//!
//! - **Instant**: No delays, fully scripted behavior for unit tests
//! - **Realistic**: Reader and network latencies for demo runs
//! - **Chaos**: Realistic timing plus the configured error injection

/// Operational modes for simulated collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockMode {
    /// No delays, deterministic
    #[default]
    Instant,
    /// Device-like timing
    Realistic,
    /// Device-like timing with injected failures
    Chaos,
}

impl MockMode {
    /// Whether operations should sleep for their simulated latency.
    pub fn simulates_latency(self) -> bool {
        !matches!(self, MockMode::Instant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode() {
        assert_eq!(MockMode::default(), MockMode::Instant);
    }

    #[test]
    fn test_latency_by_mode() {
        assert!(!MockMode::Instant.simulates_latency());
        assert!(MockMode::Realistic.simulates_latency());
        assert!(MockMode::Chaos.simulates_latency());
    }
}
