//! Error injection for simulated collaborators.
//!
//! Each simulated operation calls [`ErrorConfig::check_operation`] with its
//! name (`"presence"`, `"authenticate"`, `"read_block"`, `"post"`, ...)
//! before doing any work. Injected failures come back as
//! [`DriverError`]s so they look like what a real driver would report.

use super::rng::MockRng;
use parking_lot::Mutex;
use rollcall_core::error::{DriverError, DriverErrorKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Error injection configuration
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    /// Per-operation failure rate; `"*"` applies to every operation
    failure_rates: Arc<HashMap<&'static str, f64>>,
    scenarios: Arc<Vec<ErrorScenario>>,
    rng: Arc<MockRng>,
    state: Arc<Mutex<ErrorState>>,
}

#[derive(Debug, Clone)]
pub enum ErrorScenario {
    /// Fail every call of `operation` after `count` successful ones
    FailAfterN {
        operation: &'static str,
        count: u32,
    },
    /// Fail the next `count` calls of `operation`, then recover
    FailNext {
        operation: &'static str,
        count: u32,
    },
    /// Every call of `operation` times out
    Timeout { operation: &'static str },
    /// Every operation fails from the first call on
    CommunicationLoss,
}

#[derive(Default, Debug)]
struct ErrorState {
    operation_counts: HashMap<&'static str, u32>,
    communication_lost: bool,
}

impl ErrorConfig {
    /// No injected errors.
    pub fn none() -> Self {
        Self::build(HashMap::new(), Vec::new(), None)
    }

    /// Uniform random failures on every operation.
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("*", rate);
        Self::build(rates, Vec::new(), seed)
    }

    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self::build(HashMap::new(), scenarios, None)
    }

    pub fn with_rates(rates: HashMap<&'static str, f64>, seed: Option<u64>) -> Self {
        Self::build(rates, Vec::new(), seed)
    }

    fn build(
        rates: HashMap<&'static str, f64>,
        scenarios: Vec<ErrorScenario>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            failure_rates: Arc::new(rates),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(ErrorState::default())),
        }
    }

    /// Decide whether `operation` fails this time.
    pub fn check_operation(
        &self,
        driver_type: &str,
        operation: &'static str,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock();

        if state.communication_lost {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Communication,
                "Communication lost",
            ));
        }

        let call = {
            let counter = state.operation_counts.entry(operation).or_insert(0);
            *counter += 1;
            *counter
        };

        for scenario in self.scenarios.iter() {
            match scenario {
                ErrorScenario::FailAfterN {
                    operation: op,
                    count,
                } if *op == operation && call > *count => {
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Hardware,
                        format!("Injected failure after {} operations", count),
                    ));
                }
                ErrorScenario::FailNext {
                    operation: op,
                    count,
                } if *op == operation && call <= *count => {
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Hardware,
                        format!("Injected failure {}/{} on '{}'", call, count, operation),
                    ));
                }
                ErrorScenario::Timeout { operation: op } if *op == operation => {
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Timeout,
                        format!("Operation '{}' timed out", operation),
                    ));
                }
                ErrorScenario::CommunicationLoss => {
                    state.communication_lost = true;
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Communication,
                        "Communication lost",
                    ));
                }
                _ => {}
            }
        }

        let rate = self
            .failure_rates
            .get(operation)
            .or_else(|| self.failure_rates.get("*"))
            .copied()
            .unwrap_or(0.0);

        if self.rng.should_fail(rate) {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Communication,
                format!("Random failure on operation '{}'", operation),
            ));
        }

        Ok(())
    }

    /// Clear counters and a lost link.
    pub fn reset(&self) {
        *self.state.lock() = ErrorState::default();
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_errors() {
        let config = ErrorConfig::none();
        for _ in 0..100 {
            assert!(config.check_operation("mock_reader", "read_block").is_ok());
        }
    }

    #[test]
    fn test_random_failures() {
        let config = ErrorConfig::random_failures_seeded(0.5, Some(42));
        let failures = (0..1000)
            .filter(|_| config.check_operation("mock_reader", "presence").is_err())
            .count();
        assert!(failures > 400 && failures < 600, "Got {} failures", failures);
    }

    #[test]
    fn test_fail_after_n() {
        let config = ErrorConfig::scenario(ErrorScenario::FailAfterN {
            operation: "post",
            count: 2,
        });
        assert!(config.check_operation("mock_endpoint", "post").is_ok());
        assert!(config.check_operation("mock_endpoint", "post").is_ok());
        assert!(config.check_operation("mock_endpoint", "post").is_err());
        assert!(config.check_operation("mock_endpoint", "get").is_ok());
    }

    #[test]
    fn test_fail_next_recovers() {
        let config = ErrorConfig::scenario(ErrorScenario::FailNext {
            operation: "authenticate",
            count: 3,
        });
        for _ in 0..3 {
            assert!(config.check_operation("mock_reader", "authenticate").is_err());
        }
        assert!(config.check_operation("mock_reader", "authenticate").is_ok());
    }

    #[test]
    fn test_timeout_scenario() {
        let config = ErrorConfig::scenario(ErrorScenario::Timeout { operation: "get" });
        let err = config.check_operation("mock_endpoint", "get").unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Timeout);
        assert!(err.message.contains("timed out"));
    }

    #[test]
    fn test_communication_loss_is_sticky() {
        let config = ErrorConfig::scenario(ErrorScenario::CommunicationLoss);
        assert!(config.check_operation("mock_endpoint", "post").is_err());
        let err = config.check_operation("mock_endpoint", "get").unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Communication);
    }

    #[test]
    fn test_reset() {
        let config = ErrorConfig::scenario(ErrorScenario::FailAfterN {
            operation: "post",
            count: 1,
        });
        assert!(config.check_operation("mock_endpoint", "post").is_ok());
        assert!(config.check_operation("mock_endpoint", "post").is_err());
        config.reset();
        assert!(config.check_operation("mock_endpoint", "post").is_ok());
    }
}
