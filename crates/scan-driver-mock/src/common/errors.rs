//! Error injection framework for simulated devices.
//!
//! Failures surface as [`DriverError`]s so they travel the same path as real
//! driver faults.

use super::rng::MockRng;
use parking_lot::Mutex;
use scan_core::{DriverError, DriverErrorKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Error injection configuration for a simulated device.
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    /// Per-operation failure rate (0.0 to 1.0); `*` applies to every operation
    failure_rates: Arc<HashMap<&'static str, f64>>,
    /// Specific failure scenarios
    scenarios: Arc<Vec<ErrorScenario>>,
    /// RNG for failure decisions
    rng: Arc<MockRng>,
    /// State tracking for scenarios
    state: Arc<Mutex<ErrorState>>,
}

/// Deterministic failure patterns.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorScenario {
    /// Succeed `count` times, then fail every call
    FailAfterN {
        /// Operation name, e.g. `read`
        operation: &'static str,
        /// Successful calls before the first failure
        count: u32,
    },
    /// Fail exactly once, on call number `call` (1-based)
    FailOnCall {
        /// Operation name
        operation: &'static str,
        /// Call that fails
        call: u32,
    },
    /// Every call of the operation times out
    Timeout {
        /// Operation name
        operation: &'static str,
    },
    /// Link drops on the first checked call and stays down
    CommunicationLoss,
    /// Device latches a fault code on the first checked call
    HardwareFault {
        /// Fault code reported
        code: u32,
    },
}

#[derive(Default, Debug)]
struct ErrorState {
    operation_counts: HashMap<&'static str, u32>,
    latched: Option<Latch>,
}

/// Fault that persists until [`ErrorConfig::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Latch {
    LinkDown,
    Fault(u32),
}

impl Latch {
    fn describe(self) -> (DriverErrorKind, String) {
        match self {
            Latch::LinkDown => (DriverErrorKind::Communication, "Communication lost".to_string()),
            Latch::Fault(code) => (DriverErrorKind::Hardware, format!("Hardware fault: {code}")),
        }
    }
}

impl ErrorScenario {
    fn latch(&self) -> Option<Latch> {
        match self {
            ErrorScenario::CommunicationLoss => Some(Latch::LinkDown),
            ErrorScenario::HardwareFault { code } => Some(Latch::Fault(*code)),
            _ => None,
        }
    }

    /// Failure for call number `call` of `operation`, if this scenario injects one.
    fn injected(&self, operation: &str, call: u32) -> Option<(DriverErrorKind, String)> {
        match *self {
            ErrorScenario::FailAfterN { operation: op, count } if op == operation && call > count => Some((
                DriverErrorKind::Hardware,
                format!("Injected failure after {count} operations"),
            )),
            ErrorScenario::FailOnCall { operation: op, call: target } if op == operation && call == target => Some((
                DriverErrorKind::Hardware,
                format!("Injected failure on call {target} of '{operation}'"),
            )),
            ErrorScenario::Timeout { operation: op } if op == operation => Some((
                DriverErrorKind::Timeout,
                format!("Operation '{operation}' timed out"),
            )),
            _ => None,
        }
    }
}

impl ErrorConfig {
    /// No injected errors.
    pub fn none() -> Self {
        Self::build(HashMap::new(), Vec::new(), None)
    }

    /// Uniform random failures on every operation, seeded.
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("*", rate);
        Self::build(rates, Vec::new(), seed)
    }

    /// A single scenario.
    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Several scenarios, checked in order.
    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self::build(HashMap::new(), scenarios, None)
    }

    /// Custom failure rate per operation.
    pub fn with_rates(rates: HashMap<&'static str, f64>) -> Self {
        Self::build(rates, Vec::new(), None)
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
    ///
    /// Latched faults fail every later call, whatever the operation.
    pub fn check_operation(
        &self,
        driver_type: &str,
        operation: &'static str,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        if let Some(latch) = state.latched {
            let (kind, message) = latch.describe();
            return Err(DriverError::new(driver_type, kind, message));
        }

        let counter = state.operation_counts.entry(operation).or_insert(0);
        *counter += 1;
        let call = *counter;

        for scenario in self.scenarios.iter() {
            if let Some(latch) = scenario.latch() {
                state.latched = Some(latch);
                let (kind, message) = latch.describe();
                return Err(DriverError::new(driver_type, kind, message));
            }
            if let Some((kind, message)) = scenario.injected(operation, call) {
                return Err(DriverError::new(driver_type, kind, message));
            }
        }

        let rate = [operation, "*"]
            .iter()
            .find_map(|key| self.failure_rates.get(*key).copied())
            .unwrap_or(0.0);
        if self.rng.chance(rate) {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Hardware,
                format!("Random failure on operation '{operation}'"),
            ));
        }
        Ok(())
    }

    /// Clear counters and latched faults.
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
            assert!(config.check_operation("test_driver", "read").is_ok());
        }
    }

    #[test]
    fn test_random_failures() {
        let config = ErrorConfig::random_failures_seeded(0.5, Some(42));
        let failures = (0..1000)
            .filter(|_| config.check_operation("test_driver", "read").is_err())
            .count();
        assert!(failures > 400 && failures < 600, "Got {failures} failures");
    }

    #[test]
    fn test_fail_after_n() {
        let config = ErrorConfig::scenario(ErrorScenario::FailAfterN {
            operation: "read",
            count: 2,
        });
        assert!(config.check_operation("spec", "read").is_ok());
        assert!(config.check_operation("spec", "move").is_ok());
        assert!(config.check_operation("spec", "read").is_ok());
        assert!(config.check_operation("spec", "read").is_err());
        assert!(config.check_operation("spec", "read").is_err());
    }

    #[test]
    fn test_fail_on_call_is_one_shot() {
        let config = ErrorConfig::scenario(ErrorScenario::FailOnCall {
            operation: "read",
            call: 2,
        });
        assert!(config.check_operation("spec", "read").is_ok());
        let err = config.check_operation("spec", "read").expect_err("second call fails");
        assert_eq!(err.kind, DriverErrorKind::Hardware);
        assert!(config.check_operation("spec", "read").is_ok());
    }

    #[test]
    fn test_communication_loss_latches_until_reset() {
        let config = ErrorConfig::scenario(ErrorScenario::CommunicationLoss);
        for _ in 0..3 {
            let err = config.check_operation("stage", "move").expect_err("link down");
            assert_eq!(err.kind, DriverErrorKind::Communication);
        }
        config.reset();
        // The scenario fires again on the next call after a reset.
        assert!(config.check_operation("stage", "move").is_err());
    }

    #[test]
    fn test_timeout_only_for_named_operation() {
        let config = ErrorConfig::scenario(ErrorScenario::Timeout { operation: "home" });
        assert!(config.check_operation("stage", "move").is_ok());
        let err = config.check_operation("stage", "home").expect_err("timeout");
        assert_eq!(err.kind, DriverErrorKind::Timeout);
    }
}
