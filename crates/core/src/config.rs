use std::str::FromStr;
use std::time::Duration;

use crate::error::CoreError;

/// Default number of cell validations allowed to run at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Default debounce window per cell key.
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(50);

/// Consecutive rule exceptions that open the circuit.
pub const DEFAULT_CIRCUIT_THRESHOLD: u32 = 5;

/// How long the circuit stays open after the last exception.
pub const DEFAULT_CIRCUIT_COOLDOWN: Duration = Duration::from_secs(5);

/// Period of the liveness sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Timeout applied to asynchronous rules that do not configure their own.
pub const DEFAULT_RULE_TIMEOUT: Duration = Duration::from_secs(5);

/// Buffer capacity of the validation event bus.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Tunables for the validation engine.
///
/// All fields have defaults matching the interactive grid use case. Hosts
/// may override them programmatically or through environment variables via
/// [`EngineConfig::from_env`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Counting-semaphore size of the concurrency governor.
    pub max_concurrency: usize,
    /// Minimum interval between two evaluations of the same cell key.
    /// `Duration::ZERO` disables debouncing.
    pub throttle_interval: Duration,
    /// Consecutive caught exceptions before the circuit opens.
    pub circuit_threshold: u32,
    /// Open window measured from the most recent exception.
    pub circuit_cooldown: Duration,
    /// Period of the background liveness sweep.
    pub sweep_interval: Duration,
    /// Timeout used by asynchronous rules built without an explicit one.
    pub default_rule_timeout: Duration,
    /// Capacity of the broadcast channel behind the event bus.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            circuit_threshold: DEFAULT_CIRCUIT_THRESHOLD,
            circuit_cooldown: DEFAULT_CIRCUIT_COOLDOWN,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            default_rule_timeout: DEFAULT_RULE_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `GRIDVAL_MAX_CONCURRENCY`     | `5`     |
    /// | `GRIDVAL_THROTTLE_MS`         | `50`    |
    /// | `GRIDVAL_CIRCUIT_THRESHOLD`   | `5`     |
    /// | `GRIDVAL_CIRCUIT_COOLDOWN_MS` | `5000`  |
    /// | `GRIDVAL_SWEEP_INTERVAL_SECS` | `60`    |
    /// | `GRIDVAL_RULE_TIMEOUT_MS`     | `5000`  |
    /// | `GRIDVAL_EVENT_CAPACITY`      | `1024`  |
    ///
    /// Values that fail to parse fall back to the default and are logged.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_concurrency: env_or("GRIDVAL_MAX_CONCURRENCY", defaults.max_concurrency),
            throttle_interval: Duration::from_millis(env_or(
                "GRIDVAL_THROTTLE_MS",
                defaults.throttle_interval.as_millis() as u64,
            )),
            circuit_threshold: env_or("GRIDVAL_CIRCUIT_THRESHOLD", defaults.circuit_threshold),
            circuit_cooldown: Duration::from_millis(env_or(
                "GRIDVAL_CIRCUIT_COOLDOWN_MS",
                defaults.circuit_cooldown.as_millis() as u64,
            )),
            sweep_interval: Duration::from_secs(env_or(
                "GRIDVAL_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )),
            default_rule_timeout: Duration::from_millis(env_or(
                "GRIDVAL_RULE_TIMEOUT_MS",
                defaults.default_rule_timeout.as_millis() as u64,
            )),
            event_capacity: env_or("GRIDVAL_EVENT_CAPACITY", defaults.event_capacity),
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_concurrency == 0 {
            return Err(CoreError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.circuit_threshold == 0 {
            return Err(CoreError::Config(
                "circuit_threshold must be at least 1".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(CoreError::Config(
                "sweep_interval must be non-zero".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(CoreError::Config(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_throttle_interval(mut self, interval: Duration) -> Self {
        self.throttle_interval = interval;
        self
    }

    pub fn with_circuit(mut self, threshold: u32, cooldown: Duration) -> Self {
        self.circuit_threshold = threshold;
        self.circuit_cooldown = cooldown;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

fn env_or<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "Unparsable setting, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_interactive_profile() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrency, 5);
        assert_eq!(config.throttle_interval, Duration::from_millis(50));
        assert_eq!(config.circuit_threshold, 5);
        assert_eq!(config.circuit_cooldown, Duration::from_secs(5));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = EngineConfig::default().with_max_concurrency(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrency"));
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let config = EngineConfig::default().with_circuit(0, Duration::from_secs(1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_throttle_is_allowed() {
        let config = EngineConfig::default().with_throttle_interval(Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_or_falls_back_on_garbage() {
        std::env::set_var("GRIDVAL_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_or("GRIDVAL_TEST_GARBAGE", 7u32), 7);
        std::env::set_var("GRIDVAL_TEST_NUMBER", " 12 ");
        assert_eq!(env_or("GRIDVAL_TEST_NUMBER", 7u32), 12);
        assert_eq!(env_or("GRIDVAL_TEST_MISSING_KEY", 3usize), 3);
    }
}
