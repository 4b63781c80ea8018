//! The [`ValidationEngine`] facade.

use std::sync::Arc;

use gridval_core::config::EngineConfig;
use gridval_core::validation::{
    CircuitBreaker, CircuitState, RuleRegistry, ThrottleGate, ValidationRule,
};
use gridval_events::{EventBus, ValidationEvent};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::EngineResult;
use crate::governor::Governor;
use crate::liveness::{self, LivenessTracker, SweepReport};
use crate::stats::{EngineStats, StatsSnapshot};

/// Shared state behind every clone of the engine.
pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) registry: RuleRegistry,
    pub(crate) throttle: ThrottleGate,
    pub(crate) circuit: CircuitBreaker,
    pub(crate) governor: Governor,
    pub(crate) liveness: LivenessTracker,
    pub(crate) events: EventBus,
    pub(crate) stats: EngineStats,
}

/// Cell/row validation engine.
///
/// Cheap to clone; clones share rules, gates and bookkeeping. Validation
/// entry points live in the executor and batch modules.
#[derive(Clone)]
pub struct ValidationEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl ValidationEngine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let inner = EngineInner {
            registry: RuleRegistry::new(),
            throttle: ThrottleGate::new(config.throttle_interval),
            circuit: CircuitBreaker::new(config.circuit_threshold, config.circuit_cooldown),
            governor: Governor::new(config.max_concurrency),
            liveness: LivenessTracker::new(),
            events: EventBus::new(config.event_capacity),
            stats: EngineStats::default(),
            config,
        };
        tracing::debug!(
            max_concurrency = inner.config.max_concurrency,
            throttle_ms = inner.config.throttle_interval.as_millis() as u64,
            circuit_threshold = inner.config.circuit_threshold,
            "Validation engine created"
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // -- Rules --------------------------------------------------------------

    /// Register a rule, replacing any rule of the same name on its field.
    pub fn add_validation_rule(&self, rule: ValidationRule) -> EngineResult<Arc<ValidationRule>> {
        Ok(self.inner.registry.add(rule)?)
    }

    pub fn remove_validation_rule(&self, field: &str, name: &str) -> EngineResult<bool> {
        Ok(self.inner.registry.remove(field, name)?)
    }

    /// Remove the rules of `field`, or every rule when `None`.
    pub fn clear_validation_rules(&self, field: Option<&str>) -> EngineResult<()> {
        Ok(self.inner.registry.clear(field)?)
    }

    /// Rules of `field` in evaluation order.
    pub fn get_validation_rules(&self, field: &str) -> Vec<Arc<ValidationRule>> {
        self.inner.registry.get(field)
    }

    pub fn has_validation_rules(&self, field: &str) -> bool {
        self.inner.registry.has(field)
    }

    pub fn total_rule_count(&self) -> usize {
        self.inner.registry.count()
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.inner.registry
    }

    // -- Signals ------------------------------------------------------------

    pub fn subscribe(&self) -> broadcast::Receiver<ValidationEvent> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    // -- Inspection ---------------------------------------------------------

    pub fn circuit_state(&self) -> CircuitState {
        self.inner.circuit.state(Instant::now())
    }

    pub fn stats(&self) -> StatsSnapshot {
        let inner = &self.inner;
        let [evaluated, throttled, circuit_bypassed, rule_exceptions, rule_timeouts, cancelled, superseded] =
            inner.stats.counters();
        StatsSnapshot {
            evaluated,
            throttled,
            circuit_bypassed,
            rule_exceptions,
            rule_timeouts,
            cancelled,
            superseded,
            circuit: self.circuit_state(),
            rule_count: inner.registry.count(),
            in_flight: inner.governor.pending_count(),
            tracked_cells: inner.liveness.len(),
            throttle_entries: inner.throttle.len(),
        }
    }

    // -- Bookkeeping --------------------------------------------------------

    /// Drop all bookkeeping for a row that was removed from the grid and
    /// cancel its pending validations.
    pub fn invalidate_row(&self, row: usize) {
        let inner = &self.inner;
        let throttled = inner.throttle.forget_row(row);
        let tracked = inner.liveness.forget_row(row);
        let cancelled = inner.governor.cancel_row(row);
        tracing::debug!(row, throttled, tracked, cancelled, "Row invalidated");
    }

    /// Prune bookkeeping for dead or re-indexed cells and expired throttle
    /// timestamps.
    pub fn sweep(&self) -> SweepReport {
        let inner = &self.inner;
        let stale = inner.liveness.collect_stale();
        for key in &stale {
            inner.throttle.forget(key);
        }
        let expired_timestamps = inner.throttle.prune_expired(Instant::now());
        SweepReport {
            stale_keys: stale.len(),
            expired_timestamps,
        }
    }

    /// Spawn the periodic liveness sweep on the current runtime.
    pub fn spawn_liveness_sweep(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let period = self.inner.config.sweep_interval;
        tokio::spawn(liveness::run(self.clone(), period, cancel))
    }
}

impl std::fmt::Debug for ValidationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationEngine")
            .field("config", &self.inner.config)
            .field("rules", &self.inner.registry.count())
            .finish_non_exhaustive()
    }
}
