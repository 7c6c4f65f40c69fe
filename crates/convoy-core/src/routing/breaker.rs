//! Per-candidate circuit breaker.
//!
//! Tracks consecutive failures per `provider:model` ref. Reaching the
//! failure threshold opens the circuit for an exponentially growing cooldown
//! window (capped); a success closes it and resets the count. Candidates are
//! never hard-excluded — an open circuit contributes a very large penalty to
//! the router score, so a ref with an open circuit sorts after every healthy
//! candidate but can still be attempted when nothing else exists.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Tuning parameters.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures needed to open the circuit.
    pub failure_threshold: u32,
    /// Cooldown after the threshold failure.
    pub base_cooldown_ms: u64,
    /// Cooldown ceiling.
    pub max_cooldown_ms: u64,
    /// Score penalty per consecutive failure while closed.
    pub penalty_per_failure: u64,
    /// Score penalty while the circuit is open.
    pub open_circuit_penalty: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 2,
            base_cooldown_ms: 5 * 60 * 1000,
            max_cooldown_ms: 60 * 60 * 1000,
            penalty_per_failure: 1_000,
            open_circuit_penalty: 1_000_000,
        }
    }
}

/// Breaker state for one ref.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreakerEntry {
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_until: Option<u64>,
}

/// Versioned dump of all entries for durable persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub version: u32,
    pub entries: HashMap<String, BreakerEntry>,
}

/// Shared failure tracker. All timestamps are unix milliseconds.
#[derive(Default)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    entries: Mutex<HashMap<String, BreakerEntry>>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Reset the ref to closed with zero failures.
    pub fn record_success(&self, reference: &str) {
        let mut entries = self.entries.lock().expect("breaker lock");
        if entries.remove(reference).is_some() {
            tracing::debug!(reference, "breaker reset after success");
        }
    }

    /// Count a failure at `now`; opens the circuit once the threshold is
    /// reached, doubling the cooldown for each failure past it.
    pub fn record_failure_at(&self, reference: &str, now: u64) {
        let mut entries = self.entries.lock().expect("breaker lock");
        let entry = entries.entry(reference.to_string()).or_default();
        entry.consecutive_failures += 1;
        entry.last_failure_at = Some(now);

        let threshold = self.config.failure_threshold;
        if entry.consecutive_failures >= threshold {
            let exponent = entry.consecutive_failures - threshold;
            let cooldown = self
                .config
                .base_cooldown_ms
                .saturating_mul(1u64 << exponent.min(30))
                .min(self.config.max_cooldown_ms);
            entry.open_until = Some(now + cooldown);
            tracing::info!(
                reference,
                failures = entry.consecutive_failures,
                cooldown_ms = cooldown,
                "circuit opened"
            );
        }
    }

    pub fn record_failure(&self, reference: &str) {
        self.record_failure_at(reference, now_ms())
    }

    pub fn is_open_at(&self, reference: &str, now: u64) -> bool {
        let entries = self.entries.lock().expect("breaker lock");
        entries
            .get(reference)
            .and_then(|entry| entry.open_until)
            .is_some_and(|open_until| now < open_until)
    }

    pub fn is_open(&self, reference: &str) -> bool {
        self.is_open_at(reference, now_ms())
    }

    /// Router score penalty for this ref at `now`.
    pub fn penalty_at(&self, reference: &str, now: u64) -> u64 {
        let entries = self.entries.lock().expect("breaker lock");
        let Some(entry) = entries.get(reference) else {
            return 0;
        };
        if entry.open_until.is_some_and(|open_until| now < open_until) {
            return self.config.open_circuit_penalty;
        }
        u64::from(entry.consecutive_failures) * self.config.penalty_per_failure
    }

    pub fn penalty(&self, reference: &str) -> u64 {
        self.penalty_at(reference, now_ms())
    }

    /// Dump all entries for persistence.
    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            version: SNAPSHOT_VERSION,
            entries: self.entries.lock().expect("breaker lock").clone(),
        }
    }

    /// Load a snapshot. Snapshots with a different version are discarded.
    pub fn restore(&self, snapshot: BreakerSnapshot) {
        if snapshot.version != SNAPSHOT_VERSION {
            tracing::warn!(
                version = snapshot.version,
                "discarding breaker snapshot with unknown version"
            );
            return;
        }
        *self.entries.lock().expect("breaker lock") = snapshot.entries;
    }
}
