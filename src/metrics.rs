//! Metrics instrumentation for docker-dns.
//!
//! All metrics are prefixed with `docker_dns.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a DNS query.
pub fn record_query(record_type: &str, result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Hit => "hit",
        QueryResult::Miss => "miss",
        QueryResult::NotReady => "not_ready",
    };

    counter!("docker_dns.query.count", "type" => record_type.to_string(), "result" => result_str)
        .increment(1);
    histogram!("docker_dns.query.duration.seconds", "type" => record_type.to_string())
        .record(duration.as_secs_f64());
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// Query answered from the registry.
    Hit,
    /// Domain not present in the registry.
    Miss,
    /// Registry not ready (startup population incomplete).
    NotReady,
}

/// Record a daemon event received by the reconciler.
pub fn record_event(kind: &str) {
    counter!("docker_dns.event.count", "kind" => kind.to_string()).increment(1);
}

/// Record the outcome of one reconcile procedure.
pub fn record_reconcile(outcome: ReconcileOutcome) {
    let outcome_str = match outcome {
        ReconcileOutcome::Installed => "installed",
        ReconcileOutcome::Removed => "removed",
        ReconcileOutcome::Stale => "stale",
    };
    counter!("docker_dns.reconcile.count", "outcome" => outcome_str).increment(1);
}

/// Outcome of an update/removal procedure.
#[derive(Debug, Clone, Copy)]
pub enum ReconcileOutcome {
    /// An entry was installed or replaced.
    Installed,
    /// The entry was removed or stayed absent.
    Removed,
    /// The change was discarded because a newer one already applied.
    Stale,
}

/// Record registry aggregates (call periodically or after a change).
pub fn record_state_counts(containers: usize, domains: usize) {
    gauge!("docker_dns.registry.containers.count").set(containers as f64);
    gauge!("docker_dns.registry.domains.count").set(domains as f64);
}

/// Record readiness state.
pub fn record_ready_state(ready: bool) {
    gauge!("docker_dns.registry.ready").set(if ready { 1.0 } else { 0.0 });
}

/// Record the SOA serial number.
pub fn record_serial(serial: u32) {
    gauge!("docker_dns.registry.serial").set(serial as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
