//! Observability sink for pipeline counters and timings.
//!
//! The engines call a [`MetricsSink`] fire-and-forget; an implementation
//! must never block. [`RecorderMetrics`] forwards to the `metrics` facade
//! so any installed exporter picks the values up.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

/// Why an alert was kept from notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Suppression {
    Silenced,
    Inhibited,
}

impl Suppression {
    pub fn as_str(self) -> &'static str {
        match self {
            Suppression::Silenced => "silenced",
            Suppression::Inhibited => "inhibited",
        }
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttemptOutcome {
    Success,
    Failure,
    Rejected,
}

impl AttemptOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Failure => "failure",
            AttemptOutcome::Rejected => "rejected",
        }
    }
}

pub trait MetricsSink: Send + Sync {
    /// One dedup decision. `duplicate` is set for refresh/ignore.
    fn dedup_action(&self, action: &'static str, duplicate: bool);

    fn correlated(&self, label: &str);

    fn rule_matched(&self, rule_id: &str);

    fn suppressed(&self, kind: Suppression);

    fn dispatch_attempt(&self, channel_id: &str, outcome: AttemptOutcome, elapsed: Duration);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn dedup_action(&self, _action: &'static str, _duplicate: bool) {}
    fn correlated(&self, _label: &str) {}
    fn rule_matched(&self, _rule_id: &str) {}
    fn suppressed(&self, _kind: Suppression) {}
    fn dispatch_attempt(&self, _channel_id: &str, _outcome: AttemptOutcome, _elapsed: Duration) {}
}

/// Forwards to the global `metrics` recorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecorderMetrics;

impl MetricsSink for RecorderMetrics {
    fn dedup_action(&self, action: &'static str, duplicate: bool) {
        metrics::counter!("vigil_dedup_actions_total", "action" => action).increment(1);
        if duplicate {
            metrics::counter!("vigil_dedup_duplicates_total").increment(1);
        }
    }

    fn correlated(&self, label: &str) {
        metrics::counter!("vigil_correlations_total", "label" => label.to_string()).increment(1);
    }

    fn rule_matched(&self, rule_id: &str) {
        metrics::counter!("vigil_routing_matches_total", "rule" => rule_id.to_string())
            .increment(1);
    }

    fn suppressed(&self, kind: Suppression) {
        metrics::counter!("vigil_suppressed_total", "reason" => kind.as_str()).increment(1);
    }

    fn dispatch_attempt(&self, channel_id: &str, outcome: AttemptOutcome, elapsed: Duration) {
        metrics::counter!(
            "vigil_dispatch_attempts_total",
            "channel" => channel_id.to_string(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
        metrics::histogram!(
            "vigil_dispatch_attempt_seconds",
            "channel" => channel_id.to_string()
        )
        .record(elapsed.as_secs_f64());
    }
}

/// Keeps counters in memory; used by the CLI summary and by tests.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<BTreeMap<String, u64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self, key: String) {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *counters.entry(key).or_insert(0) += 1;
    }

    /// Current value of a counter key such as `"dedup.refresh"`.
    pub fn get(&self, key: &str) -> u64 {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn dedup_action(&self, action: &'static str, duplicate: bool) {
        self.bump(format!("dedup.{action}"));
        if duplicate {
            self.bump("dedup.duplicates".to_string());
        }
    }

    fn correlated(&self, label: &str) {
        self.bump(format!("correlated.{label}"));
    }

    fn rule_matched(&self, rule_id: &str) {
        self.bump(format!("routing.{rule_id}"));
    }

    fn suppressed(&self, kind: Suppression) {
        self.bump(format!("suppressed.{}", kind.as_str()));
    }

    fn dispatch_attempt(&self, channel_id: &str, outcome: AttemptOutcome, _elapsed: Duration) {
        self.bump(format!("dispatch.{channel_id}.{}", outcome.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_metrics_counts_by_key() {
        let m = InMemoryMetrics::new();
        m.dedup_action("refresh", true);
        m.dedup_action("ignore", true);
        m.dedup_action("create", false);
        m.suppressed(Suppression::Silenced);
        m.dispatch_attempt("email-a", AttemptOutcome::Failure, Duration::from_millis(3));

        assert_eq!(m.get("dedup.refresh"), 1);
        assert_eq!(m.get("dedup.duplicates"), 2);
        assert_eq!(m.get("suppressed.silenced"), 1);
        assert_eq!(m.get("dispatch.email-a.failure"), 1);
        assert_eq!(m.get("missing"), 0);
    }
}
