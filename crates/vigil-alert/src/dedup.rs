use crate::correlation::{CorrelationSignal, Correlator};
use crate::error::{AlertError, Result};
use crate::grouping::AlertGrouper;
use crate::locks::{FingerprintLocks, DEFAULT_LOCK_CAPACITY};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use vigil_common::metrics::{MetricsSink, NoopMetrics};
use vigil_common::{Alert, AlertGroup, AlertStatus, Fingerprint, IncomingAlert};
use vigil_storage::history::{record_best_effort, HistoryKind, HistoryRecord, HistorySink};
use vigil_storage::{AlertRepository, MemoryHistory, StorageError};

/// Classification of one incoming event against the stored alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupAction {
    Create,
    Refresh,
    UpdateSeverity,
    UpdateStatus,
    Reopen,
    Ignore,
}

impl DedupAction {
    pub fn as_str(self) -> &'static str {
        match self {
            DedupAction::Create => "create",
            DedupAction::Refresh => "refresh",
            DedupAction::UpdateSeverity => "update_severity",
            DedupAction::UpdateStatus => "update_status",
            DedupAction::Reopen => "reopen",
            DedupAction::Ignore => "ignore",
        }
    }

    /// Refresh and ignore carry no new information about the alert.
    pub fn is_duplicate(self) -> bool {
        matches!(self, DedupAction::Refresh | DedupAction::Ignore)
    }

    fn history_kind(self) -> Option<HistoryKind> {
        match self {
            DedupAction::Create => Some(HistoryKind::Created),
            DedupAction::UpdateSeverity => Some(HistoryKind::SeverityRaised),
            DedupAction::UpdateStatus => Some(HistoryKind::Resolved),
            DedupAction::Reopen => Some(HistoryKind::Reopened),
            DedupAction::Refresh | DedupAction::Ignore => None,
        }
    }
}

impl std::fmt::Display for DedupAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Correlation window; also the repeat interval for refreshes.
    pub correlation_window: Duration,
    pub correlation_labels: Vec<String>,
    pub lock_capacity: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            correlation_window: Duration::minutes(5),
            correlation_labels: vec!["instance".to_string(), "job".to_string()],
            lock_capacity: DEFAULT_LOCK_CAPACITY,
        }
    }
}

/// Result of [`DedupEngine::process`].
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub action: DedupAction,
    pub fingerprint: Fingerprint,
    /// The stored alert after the transition. `None` only when a resolved
    /// event arrived for a fingerprint that was never stored.
    pub alert: Option<Alert>,
    /// Whether the transition should go on to silencing, inhibition and
    /// routing.
    pub notify: bool,
    pub duplicate: bool,
    /// Set on a refresh that arrives after a full window of quiet.
    pub repeat: bool,
    pub correlations: Vec<CorrelationSignal>,
    /// The alert's group after the transition, when grouping is on.
    pub group: Option<AlertGroup>,
}

/// Planned change for one event, computed without touching storage.
#[derive(Debug, Clone)]
pub struct Transition {
    pub action: DedupAction,
    pub next: Option<Alert>,
    pub repeat: bool,
}

/// Decides the transition for `event` given the currently stored row.
pub fn plan(
    existing: Option<&Alert>,
    event: &IncomingAlert,
    now: DateTime<Utc>,
    repeat_after: Duration,
) -> Transition {
    let Some(current) = existing else {
        if event.is_resolved() {
            return Transition {
                action: DedupAction::Ignore,
                next: None,
                repeat: false,
            };
        }
        return Transition {
            action: DedupAction::Create,
            next: Some(Alert::from_incoming(event, now)),
            repeat: false,
        };
    };

    let mut next = current.clone();
    next.updated_at = now;

    match (current.is_active(), event.is_resolved()) {
        (true, true) => {
            next.status = AlertStatus::Resolved;
            next.ends_at = Some(event.ends_at.unwrap_or(now));
            Transition {
                action: DedupAction::UpdateStatus,
                next: Some(next),
                repeat: false,
            }
        }
        (true, false) if event.severity > current.severity => {
            next.severity = event.severity;
            Transition {
                action: DedupAction::UpdateSeverity,
                next: Some(next),
                repeat: false,
            }
        }
        (true, false) => Transition {
            action: DedupAction::Refresh,
            next: Some(next),
            repeat: now - current.updated_at > repeat_after,
        },
        (false, false) => {
            next.status = AlertStatus::Firing;
            next.severity = event.severity;
            next.annotations = event.annotations.clone();
            next.starts_at = now;
            next.ends_at = None;
            next.occurrences = current.occurrences.saturating_add(1);
            Transition {
                action: DedupAction::Reopen,
                next: Some(next),
                repeat: false,
            }
        }
        (false, true) => Transition {
            action: DedupAction::Ignore,
            next: None,
            repeat: false,
        },
    }
}

/// Admission point for raw alert events.
pub struct DedupEngine {
    repository: Arc<dyn AlertRepository>,
    locks: FingerprintLocks,
    correlator: Correlator,
    config: DedupConfig,
    metrics: Arc<dyn MetricsSink>,
    history: Arc<dyn HistorySink>,
    grouper: Option<Arc<AlertGrouper>>,
}

impl DedupEngine {
    pub fn new(repository: Arc<dyn AlertRepository>, config: DedupConfig) -> Self {
        Self {
            repository,
            locks: FingerprintLocks::new(config.lock_capacity),
            correlator: Correlator::new(
                config.correlation_labels.clone(),
                config.correlation_window,
            ),
            config,
            metrics: Arc::new(NoopMetrics),
            history: Arc::new(MemoryHistory::default()),
            grouper: None,
        }
    }

    /// Folds every stored transition into `grouper` while the
    /// fingerprint's lock is still held.
    pub fn with_grouper(mut self, grouper: Arc<AlertGrouper>) -> Self {
        self.grouper = Some(grouper);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = history;
        self
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    pub fn locks(&self) -> &FingerprintLocks {
        &self.locks
    }

    /// Validates, fingerprints and applies one event.
    pub fn process(&self, event: &IncomingAlert, now: DateTime<Utc>) -> Result<DedupOutcome> {
        event.validate()?;
        let fingerprint = event.fingerprint();

        let (transition, stored, group) = self.locks.with_lock(&fingerprint, || {
            let (transition, stored) = self.apply_with_retry(event, &fingerprint, now)?;
            let group = match stored.as_ref() {
                Some(alert) if transition.action != DedupAction::Ignore => {
                    self.observe_group(alert, now)
                }
                _ => None,
            };
            Ok::<_, AlertError>((transition, stored, group))
        })?;

        let action = transition.action;
        let duplicate = action.is_duplicate();
        let notify = match action {
            DedupAction::Create
            | DedupAction::Reopen
            | DedupAction::UpdateSeverity
            | DedupAction::UpdateStatus => true,
            DedupAction::Refresh => transition.repeat,
            DedupAction::Ignore => false,
        };

        let correlations = if event.is_resolved() {
            Vec::new()
        } else {
            self.correlator.observe(&event.labels, &fingerprint, now)
        };
        for signal in &correlations {
            self.metrics.correlated(&signal.label);
        }

        self.metrics.dedup_action(action.as_str(), duplicate);
        if let (Some(kind), Some(alert)) = (action.history_kind(), stored.as_ref()) {
            record_best_effort(
                self.history.as_ref(),
                HistoryRecord::new(kind, &fingerprint, alert.alertname(), action.as_str(), now),
            );
        }

        tracing::debug!(
            fingerprint = %fingerprint.short(),
            action = %action,
            notify,
            "Dedup decision"
        );

        Ok(DedupOutcome {
            action,
            fingerprint,
            alert: stored,
            notify,
            duplicate,
            repeat: transition.repeat,
            correlations,
            group,
        })
    }

    fn observe_group(&self, alert: &Alert, now: DateTime<Utc>) -> Option<AlertGroup> {
        self.grouper
            .as_ref()
            .and_then(|grouper| grouper.observe(alert, now))
    }

    fn apply_with_retry(
        &self,
        event: &IncomingAlert,
        fingerprint: &Fingerprint,
        now: DateTime<Utc>,
    ) -> Result<(Transition, Option<Alert>)> {
        match self.apply(event, fingerprint, now) {
            Err(StorageError::VersionConflict { .. }) => {
                tracing::warn!(
                    fingerprint = %fingerprint.short(),
                    "Version conflict, re-reading alert"
                );
                match self.apply(event, fingerprint, now) {
                    Err(StorageError::VersionConflict { .. }) => Err(AlertError::Conflict {
                        fingerprint: fingerprint.to_string(),
                    }),
                    other => other.map_err(AlertError::from),
                }
            }
            other => other.map_err(AlertError::from),
        }
    }

    fn apply(
        &self,
        event: &IncomingAlert,
        fingerprint: &Fingerprint,
        now: DateTime<Utc>,
    ) -> std::result::Result<(Transition, Option<Alert>), StorageError> {
        let existing = self.repository.get_by_fingerprint(fingerprint)?;
        let transition = plan(
            existing.as_ref(),
            event,
            now,
            self.config.correlation_window,
        );
        let stored = match &transition.next {
            Some(next) => Some(self.repository.upsert(next)?),
            None => existing,
        };
        Ok((transition, stored))
    }

    /// Moves a firing alert to acknowledged. Acknowledged alerts keep
    /// deduplicating and still count as active.
    pub fn acknowledge(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Result<Alert> {
        let stored = self.locks.with_lock(fingerprint, || -> Result<Alert> {
            let mut alert = self
                .repository
                .get_by_fingerprint(fingerprint)?
                .ok_or_else(|| AlertError::NotFound(fingerprint.to_string()))?;
            if alert.status != AlertStatus::Firing {
                return Err(AlertError::InvalidTransition {
                    action: "acknowledge",
                    status: alert.status.to_string(),
                });
            }
            alert.status = AlertStatus::Acknowledged;
            alert.updated_at = now;
            let stored = self.repository.upsert(&alert).map_err(|e| match e {
                StorageError::VersionConflict { .. } => AlertError::Conflict {
                    fingerprint: fingerprint.to_string(),
                },
                other => AlertError::Storage(other),
            })?;
            self.observe_group(&stored, now);
            Ok(stored)
        })?;

        record_best_effort(
            self.history.as_ref(),
            HistoryRecord::new(
                HistoryKind::Acknowledged,
                fingerprint,
                stored.alertname(),
                "",
                now,
            ),
        );
        tracing::info!(fingerprint = %fingerprint.short(), "Alert acknowledged");
        Ok(stored)
    }

    /// Trims the lock table and drops idle correlation windows.
    pub fn compact(&self, now: DateTime<Utc>) -> (usize, usize) {
        (self.locks.compact(), self.correlator.prune(now))
    }
}
