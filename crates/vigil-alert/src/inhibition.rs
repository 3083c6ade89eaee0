use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use vigil_common::rules::{InhibitionRule, InhibitionStatus};
use vigil_common::{Alert, Fingerprint, Labels};

pub const DEFAULT_INHIBITION_TTL_SECS: i64 = 600;

/// Alerts whose inhibition state changed during a re-evaluation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReevaluationReport {
    pub inhibited: Vec<Fingerprint>,
    pub cleared: Vec<Fingerprint>,
}

/// Tracks which active alerts are muted by which source.
///
/// Status records carry a TTL so a target stays muted only while some
/// evaluation keeps confirming its source; a crashed or stalled source
/// cannot mute a target forever.
pub struct InhibitionEngine {
    ttl: Duration,
    statuses: RwLock<HashMap<Fingerprint, InhibitionStatus>>,
}

impl InhibitionEngine {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            statuses: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Fingerprint, InhibitionStatus>> {
        self.statuses
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Fingerprint, InhibitionStatus>> {
        self.statuses
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Finds the first (rule, source) pair that mutes `target`.
    ///
    /// Rules are tried by priority descending, id ascending. Among the
    /// sources a rule admits, the lowest fingerprint wins so repeated
    /// evaluations report the same source.
    fn find_source<'a>(
        target: &Alert,
        rules: &'a [InhibitionRule],
        active: &'a [Alert],
    ) -> Option<(&'a InhibitionRule, &'a Alert)> {
        let mut ordered: Vec<&InhibitionRule> = rules.iter().filter(|r| r.enabled).collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));

        let target_labels = target.match_labels();
        let sources: Vec<(&'a Alert, Labels)> = active
            .iter()
            .filter(|source| source.fingerprint != target.fingerprint && source.is_active())
            .map(|source| (source, source.match_labels()))
            .collect();

        ordered.into_iter().find_map(|rule| {
            if !rule.target_matchers.matches(&target_labels) {
                return None;
            }
            sources
                .iter()
                .filter(|(_, labels)| {
                    rule.source_matchers.matches(labels)
                        && rule.equal_labels_agree(labels, &target_labels)
                })
                .map(|(source, _)| *source)
                .min_by(|a, b| a.fingerprint.cmp(&b.fingerprint))
                .map(|source| (rule, source))
        })
    }

    /// Decides whether `alert` is inhibited right now, updating the
    /// stored status either way.
    pub fn evaluate(
        &self,
        alert: &Alert,
        rules: &[InhibitionRule],
        active_alerts: &[Alert],
        now: DateTime<Utc>,
    ) -> Option<InhibitionStatus> {
        if !alert.is_active() {
            self.clear(&alert.fingerprint);
            return None;
        }

        let Some((rule, source)) = Self::find_source(alert, rules, active_alerts) else {
            self.clear(&alert.fingerprint);
            return None;
        };

        let mut statuses = self.write();
        let previous = statuses
            .get(&alert.fingerprint)
            .filter(|s| s.source_fingerprint == source.fingerprint && s.rule_id == rule.id)
            .map(|s| s.created_at);
        let created_at = previous.unwrap_or(now);
        let status = InhibitionStatus {
            target_fingerprint: alert.fingerprint.clone(),
            source_fingerprint: source.fingerprint.clone(),
            rule_id: rule.id.clone(),
            created_at,
            expires_at: now + self.ttl,
        };
        if previous.is_none() {
            tracing::info!(
                fingerprint = %alert.fingerprint.short(),
                source = %source.fingerprint.short(),
                rule_id = %rule.id,
                "Alert inhibited"
            );
        }
        statuses.insert(alert.fingerprint.clone(), status.clone());
        Some(status)
    }

    fn clear(&self, fingerprint: &Fingerprint) -> Option<InhibitionStatus> {
        let removed = self.write().remove(fingerprint);
        if let Some(status) = &removed {
            tracing::info!(
                fingerprint = %fingerprint.short(),
                source = %status.source_fingerprint.short(),
                "Inhibition cleared"
            );
        }
        removed
    }

    /// Recomputes inhibition for every active alert and drops status
    /// records of alerts that are no longer active.
    pub fn reevaluate(
        &self,
        active_alerts: &[Alert],
        rules: &[InhibitionRule],
        now: DateTime<Utc>,
    ) -> ReevaluationReport {
        let mut report = ReevaluationReport::default();

        for alert in active_alerts.iter().filter(|a| a.is_active()) {
            let was_inhibited = self.read().contains_key(&alert.fingerprint);
            match self.evaluate(alert, rules, active_alerts, now) {
                Some(_) if !was_inhibited => report.inhibited.push(alert.fingerprint.clone()),
                None if was_inhibited => report.cleared.push(alert.fingerprint.clone()),
                _ => {}
            }
        }

        let mut statuses = self.write();
        let stale: Vec<Fingerprint> = statuses
            .keys()
            .filter(|fp| !active_alerts.iter().any(|a| a.is_active() && &a.fingerprint == *fp))
            .cloned()
            .collect();
        for fp in stale {
            statuses.remove(&fp);
            report.cleared.push(fp);
        }
        report
    }

    /// Drops status records whose TTL elapsed. Returns how many.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut statuses = self.write();
        let before = statuses.len();
        statuses.retain(|_, status| !status.is_expired(now));
        let purged = before - statuses.len();
        if purged > 0 {
            tracing::debug!(purged, "Purged expired inhibition records");
        }
        purged
    }

    /// Current, unexpired status for `fingerprint`.
    pub fn status_of(
        &self,
        fingerprint: &Fingerprint,
        now: DateTime<Utc>,
    ) -> Option<InhibitionStatus> {
        self.read()
            .get(fingerprint)
            .filter(|s| !s.is_expired(now))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl Default for InhibitionEngine {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_INHIBITION_TTL_SECS))
    }
}
