use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use vigil_common::{Alert, AlertGroup, AlertStatus, Fingerprint, Severity};

#[derive(Debug, Clone, Copy)]
struct Member {
    severity: Severity,
    status: AlertStatus,
    version: u64,
}

struct GroupState {
    common_labels: BTreeMap<String, String>,
    members: BTreeMap<Fingerprint, Member>,
    updated_at: DateTime<Utc>,
}

impl GroupState {
    fn snapshot(&self, key: &str) -> AlertGroup {
        let severity = self
            .members
            .values()
            .map(|member| member.severity)
            .max()
            .unwrap_or_default();
        let status = if self.members.is_empty() {
            AlertStatus::Resolved
        } else if self
            .members
            .values()
            .any(|member| member.status == AlertStatus::Firing)
        {
            AlertStatus::Firing
        } else {
            AlertStatus::Acknowledged
        };
        AlertGroup {
            group_key: key.to_string(),
            common_labels: self.common_labels.clone(),
            severity,
            status,
            members: self.members.keys().cloned().collect(),
            updated_at: self.updated_at,
        }
    }
}

/// Folds alerts sharing the `group_by` label values into one [`AlertGroup`].
pub struct AlertGrouper {
    group_by: Vec<String>,
    groups: Mutex<HashMap<String, GroupState>>,
}

impl AlertGrouper {
    pub fn new(group_by: Vec<String>) -> Self {
        Self {
            group_by,
            groups: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.group_by.is_empty()
    }

    /// Key built from the `group_by` values, or `None` when the alert
    /// lacks one of them.
    pub fn group_key(&self, alert: &Alert) -> Option<String> {
        if self.group_by.is_empty() {
            return None;
        }
        let mut parts = Vec::with_capacity(self.group_by.len());
        for name in &self.group_by {
            let value = alert.labels.get(name)?;
            parts.push(format!("{name}={value}"));
        }
        Some(parts.join(","))
    }

    /// Applies the alert's current state to its group and returns the
    /// group as it now stands. A group whose last member resolved is
    /// returned once with status resolved and then forgotten. A member
    /// only moves forward: an alert older than the stored version of the
    /// same fingerprint leaves the group untouched.
    pub fn observe(&self, alert: &Alert, now: DateTime<Utc>) -> Option<AlertGroup> {
        let key = self.group_key(alert)?;
        let mut groups = self
            .groups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let stale = groups
            .get(&key)
            .and_then(|state| state.members.get(&alert.fingerprint))
            .is_some_and(|member| member.version > alert.version);
        if stale {
            tracing::debug!(
                group = %key,
                fingerprint = %alert.fingerprint.short(),
                version = alert.version,
                "Ignoring stale group update"
            );
            return groups.get(&key).map(|state| state.snapshot(&key));
        }

        if !alert.is_active() {
            let state = groups.get_mut(&key)?;
            state.members.remove(&alert.fingerprint);
            state.updated_at = now;
            let snapshot = state.snapshot(&key);
            if state.members.is_empty() {
                groups.remove(&key);
                tracing::debug!(group = %key, "Alert group closed");
            }
            return Some(snapshot);
        }

        let state = groups.entry(key.clone()).or_insert_with(|| {
            let common_labels = self
                .group_by
                .iter()
                .filter_map(|name| alert.labels.get(name).map(|v| (name.clone(), v.clone())))
                .collect();
            GroupState {
                common_labels,
                members: BTreeMap::new(),
                updated_at: now,
            }
        });
        state.members.insert(
            alert.fingerprint.clone(),
            Member {
                severity: alert.severity,
                status: alert.status,
                version: alert.version,
            },
        );
        state.updated_at = now;
        Some(state.snapshot(&key))
    }

    pub fn get(&self, key: &str) -> Option<AlertGroup> {
        self.groups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .map(|state| state.snapshot(key))
    }

    pub fn groups(&self) -> Vec<AlertGroup> {
        let groups = self
            .groups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut out: Vec<AlertGroup> = groups.iter().map(|(k, s)| s.snapshot(k)).collect();
        out.sort_by(|a, b| a.group_key.cmp(&b.group_key));
        out
    }
}
