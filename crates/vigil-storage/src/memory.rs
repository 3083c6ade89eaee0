use crate::error::{Result, StorageError};
use crate::AlertRepository;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use vigil_common::channel::NotificationChannel;
use vigil_common::rules::{InhibitionRule, RoutingRule, Silence};
use vigil_common::{Alert, Fingerprint};

/// In-process [`AlertRepository`].
///
/// Each table sits behind its own `RwLock`; readers never block each other
/// and every list call clones a consistent snapshot under the read guard.
#[derive(Default)]
pub struct MemoryStore {
    alerts: RwLock<HashMap<Fingerprint, Alert>>,
    routing_rules: RwLock<HashMap<String, RoutingRule>>,
    inhibition_rules: RwLock<HashMap<String, InhibitionRule>>,
    silences: RwLock<HashMap<String, Silence>>,
    channels: RwLock<HashMap<String, NotificationChannel>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn priority_order(a: (i32, &str), b: (i32, &str)) -> std::cmp::Ordering {
    b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a routing rule by id.
    pub fn put_routing_rule(&self, rule: RoutingRule) {
        tracing::debug!(rule_id = %rule.id, priority = rule.priority, "Routing rule stored");
        write(&self.routing_rules).insert(rule.id.clone(), rule);
    }

    pub fn remove_routing_rule(&self, id: &str) -> bool {
        write(&self.routing_rules).remove(id).is_some()
    }

    pub fn set_routing_rule_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut rules = write(&self.routing_rules);
        let rule = rules.get_mut(id).ok_or_else(|| StorageError::NotFound {
            entity: "routing_rule",
            id: id.to_string(),
        })?;
        rule.enabled = enabled;
        Ok(())
    }

    pub fn put_inhibition_rule(&self, rule: InhibitionRule) {
        tracing::debug!(rule_id = %rule.id, "Inhibition rule stored");
        write(&self.inhibition_rules).insert(rule.id.clone(), rule);
    }

    pub fn remove_inhibition_rule(&self, id: &str) -> bool {
        write(&self.inhibition_rules).remove(id).is_some()
    }

    /// Stores a silence after validating its matchers and time range.
    pub fn put_silence(&self, silence: Silence) -> Result<()> {
        silence.validate().map_err(|reason| StorageError::Invalid {
            entity: "silence",
            reason,
        })?;
        tracing::debug!(
            silence_id = %silence.id,
            starts_at = %silence.starts_at,
            ends_at = %silence.ends_at,
            "Silence stored"
        );
        write(&self.silences).insert(silence.id.clone(), silence);
        Ok(())
    }

    /// Ends a silence early by moving `ends_at` to `now`.
    pub fn expire_silence(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let mut silences = write(&self.silences);
        let silence = silences.get_mut(id).ok_or_else(|| StorageError::NotFound {
            entity: "silence",
            id: id.to_string(),
        })?;
        if silence.ends_at > now {
            silence.ends_at = now;
        }
        Ok(())
    }

    pub fn list_silences(&self) -> Vec<Silence> {
        read(&self.silences).values().cloned().collect()
    }

    /// Stores a channel after validating its typed configuration.
    pub fn put_channel(&self, channel: NotificationChannel) -> Result<()> {
        channel
            .config
            .validate()
            .map_err(|reason| StorageError::Invalid {
                entity: "notification_channel",
                reason,
            })?;
        write(&self.channels).insert(channel.id.clone(), channel);
        Ok(())
    }

    pub fn list_alerts(&self) -> Vec<Alert> {
        read(&self.alerts).values().cloned().collect()
    }

    pub fn alert_count(&self) -> usize {
        read(&self.alerts).len()
    }
}

impl AlertRepository for MemoryStore {
    fn get_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Option<Alert>> {
        Ok(read(&self.alerts).get(fingerprint).cloned())
    }

    fn upsert(&self, alert: &Alert) -> Result<Alert> {
        let mut alerts = write(&self.alerts);
        let actual = alerts.get(&alert.fingerprint).map(|a| a.version).unwrap_or(0);
        if actual != alert.version {
            return Err(StorageError::VersionConflict {
                fingerprint: alert.fingerprint.to_string(),
                expected: alert.version,
                actual,
            });
        }
        let mut stored = alert.clone();
        stored.version = actual + 1;
        alerts.insert(stored.fingerprint.clone(), stored.clone());
        Ok(stored)
    }

    fn list_firing(&self) -> Result<Vec<Alert>> {
        Ok(read(&self.alerts)
            .values()
            .filter(|a| a.is_active())
            .cloned()
            .collect())
    }

    fn list_active_silences(&self, now: DateTime<Utc>) -> Result<Vec<Silence>> {
        Ok(read(&self.silences)
            .values()
            .filter(|s| s.is_active(now))
            .cloned()
            .collect())
    }

    fn list_enabled_routing_rules(&self) -> Result<Vec<RoutingRule>> {
        let mut rules: Vec<RoutingRule> = read(&self.routing_rules)
            .values()
            .filter(|r| r.enabled)
            .cloned()
            .collect();
        rules.sort_by(|a, b| priority_order((a.priority, &a.id), (b.priority, &b.id)));
        Ok(rules)
    }

    fn list_enabled_inhibition_rules(&self) -> Result<Vec<InhibitionRule>> {
        let mut rules: Vec<InhibitionRule> = read(&self.inhibition_rules)
            .values()
            .filter(|r| r.enabled)
            .cloned()
            .collect();
        rules.sort_by(|a, b| priority_order((a.priority, &a.id), (b.priority, &b.id)));
        Ok(rules)
    }

    fn get_channel(&self, id: &str) -> Result<Option<NotificationChannel>> {
        Ok(read(&self.channels).get(id).cloned())
    }
}
