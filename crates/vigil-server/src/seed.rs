//! JSON seed file with channels, routing rules, inhibition rules and
//! silences, loaded into the in-memory store at startup.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use vigil_common::channel::{ChannelConfig, ChannelKind, NotificationChannel};
use vigil_common::rules::{InhibitionRule, RoutingRule, Silence};
use vigil_common::MatcherSet;
use vigil_notify::registry::ProviderRegistry;
use vigil_notify::utils::redact_sensitive_json;
use vigil_storage::MemoryStore;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub channels: Vec<SeedChannel>,
    #[serde(default)]
    pub routing_rules: Vec<RoutingRule>,
    #[serde(default)]
    pub inhibition_rules: Vec<InhibitionRule>,
    #[serde(default)]
    pub silences: Vec<SeedSilence>,
}

/// Channel as written in the seed: type tag plus an opaque config object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedChannel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub channel_type: ChannelKind,
    #[serde(default = "default_seed_enabled")]
    pub enabled: bool,
    pub config: serde_json::Value,
}

fn default_seed_enabled() -> bool {
    true
}

impl SeedChannel {
    pub fn to_channel(&self) -> Result<NotificationChannel, String> {
        let config = ChannelConfig::from_value(self.channel_type, &self.config)
            .map_err(|e| format!("channel '{}': {e}", self.id))?;
        Ok(NotificationChannel {
            id: self.id.clone(),
            name: self.name.clone().unwrap_or_else(|| self.id.clone()),
            enabled: self.enabled,
            config,
        })
    }
}

/// Silence as written in the seed. `starts_at` defaults to load time and
/// either `ends_at` or `duration_secs` must be given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedSilence {
    #[serde(default)]
    pub id: Option<String>,
    pub matchers: MatcherSet,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_secs: Option<i64>,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub comment: String,
}

impl SeedSilence {
    pub fn to_silence(&self, now: DateTime<Utc>) -> Result<Silence, String> {
        let starts_at = self.starts_at.unwrap_or(now);
        let ends_at = match (self.ends_at, self.duration_secs) {
            (Some(end), _) => end,
            (None, Some(secs)) if secs > 0 => Duration::try_seconds(secs)
                .and_then(|d| starts_at.checked_add_signed(d))
                .ok_or_else(|| {
                    format!(
                        "silence on {}: duration_secs {} out of range",
                        self.matchers, secs
                    )
                })?,
            _ => {
                return Err(format!(
                    "silence on {}: ends_at or positive duration_secs required",
                    self.matchers
                ))
            }
        };
        let silence = Silence {
            id: self.id.clone().unwrap_or_else(vigil_common::id::next_id),
            matchers: self.matchers.clone(),
            starts_at,
            ends_at,
            creator: self.creator.clone(),
            comment: self.comment.clone(),
        };
        silence.validate()?;
        Ok(silence)
    }
}

/// Counts of what a seed contains or loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub channels: usize,
    pub routing_rules: usize,
    pub inhibition_rules: usize,
    pub silences: usize,
}

impl std::fmt::Display for SeedSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} channels, {} routing rules, {} inhibition rules, {} silences",
            self.channels, self.routing_rules, self.inhibition_rules, self.silences
        )
    }
}

impl SeedFile {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read seed file '{}': {}", path, e))?;
        let seed: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{}': {}", path, e))?;
        Ok(seed)
    }

    /// Checks every entry and returns all problems found, not just the
    /// first. Matcher syntax is already checked while parsing.
    pub fn validate(&self, registry: &ProviderRegistry, now: DateTime<Utc>) -> Vec<String> {
        let mut problems = Vec::new();

        let mut channel_ids = HashSet::new();
        for seed in &self.channels {
            if !channel_ids.insert(seed.id.as_str()) {
                problems.push(format!("duplicate channel id '{}'", seed.id));
            }
            match seed.to_channel() {
                Ok(channel) => {
                    if let Err(e) = registry.validate(&channel) {
                        problems.push(format!("channel '{}': {e}", seed.id));
                    }
                }
                Err(e) => problems.push(e),
            }
        }

        let mut rule_ids = HashSet::new();
        for rule in &self.routing_rules {
            if !rule_ids.insert(rule.id.as_str()) {
                problems.push(format!("duplicate routing rule id '{}'", rule.id));
            }
            if rule.receivers.is_empty() {
                problems.push(format!("routing rule '{}' has no receivers", rule.id));
            }
            for receiver in &rule.receivers {
                if !channel_ids.contains(receiver.channel_id.as_str()) {
                    problems.push(format!(
                        "routing rule '{}' targets unknown channel '{}'",
                        rule.id, receiver.channel_id
                    ));
                }
            }
        }

        for rule in &self.inhibition_rules {
            if rule.source_matchers.is_empty() || rule.target_matchers.is_empty() {
                problems.push(format!(
                    "inhibition rule '{}' needs source and target matchers",
                    rule.id
                ));
            }
        }

        for silence in &self.silences {
            if let Err(e) = silence.to_silence(now) {
                problems.push(e);
            }
        }
        problems
    }

    pub fn summary(&self) -> SeedSummary {
        SeedSummary {
            channels: self.channels.len(),
            routing_rules: self.routing_rules.len(),
            inhibition_rules: self.inhibition_rules.len(),
            silences: self.silences.len(),
        }
    }

    /// Writes the seed into `store`. Invalid entries abort the load.
    pub fn apply(&self, store: &MemoryStore, now: DateTime<Utc>) -> anyhow::Result<SeedSummary> {
        for seed in &self.channels {
            let channel = seed.to_channel().map_err(|e| anyhow::anyhow!(e))?;
            tracing::info!(
                channel_id = %channel.id,
                kind = %channel.kind(),
                config = %redact_sensitive_json(&seed.config),
                "Loaded notification channel"
            );
            store.put_channel(channel)?;
        }
        for rule in &self.routing_rules {
            store.put_routing_rule(rule.clone());
        }
        for rule in &self.inhibition_rules {
            store.put_inhibition_rule(rule.clone());
        }
        for seed in &self.silences {
            let silence = seed.to_silence(now).map_err(|e| anyhow::anyhow!(e))?;
            store.put_silence(silence)?;
        }
        let summary = self.summary();
        tracing::info!(summary = %summary, "Seed loaded");
        Ok(summary)
    }
}
