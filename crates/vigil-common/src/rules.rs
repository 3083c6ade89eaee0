//! Routing, silence and inhibition rule models.
//!
//! All matcher fields are [`MatcherSet`]s, so a rule that deserialized
//! successfully has already had its regexes compiled.

use crate::fingerprint::Fingerprint;
use crate::matcher::MatcherSet;
use crate::types::Labels;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Template used when a receiver does not name one.
pub const DEFAULT_TEMPLATE: &str = "default";

/// A notification channel plus the template used to render for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receiver {
    pub channel_id: String,
    #[serde(default = "default_template")]
    pub template: String,
}

impl Receiver {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            template: default_template(),
        }
    }

    pub fn with_template(channel_id: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            template: template.into(),
        }
    }
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

fn default_enabled() -> bool {
    true
}

/// A priority-ordered routing rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub conditions: MatcherSet,
    pub receivers: Vec<Receiver>,
    /// Keep evaluating lower-priority rules after this one matches.
    #[serde(default, rename = "continue")]
    pub continue_matching: bool,
}

/// A time-bounded suppression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Silence {
    pub id: String,
    pub matchers: MatcherSet,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SilenceState {
    Pending,
    Active,
    Expired,
}

impl Silence {
    /// `starts_at <= now < ends_at`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.ends_at
    }

    pub fn state(&self, now: DateTime<Utc>) -> SilenceState {
        if now < self.starts_at {
            SilenceState::Pending
        } else if now < self.ends_at {
            SilenceState::Active
        } else {
            SilenceState::Expired
        }
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        self.matchers.matches(labels)
    }

    /// A silence with no matchers would mute everything, so it is refused.
    pub fn validate(&self) -> Result<(), String> {
        if self.matchers.is_empty() {
            return Err(format!("silence {} has no matchers", self.id));
        }
        if self.ends_at <= self.starts_at {
            return Err(format!("silence {} ends before it starts", self.id));
        }
        Ok(())
    }
}

/// Mutes targets while a related source alert fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InhibitionRule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub source_matchers: MatcherSet,
    pub target_matchers: MatcherSet,
    /// Label names whose values must agree on source and target.
    #[serde(default)]
    pub equal: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl InhibitionRule {
    pub fn equal_labels_agree(&self, source: &Labels, target: &Labels) -> bool {
        self.equal.iter().all(|name| {
            let s = source.get(name).map(String::as_str).unwrap_or("");
            let t = target.get(name).map(String::as_str).unwrap_or("");
            s == t
        })
    }
}

/// Bookkeeping that links a suppressed target to the source muting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InhibitionStatus {
    pub target_fingerprint: Fingerprint,
    pub source_fingerprint: Fingerprint,
    pub rule_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl InhibitionStatus {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
