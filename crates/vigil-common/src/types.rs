use crate::error::ValidationError;
use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Label and annotation maps.
pub type Labels = HashMap<String, String>;

/// The label every alert must carry.
pub const ALERTNAME_LABEL: &str = "alertname";

/// Names under which an alert's severity and status are visible to
/// matchers when its labels don't already define them.
pub const SEVERITY_LABEL: &str = "severity";
pub const STATUS_LABEL: &str = "status";

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use vigil_common::types::Severity;
///
/// let sev: Severity = "warning".parse().unwrap();
/// assert_eq!(sev, Severity::Warning);
/// assert_eq!(sev.to_string(), "warning");
/// assert!(Severity::Critical > Severity::Info);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    #[default]
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Lifecycle state of a stored alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    /// Firing and acknowledged alerts are both part of an open episode.
    pub fn is_active(self) -> bool {
        !matches!(self, AlertStatus::Resolved)
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Firing => write!(f, "firing"),
            AlertStatus::Acknowledged => write!(f, "acknowledged"),
            AlertStatus::Resolved => write!(f, "resolved"),
        }
    }
}

/// Status signalled by the monitoring source on a raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncomingStatus {
    #[default]
    Firing,
    Resolved,
}

/// A raw alert event as delivered by a monitoring source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomingAlert {
    pub labels: Labels,
    #[serde(default)]
    pub annotations: Labels,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub status: IncomingStatus,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    /// Free-form origin tag (e.g. `"prometheus"`).
    #[serde(default)]
    pub source: Option<String>,
}

impl IncomingAlert {
    pub fn firing(labels: Labels, severity: Severity) -> Self {
        Self {
            labels,
            severity,
            ..Default::default()
        }
    }

    pub fn resolved(labels: Labels) -> Self {
        Self {
            labels,
            status: IncomingStatus::Resolved,
            ..Default::default()
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status == IncomingStatus::Resolved
    }

    /// Checks the event before it may touch any alert state.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.labels.is_empty() {
            return Err(ValidationError::EmptyLabels);
        }
        match self.labels.get(ALERTNAME_LABEL) {
            Some(name) if !name.trim().is_empty() => {}
            _ => return Err(ValidationError::MissingLabel(ALERTNAME_LABEL)),
        }
        if let Some(bad) = self.labels.keys().find(|k| !is_valid_label_name(k)) {
            return Err(ValidationError::InvalidLabelName(bad.clone()));
        }
        if let (Some(start), Some(end)) = (self.starts_at, self.ends_at) {
            if end < start {
                return Err(ValidationError::InvertedTimeRange);
            }
        }
        Ok(())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_labels(&self.labels)
    }
}

/// Returns true for names of the form `[a-zA-Z_][a-zA-Z0-9_]*`.
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The stored alert record, one row per fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub fingerprint: Fingerprint,
    pub labels: Labels,
    pub annotations: Labels,
    pub severity: Severity,
    pub status: AlertStatus,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    /// Number of firing episodes seen for this fingerprint.
    pub occurrences: u32,
    /// Optimistic concurrency token, bumped by every successful upsert.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    /// Builds a brand new firing alert from a validated event.
    pub fn from_incoming(event: &IncomingAlert, now: DateTime<Utc>) -> Self {
        Self {
            id: crate::id::next_id(),
            fingerprint: event.fingerprint(),
            labels: event.labels.clone(),
            annotations: event.annotations.clone(),
            severity: event.severity,
            status: AlertStatus::Firing,
            starts_at: event.starts_at.unwrap_or(now),
            ends_at: None,
            occurrences: 1,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn alertname(&self) -> &str {
        self.labels
            .get(ALERTNAME_LABEL)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Labels that silences, inhibition and routing rules match against:
    /// the alert's own labels plus its current severity and status. A
    /// `severity` or `status` label set on the event wins over the field.
    pub fn match_labels(&self) -> Labels {
        let mut labels = self.labels.clone();
        labels
            .entry(SEVERITY_LABEL.to_string())
            .or_insert_with(|| self.severity.to_string());
        labels
            .entry(STATUS_LABEL.to_string())
            .or_insert_with(|| self.status.to_string());
        labels
    }
}

/// Alerts sharing the values of a configured subset of labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertGroup {
    pub group_key: String,
    pub common_labels: BTreeMap<String, String>,
    pub severity: Severity,
    pub status: AlertStatus,
    pub members: Vec<Fingerprint>,
    pub updated_at: DateTime<Utc>,
}

/// Format labels map into a human-readable string.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use vigil_common::types::format_labels;
///
/// let mut labels = HashMap::new();
/// labels.insert("instance".to_string(), "node1".to_string());
/// labels.insert("alertname".to_string(), "HighCPU".to_string());
/// assert_eq!(format_labels(&labels), "alertname=HighCPU, instance=node1");
/// ```
pub fn format_labels(labels: &Labels) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let mut pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    pairs.join(", ")
}
