use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use vigil_common::Fingerprint;

/// Kind of state-changing decision recorded for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Created,
    SeverityRaised,
    Resolved,
    Reopened,
    Acknowledged,
    Silenced,
    Inhibited,
    InhibitionCleared,
    Notified,
    NotifyFailed,
}

impl std::fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HistoryKind::Created => "created",
            HistoryKind::SeverityRaised => "severity_raised",
            HistoryKind::Resolved => "resolved",
            HistoryKind::Reopened => "reopened",
            HistoryKind::Acknowledged => "acknowledged",
            HistoryKind::Silenced => "silenced",
            HistoryKind::Inhibited => "inhibited",
            HistoryKind::InhibitionCleared => "inhibition_cleared",
            HistoryKind::Notified => "notified",
            HistoryKind::NotifyFailed => "notify_failed",
        };
        f.write_str(s)
    }
}

/// One audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub kind: HistoryKind,
    pub fingerprint: Fingerprint,
    pub alertname: String,
    /// Channel involved, for notify records.
    pub channel_id: Option<String>,
    pub detail: String,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(
        kind: HistoryKind,
        fingerprint: &Fingerprint,
        alertname: &str,
        detail: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: vigil_common::id::next_id(),
            kind,
            fingerprint: fingerprint.clone(),
            alertname: alertname.to_string(),
            channel_id: None,
            detail: detail.into(),
            recorded_at,
        }
    }

    pub fn with_channel(mut self, channel_id: &str) -> Self {
        self.channel_id = Some(channel_id.to_string());
        self
    }
}

/// Receives audit records. Callers treat failures as non-fatal.
pub trait HistorySink: Send + Sync {
    fn record(&self, record: HistoryRecord) -> Result<()>;
}

/// Records an entry and logs, rather than propagates, a sink failure.
pub fn record_best_effort(sink: &dyn HistorySink, record: HistoryRecord) {
    let kind = record.kind;
    let fingerprint = record.fingerprint.clone();
    if let Err(e) = sink.record(record) {
        tracing::warn!(
            kind = %kind,
            fingerprint = %fingerprint.short(),
            error = %e,
            "Failed to write history record"
        );
    }
}

/// Bounded in-memory history; the oldest entries fall off first.
pub struct MemoryHistory {
    capacity: usize,
    records: Mutex<VecDeque<HistoryRecord>>,
}

impl MemoryHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::new()),
        }
    }

    pub fn records(&self) -> Vec<HistoryRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn for_fingerprint(&self, fingerprint: &Fingerprint) -> Vec<HistoryRecord> {
        self.records()
            .into_iter()
            .filter(|r| &r.fingerprint == fingerprint)
            .collect()
    }

    pub fn count(&self, kind: HistoryKind) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl HistorySink for MemoryHistory {
    fn record(&self, record: HistoryRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        Ok(())
    }
}
