//! Persistence boundary of the alert pipeline.
//!
//! The engines only talk to an [`AlertRepository`] and a
//! [`history::HistorySink`]; durable backends live outside this workspace.
//! [`memory::MemoryStore`] is the reference implementation used by the
//! server binary and the test suites.

pub mod error;
pub mod history;
pub mod memory;


use chrono::{DateTime, Utc};
use vigil_common::channel::NotificationChannel;
use vigil_common::rules::{InhibitionRule, RoutingRule, Silence};
use vigil_common::{Alert, Fingerprint};

pub use error::{Result, StorageError};
pub use history::{HistoryKind, HistoryRecord, HistorySink, MemoryHistory};
pub use memory::MemoryStore;

/// Read/write access to alerts and read access to rule state.
///
/// Implementations must be `Send + Sync`: many pipeline workers share one
/// repository. Every list method returns an owned snapshot so a rule pass
/// never observes a concurrent edit half-applied.
pub trait AlertRepository: Send + Sync {
    /// Looks up the single alert row for a fingerprint.
    fn get_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Option<Alert>>;

    /// Inserts or replaces an alert row, compare-and-swap on `version`.
    ///
    /// A new row must carry `version == 0`; an existing row is replaced only
    /// when `alert.version` equals the stored version. On success the stored
    /// copy (with its version bumped) is returned.
    ///
    /// # Errors
    ///
    /// [`StorageError::VersionConflict`] when another writer got there first.
    fn upsert(&self, alert: &Alert) -> Result<Alert>;

    /// Alerts in an open episode (firing or acknowledged).
    fn list_firing(&self) -> Result<Vec<Alert>>;

    /// Silences with `starts_at <= now < ends_at`.
    fn list_active_silences(&self, now: DateTime<Utc>) -> Result<Vec<Silence>>;

    /// Enabled routing rules, priority descending then id ascending.
    fn list_enabled_routing_rules(&self) -> Result<Vec<RoutingRule>>;

    /// Enabled inhibition rules, priority descending then id ascending.
    fn list_enabled_inhibition_rules(&self) -> Result<Vec<InhibitionRule>>;

    /// Looks up a notification channel by id.
    fn get_channel(&self, id: &str) -> Result<Option<NotificationChannel>>;
}
