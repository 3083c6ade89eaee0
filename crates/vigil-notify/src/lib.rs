//! Notification delivery with retries and per-channel circuit breaking.
//!
//! A [`dispatcher::Dispatcher`] resolves a receiver's channel, renders the
//! message through a [`template::TemplateSet`] and hands it to the
//! [`NotificationProvider`] registered for the channel kind. Every call is
//! wrapped by a [`breaker::CircuitBreaker`] and driven by a
//! [`retry::RetryPolicy`]. The built-in provider posts JSON to a webhook.

pub mod breaker;
pub mod channels;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod retry;
pub mod template;
pub mod utils;


use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use vigil_common::channel::{ChannelConfig, ChannelKind};
use vigil_common::{AlertStatus, Fingerprint, Labels, Severity};

pub use dispatcher::{DeliveryReport, Dispatcher};
pub use error::{NotifyError, Result};

/// A rendered notification, ready for a provider.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationMessage {
    pub channel_id: String,
    pub title: String,
    pub body: String,
    pub fingerprint: Fingerprint,
    pub alertname: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub labels: Labels,
    pub annotations: Labels,
    pub starts_at: DateTime<Utc>,
}

/// Delivers a rendered message over one channel kind.
///
/// Providers are stateless with respect to channels: the channel's typed
/// configuration is passed on every call. Implementations classify their
/// failures so the retry policy can tell transient from permanent ones.
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    /// Sends `message` using `config`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Transient`] for failures worth retrying and a
    /// permanent variant otherwise.
    async fn send(&self, message: &NotificationMessage, config: &ChannelConfig) -> Result<()>;

    fn kind(&self) -> ChannelKind;
}
