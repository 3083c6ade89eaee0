//! Notification channel models.
//!
//! Channel configuration arrives as an opaque JSON object keyed by channel
//! type. It is converted into a typed [`ChannelConfig`] exactly once, when
//! the channel is loaded, so providers never inspect raw maps.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Channel type tag used to look up a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Webhook,
    Email,
    Sms,
    Chat,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Webhook => "webhook",
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
            ChannelKind::Chat => "chat",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "webhook" => Ok(ChannelKind::Webhook),
            "email" => Ok(ChannelKind::Email),
            "sms" => Ok(ChannelKind::Sms),
            "chat" => Ok(ChannelKind::Chat),
            _ => Err(format!("unknown channel type: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub from: String,
    pub recipients: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsConfig {
    pub gateway_url: String,
    pub api_key: String,
    pub phone_numbers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub mentions: Vec<String>,
}

/// Typed per-kind channel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    Webhook(WebhookConfig),
    Email(EmailConfig),
    Sms(SmsConfig),
    Chat(ChatConfig),
}

impl ChannelConfig {
    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelConfig::Webhook(_) => ChannelKind::Webhook,
            ChannelConfig::Email(_) => ChannelKind::Email,
            ChannelConfig::Sms(_) => ChannelKind::Sms,
            ChannelConfig::Chat(_) => ChannelKind::Chat,
        }
    }

    /// Converts an opaque config object for `kind` into its typed form and
    /// validates it.
    ///
    /// # Examples
    ///
    /// ```
    /// use vigil_common::channel::{ChannelConfig, ChannelKind};
    ///
    /// let cfg = ChannelConfig::from_value(
    ///     ChannelKind::Webhook,
    ///     &serde_json::json!({ "url": "https://hooks.example.com/alerts" }),
    /// )
    /// .unwrap();
    /// assert_eq!(cfg.kind(), ChannelKind::Webhook);
    ///
    /// assert!(ChannelConfig::from_value(ChannelKind::Sms, &serde_json::json!({})).is_err());
    /// ```
    pub fn from_value(kind: ChannelKind, config: &Value) -> Result<Self, String> {
        let parsed = match kind {
            ChannelKind::Webhook => serde_json::from_value(config.clone()).map(Self::Webhook),
            ChannelKind::Email => serde_json::from_value(config.clone()).map(Self::Email),
            ChannelKind::Sms => serde_json::from_value(config.clone()).map(Self::Sms),
            ChannelKind::Chat => serde_json::from_value(config.clone()).map(Self::Chat),
        }
        .map_err(|e| format!("invalid {kind} config: {e}"))?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            ChannelConfig::Webhook(c) => require_http_url("url", &c.url),
            ChannelConfig::Email(c) => {
                require_non_empty("smtp_host", &c.smtp_host)?;
                if !c.from.contains('@') {
                    return Err(format!("invalid sender address: {}", c.from));
                }
                if c.recipients.is_empty() {
                    return Err("email channel needs at least one recipient".to_string());
                }
                Ok(())
            }
            ChannelConfig::Sms(c) => {
                require_http_url("gateway_url", &c.gateway_url)?;
                require_non_empty("api_key", &c.api_key)?;
                if c.phone_numbers.is_empty() {
                    return Err("sms channel needs at least one phone number".to_string());
                }
                Ok(())
            }
            ChannelConfig::Chat(c) => require_http_url("webhook_url", &c.webhook_url),
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    Ok(())
}

fn require_http_url(field: &str, value: &str) -> Result<(), String> {
    require_non_empty(field, value)?;
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(format!("{field} must be an http(s) URL: {value}"));
    }
    Ok(())
}

/// A configured notification destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub config: ChannelConfig,
}

fn default_enabled() -> bool {
    true
}

impl NotificationChannel {
    pub fn kind(&self) -> ChannelKind {
        self.config.kind()
    }
}
