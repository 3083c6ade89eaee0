use crate::error::{NotifyError, Result};
use crate::utils::{truncate_string, MAX_BODY_LENGTH};
use crate::{NotificationMessage, NotificationProvider};
use async_trait::async_trait;
use std::time::Duration;
use vigil_common::channel::{ChannelConfig, ChannelKind, WebhookConfig};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Posts the rendered message as JSON to the channel's URL.
pub struct WebhookProvider {
    client: reqwest::Client,
}

impl WebhookProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn payload(message: &NotificationMessage) -> serde_json::Value {
        serde_json::json!({
            "channel_id": message.channel_id,
            "title": message.title,
            "body": message.body,
            "fingerprint": message.fingerprint,
            "alertname": message.alertname,
            "severity": message.severity,
            "status": message.status,
            "labels": message.labels,
            "annotations": message.annotations,
            "starts_at": message.starts_at.to_rfc3339(),
        })
    }

    async fn post(&self, message: &NotificationMessage, cfg: &WebhookConfig) -> Result<()> {
        let timeout = Duration::from_secs(cfg.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let mut request = self
            .client
            .post(cfg.url.as_str())
            .timeout(timeout)
            .json(&Self::payload(message));
        for (name, value) in &cfg.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &cfg.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() || e.is_connect() => {
                return Err(NotifyError::Transient(format!("webhook unreachable: {e}")));
            }
            Err(e) => return Err(NotifyError::Http(e)),
        };

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = match response.text().await {
            Ok(text) => truncate_string(&text, MAX_BODY_LENGTH),
            Err(e) => format!("[failed to read response body: {e}]"),
        };
        let code = status.as_u16();
        match code {
            401 | 403 => Err(NotifyError::Unauthorized {
                service: "webhook".to_string(),
                status: code,
            }),
            429 | 500..=599 => Err(NotifyError::Transient(format!("webhook HTTP {code}: {body}"))),
            _ => Err(NotifyError::ApiError {
                service: "webhook".to_string(),
                status: code,
                body,
            }),
        }
    }
}

impl Default for WebhookProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationProvider for WebhookProvider {
    async fn send(&self, message: &NotificationMessage, config: &ChannelConfig) -> Result<()> {
        match config {
            ChannelConfig::Webhook(cfg) => {
                self.post(message, cfg).await?;
                tracing::debug!(
                    channel_id = %message.channel_id,
                    fingerprint = %message.fingerprint.short(),
                    "Webhook delivered"
                );
                Ok(())
            }
            other => Err(NotifyError::InvalidConfig(format!(
                "webhook provider cannot use {} config",
                other.kind()
            ))),
        }
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }
}
