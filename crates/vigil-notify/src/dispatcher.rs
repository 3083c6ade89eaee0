use crate::breaker::{BreakerConfig, CircuitBreaker, CircuitState};
use crate::error::{NotifyError, Result};
use crate::registry::ProviderRegistry;
use crate::retry::RetryPolicy;
use crate::template::TemplateSet;
use crate::{NotificationMessage, NotificationProvider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use vigil_common::channel::{ChannelConfig, ChannelKind};
use vigil_common::metrics::{AttemptOutcome, MetricsSink, NoopMetrics};
use vigil_common::rules::Receiver;
use vigil_common::Alert;
use vigil_storage::AlertRepository;

/// Summary of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub channel_id: String,
    pub kind: ChannelKind,
    /// Attempts used, including the successful one.
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Sends rendered alerts to channels with retries and per-channel breakers.
pub struct Dispatcher {
    repository: Arc<dyn AlertRepository>,
    registry: ProviderRegistry,
    templates: TemplateSet,
    retry: RetryPolicy,
    breaker_config: BreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    metrics: Arc<dyn MetricsSink>,
}

impl Dispatcher {
    pub fn new(repository: Arc<dyn AlertRepository>, registry: ProviderRegistry) -> Self {
        Self {
            repository,
            registry,
            templates: TemplateSet::default(),
            retry: RetryPolicy::default(),
            breaker_config: BreakerConfig::default(),
            breakers: Mutex::new(HashMap::new()),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_templates(mut self, templates: TemplateSet) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_breaker_config(mut self, config: BreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// The breaker guarding `channel_id`, created on first use.
    pub fn breaker(&self, channel_id: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self
            .breakers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            breakers
                .entry(channel_id.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(channel_id, self.breaker_config))),
        )
    }

    pub fn breaker_state(&self, channel_id: &str) -> Option<CircuitState> {
        self.breakers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(channel_id)
            .map(|b| b.state())
    }

    /// Delivers `alert` to `receiver`.
    ///
    /// # Errors
    ///
    /// Configuration problems (`ChannelNotFound`, `ChannelDisabled`,
    /// `UnsupportedChannel`) fail before any attempt. Permanent provider
    /// errors stop after the first attempt; transient ones are retried
    /// until [`NotifyError::Exhausted`]. `CircuitOpen` and `Cancelled` end
    /// the send immediately.
    pub async fn send(
        &self,
        alert: &Alert,
        receiver: &Receiver,
        cancel: &CancellationToken,
    ) -> Result<DeliveryReport> {
        let channel = self
            .repository
            .get_channel(&receiver.channel_id)
            .map_err(|e| NotifyError::Transient(format!("channel lookup failed: {e}")))?
            .ok_or_else(|| NotifyError::ChannelNotFound(receiver.channel_id.clone()))?;
        if !channel.enabled {
            return Err(NotifyError::ChannelDisabled(channel.id));
        }
        let provider = self.registry.get(channel.kind())?;
        let message = self.templates.render(&receiver.template, alert, &channel.id);
        let breaker = self.breaker(&channel.id);

        let started = Instant::now();
        let attempts = {
            let provider = provider.as_ref();
            let breaker = breaker.as_ref();
            let message = &message;
            let config = &channel.config;
            self.retry
                .run(cancel, move |attempt| async move {
                    self.attempt(provider, breaker, message, config, cancel)
                        .await
                        .map(|()| attempt)
                })
                .await
        };

        match attempts {
            Ok(attempts) => {
                let report = DeliveryReport {
                    channel_id: channel.id.clone(),
                    kind: channel.kind(),
                    attempts,
                    elapsed: started.elapsed(),
                };
                tracing::info!(
                    channel_id = %report.channel_id,
                    fingerprint = %alert.fingerprint.short(),
                    attempts = report.attempts,
                    "Notification delivered"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(
                    channel_id = %channel.id,
                    fingerprint = %alert.fingerprint.short(),
                    error = %e,
                    "Notification failed"
                );
                Err(e)
            }
        }
    }

    /// One breaker-guarded provider call.
    async fn attempt(
        &self,
        provider: &dyn NotificationProvider,
        breaker: &CircuitBreaker,
        message: &NotificationMessage,
        config: &ChannelConfig,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let channel_id = message.channel_id.as_str();
        let Some(permit) = breaker.try_acquire() else {
            self.metrics
                .dispatch_attempt(channel_id, AttemptOutcome::Rejected, Duration::ZERO);
            return Err(NotifyError::CircuitOpen(channel_id.to_string()));
        };

        let started = Instant::now();
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(NotifyError::Cancelled),
            result = provider.send(message, config) => result,
        };
        let elapsed = started.elapsed();

        match &result {
            Ok(()) => {
                permit.success();
                self.metrics
                    .dispatch_attempt(channel_id, AttemptOutcome::Success, elapsed);
            }
            // Dropping the permit hands a half-open trial back
            Err(NotifyError::Cancelled) => drop(permit),
            Err(e) => {
                permit.failure();
                self.metrics
                    .dispatch_attempt(channel_id, AttemptOutcome::Failure, elapsed);
                tracing::debug!(channel_id, error = %e, "Delivery attempt failed");
            }
        }
        result
    }
}
