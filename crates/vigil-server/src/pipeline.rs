//! End-to-end alert pipeline: dedup, silence, inhibition, routing and
//! asynchronous dispatch.
//!
//! [`AlertPipeline::evaluate`] is synchronous and never waits on the
//! network; [`AlertPipeline::ingest`] evaluates and then hands each
//! delivery to a tracked background task so a slow channel cannot hold
//! up the next event.

use crate::config::ServerConfig;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use vigil_alert::correlation::CorrelationSignal;
use vigil_alert::grouping::AlertGrouper;
use vigil_alert::inhibition::ReevaluationReport;
use vigil_alert::{
    AlertError, DedupAction, DedupEngine, DedupOutcome, InhibitionEngine, Resolution,
    RoutingEngine, SilenceEngine,
};
use vigil_common::metrics::{MetricsSink, Suppression};
use vigil_common::rules::{InhibitionStatus, Receiver};
use vigil_common::{Alert, AlertGroup, Fingerprint, IncomingAlert};
use vigil_notify::registry::ProviderRegistry;
use vigil_notify::{DeliveryReport, Dispatcher, NotifyError};
use vigil_storage::history::{record_best_effort, HistoryKind, HistoryRecord, HistorySink};
use vigil_storage::{AlertRepository, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Pipeline: {0}")]
    Alert(#[from] AlertError),

    #[error("Pipeline: {0}")]
    Storage(#[from] StorageError),
}

/// What happened to a notification-eligible transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Not eligible: a duplicate, or nothing changed that anyone needs to hear.
    Quiet,
    Silenced { silence_id: String },
    Inhibited(InhibitionStatus),
    Routed(Resolution),
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub outcome: DedupOutcome,
    pub verdict: Verdict,
}

impl Decision {
    pub fn action(&self) -> DedupAction {
        self.outcome.action
    }

    pub fn correlations(&self) -> &[CorrelationSignal] {
        &self.outcome.correlations
    }

    pub fn group(&self) -> Option<&AlertGroup> {
        self.outcome.group.as_ref()
    }

    /// Receivers the alert will be delivered to; empty unless routed.
    pub fn receivers(&self) -> &[Receiver] {
        match &self.verdict {
            Verdict::Routed(resolution) => &resolution.receivers,
            _ => &[],
        }
    }
}

pub struct AlertPipeline {
    store: Arc<dyn AlertRepository>,
    dedup: DedupEngine,
    silences: SilenceEngine,
    inhibition: InhibitionEngine,
    routing: RoutingEngine,
    grouper: Arc<AlertGrouper>,
    dispatcher: Dispatcher,
    metrics: Arc<dyn MetricsSink>,
    history: Arc<dyn HistorySink>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl AlertPipeline {
    pub fn new(
        config: &ServerConfig,
        store: Arc<dyn AlertRepository>,
        registry: ProviderRegistry,
        metrics: Arc<dyn MetricsSink>,
        history: Arc<dyn HistorySink>,
    ) -> Self {
        let grouper = Arc::new(AlertGrouper::new(config.dedup.group_by.clone()));
        let mut dedup = DedupEngine::new(Arc::clone(&store), config.dedup.to_dedup_config())
            .with_metrics(Arc::clone(&metrics))
            .with_history(Arc::clone(&history));
        if grouper.is_enabled() {
            dedup = dedup.with_grouper(Arc::clone(&grouper));
        }
        let dispatcher = Dispatcher::new(Arc::clone(&store), registry)
            .with_templates(config.dispatch.template_set())
            .with_retry(config.dispatch.retry_policy())
            .with_breaker_config(config.dispatch.breaker_config())
            .with_metrics(Arc::clone(&metrics));

        Self {
            store,
            dedup,
            silences: SilenceEngine::new(),
            inhibition: InhibitionEngine::new(config.inhibition.ttl()),
            routing: RoutingEngine::new(config.routing.default_receivers.clone()),
            grouper,
            dispatcher,
            metrics,
            history,
            tasks: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Runs one event through dedup and, when it is notification-eligible,
    /// through silencing, inhibition and routing.
    pub fn evaluate(
        &self,
        event: &IncomingAlert,
        now: DateTime<Utc>,
    ) -> Result<Decision, PipelineError> {
        let outcome = self.dedup.process(event, now)?;

        let verdict = match outcome.alert.as_ref() {
            Some(alert) if outcome.notify => self.screen(alert, now)?,
            _ => Verdict::Quiet,
        };

        tracing::info!(
            fingerprint = %outcome.fingerprint.short(),
            alertname = outcome.alert.as_ref().map(Alert::alertname).unwrap_or_default(),
            action = %outcome.action,
            verdict = verdict_name(&verdict),
            "Alert evaluated"
        );

        Ok(Decision { outcome, verdict })
    }

    fn screen(&self, alert: &Alert, now: DateTime<Utc>) -> Result<Verdict, PipelineError> {
        let match_labels = alert.match_labels();
        let silences = self.store.list_active_silences(now)?;
        if let Some(silence) = self.silences.find_silence(&match_labels, &silences, now) {
            self.metrics.suppressed(Suppression::Silenced);
            self.record(
                HistoryKind::Silenced,
                alert,
                format!("silence {}", silence.id),
                now,
            );
            return Ok(Verdict::Silenced {
                silence_id: silence.id.clone(),
            });
        }

        let rules = self.store.list_enabled_inhibition_rules()?;
        if alert.is_active() {
            let active = self.store.list_firing()?;
            if let Some(status) = self.inhibition.evaluate(alert, &rules, &active, now) {
                self.metrics.suppressed(Suppression::Inhibited);
                self.record(
                    HistoryKind::Inhibited,
                    alert,
                    format!("rule {} source {}", status.rule_id, status.source_fingerprint.short()),
                    now,
                );
                return Ok(Verdict::Inhibited(status));
            }
        } else if let Some(status) = self.inhibition.status_of(&alert.fingerprint, now) {
            // The firing side was never announced, so neither is the resolution.
            self.inhibition.evaluate(alert, &rules, &[], now);
            self.metrics.suppressed(Suppression::Inhibited);
            return Ok(Verdict::Inhibited(status));
        }

        let routing_rules = self.store.list_enabled_routing_rules()?;
        let resolution = self.routing.resolve(&match_labels, &routing_rules);
        for rule_id in &resolution.matched_rules {
            self.metrics.rule_matched(rule_id);
        }
        if resolution.is_empty() {
            tracing::debug!(
                fingerprint = %alert.fingerprint.short(),
                "No receivers for alert"
            );
        }
        Ok(Verdict::Routed(resolution))
    }

    /// Evaluates `event` and schedules its deliveries in the background.
    pub fn ingest(
        self: &Arc<Self>,
        event: &IncomingAlert,
        now: DateTime<Utc>,
    ) -> Result<Decision, PipelineError> {
        let decision = self.evaluate(event, now)?;
        if let Some(alert) = decision.outcome.alert.as_ref() {
            for receiver in decision.receivers() {
                let pipeline = Arc::clone(self);
                let alert = alert.clone();
                let receiver = receiver.clone();
                self.tasks.spawn(async move {
                    // The dispatcher already warned and history holds the failure
                    if let Err(e) = pipeline.deliver_one(&alert, &receiver).await {
                        tracing::debug!(
                            channel_id = %receiver.channel_id,
                            error = %e,
                            "Background delivery gave up"
                        );
                    }
                });
            }
        }
        Ok(decision)
    }

    /// Delivers a decision to all its receivers, one after the other.
    pub async fn deliver(
        &self,
        decision: &Decision,
    ) -> Vec<(Receiver, Result<DeliveryReport, NotifyError>)> {
        let Some(alert) = decision.outcome.alert.as_ref() else {
            return Vec::new();
        };
        let mut results = Vec::with_capacity(decision.receivers().len());
        for receiver in decision.receivers() {
            let result = self.deliver_one(alert, receiver).await;
            results.push((receiver.clone(), result));
        }
        results
    }

    async fn deliver_one(
        &self,
        alert: &Alert,
        receiver: &Receiver,
    ) -> Result<DeliveryReport, NotifyError> {
        let result = self.dispatcher.send(alert, receiver, &self.cancel).await;
        let (kind, detail) = match &result {
            Ok(report) => (
                HistoryKind::Notified,
                format!("{} attempt(s)", report.attempts),
            ),
            Err(e) => (HistoryKind::NotifyFailed, e.to_string()),
        };
        record_best_effort(
            self.history.as_ref(),
            HistoryRecord::new(kind, &alert.fingerprint, alert.alertname(), detail, Utc::now())
                .with_channel(&receiver.channel_id),
        );
        result
    }

    fn record(&self, kind: HistoryKind, alert: &Alert, detail: String, now: DateTime<Utc>) {
        record_best_effort(
            self.history.as_ref(),
            HistoryRecord::new(kind, &alert.fingerprint, alert.alertname(), detail, now),
        );
    }

    pub fn acknowledge(
        &self,
        fingerprint: &Fingerprint,
        now: DateTime<Utc>,
    ) -> Result<Alert, PipelineError> {
        Ok(self.dedup.acknowledge(fingerprint, now)?)
    }

    /// Recomputes inhibition for all active alerts.
    pub fn reevaluate_inhibitions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ReevaluationReport, PipelineError> {
        let active = self.store.list_firing()?;
        let rules = self.store.list_enabled_inhibition_rules()?;
        let report = self.inhibition.reevaluate(&active, &rules, now);

        let name_of = |fp: &Fingerprint| {
            active
                .iter()
                .find(|a| &a.fingerprint == fp)
                .map(|a| a.alertname().to_string())
                .unwrap_or_default()
        };
        for fp in &report.inhibited {
            record_best_effort(
                self.history.as_ref(),
                HistoryRecord::new(HistoryKind::Inhibited, fp, &name_of(fp), "reevaluation", now),
            );
        }
        for fp in &report.cleared {
            record_best_effort(
                self.history.as_ref(),
                HistoryRecord::new(
                    HistoryKind::InhibitionCleared,
                    fp,
                    &name_of(fp),
                    "reevaluation",
                    now,
                ),
            );
        }
        Ok(report)
    }

    pub fn purge_expired_inhibitions(&self, now: DateTime<Utc>) -> usize {
        self.inhibition.purge_expired(now)
    }

    /// Trims the fingerprint lock table and idle correlation windows.
    pub fn compact(&self, now: DateTime<Utc>) -> (usize, usize) {
        self.dedup.compact(now)
    }

    pub fn inhibition(&self) -> &InhibitionEngine {
        &self.inhibition
    }

    pub fn grouper(&self) -> &AlertGrouper {
        &self.grouper
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of deliveries still running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for running deliveries for up to `grace`, then cancels the
    /// rest and waits for them to wind down.
    pub async fn shutdown(&self, grace: Duration) {
        self.tasks.close();
        if tokio::time::timeout(grace, self.tasks.wait()).await.is_err() {
            tracing::warn!(
                in_flight = self.tasks.len(),
                "Deliveries still running after grace period, cancelling"
            );
            self.cancel.cancel();
            self.tasks.wait().await;
        }
    }
}

fn verdict_name(verdict: &Verdict) -> &'static str {
    match verdict {
        Verdict::Quiet => "quiet",
        Verdict::Silenced { .. } => "silenced",
        Verdict::Inhibited(_) => "inhibited",
        Verdict::Routed(_) => "routed",
    }
}
