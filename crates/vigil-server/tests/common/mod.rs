#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use vigil_common::channel::{ChannelConfig, ChannelKind};
use vigil_common::metrics::InMemoryMetrics;
use vigil_common::{IncomingAlert, Labels, Severity};
use vigil_notify::registry::ProviderRegistry;
use vigil_notify::{NotificationMessage, NotificationProvider};
use vigil_server::config::ServerConfig;
use vigil_server::pipeline::AlertPipeline;
use vigil_server::seed::SeedFile;
use vigil_storage::{MemoryHistory, MemoryStore};

pub const SEED: &str = r#"{
  "channels": [
    {"id": "ops-pager", "channel_type": "webhook", "config": {"url": "https://pager.example.com/hook", "bearer_token": "s3cret"}},
    {"id": "team-chat", "channel_type": "webhook", "config": {"url": "https://chat.example.com/hook"}}
  ],
  "routing_rules": [
    {"id": "db-team", "priority": 10, "conditions": "{team=\"db\"}", "receivers": [{"channel_id": "ops-pager"}], "continue": true},
    {"id": "catch-all", "priority": 0, "conditions": "{}", "receivers": [{"channel_id": "team-chat"}]}
  ],
  "inhibition_rules": [
    {"id": "node-down", "source_matchers": "alertname=NodeDown", "target_matchers": "alertname=ServiceDown", "equal": ["instance"]}
  ],
  "silences": [
    {"id": "maint", "matchers": "{alertname=\"DiskFull\"}", "duration_secs": 3600, "creator": "ops", "comment": "disk swap"}
  ]
}"#;

/// Records every message instead of sending it.
#[derive(Default)]
pub struct RecordingProvider {
    pub sent: Mutex<Vec<NotificationMessage>>,
}

impl RecordingProvider {
    pub fn channels(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.channel_id.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationProvider for RecordingProvider {
    async fn send(
        &self,
        message: &NotificationMessage,
        _config: &ChannelConfig,
    ) -> vigil_notify::Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }
}

pub struct TestContext {
    pub pipeline: Arc<AlertPipeline>,
    pub store: Arc<MemoryStore>,
    pub provider: Arc<RecordingProvider>,
    pub metrics: Arc<InMemoryMetrics>,
    pub history: Arc<MemoryHistory>,
    pub seeded_at: DateTime<Utc>,
}

pub fn build_test_context() -> Result<TestContext> {
    let mut config = ServerConfig::default();
    config.dispatch.jitter = false;
    config.dispatch.initial_delay_ms = 10;
    build_with(config, SEED)
}

pub fn build_with(config: ServerConfig, seed_json: &str) -> Result<TestContext> {
    let seeded_at = Utc::now();
    let store = Arc::new(MemoryStore::new());
    let seed: SeedFile = serde_json::from_str(seed_json)?;
    seed.apply(&store, seeded_at)?;

    let provider = Arc::new(RecordingProvider::default());
    let mut registry = ProviderRegistry::new();
    registry.register(provider.clone());
    let metrics = Arc::new(InMemoryMetrics::new());
    let history = Arc::new(MemoryHistory::default());
    let pipeline = Arc::new(AlertPipeline::new(
        &config,
        store.clone(),
        registry,
        metrics.clone(),
        history.clone(),
    ));

    Ok(TestContext {
        pipeline,
        store,
        provider,
        metrics,
        history,
        seeded_at,
    })
}

pub fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn firing(pairs: &[(&str, &str)], severity: Severity) -> IncomingAlert {
    IncomingAlert::firing(labels(pairs), severity)
}

pub fn resolved(pairs: &[(&str, &str)]) -> IncomingAlert {
    IncomingAlert::resolved(labels(pairs))
}
