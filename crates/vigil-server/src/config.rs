use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use vigil_alert::locks::DEFAULT_LOCK_CAPACITY;
use vigil_alert::DedupConfig;
use vigil_common::rules::Receiver;
use vigil_notify::breaker::BreakerConfig;
use vigil_notify::retry::RetryPolicy;
use vigil_notify::template::{MessageTemplate, TemplateSet};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// JSON seed with channels, rules and silences, loaded at startup.
    #[serde(default)]
    pub seed_file: Option<String>,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub dedup: DedupSection,
    #[serde(default)]
    pub inhibition: InhibitionSection,
    #[serde(default)]
    pub routing: RoutingSection,
    #[serde(default)]
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub metrics: MetricsSection,
}

/// Snowflake id generator coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_machine_id")]
    pub machine_id: i32,
    #[serde(default = "default_node_id")]
    pub node_id: i32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            machine_id: default_machine_id(),
            node_id: default_node_id(),
        }
    }
}

fn default_machine_id() -> i32 {
    1
}

fn default_node_id() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupSection {
    #[serde(default = "default_correlation_window_secs")]
    pub correlation_window_secs: u64,
    #[serde(default = "default_correlation_labels")]
    pub correlation_labels: Vec<String>,
    #[serde(default = "default_lock_capacity")]
    pub lock_capacity: usize,
    /// Labels that fold alerts into one group. Empty disables grouping.
    #[serde(default)]
    pub group_by: Vec<String>,
}

impl Default for DedupSection {
    fn default() -> Self {
        Self {
            correlation_window_secs: default_correlation_window_secs(),
            correlation_labels: default_correlation_labels(),
            lock_capacity: default_lock_capacity(),
            group_by: Vec::new(),
        }
    }
}

impl DedupSection {
    pub fn to_dedup_config(&self) -> DedupConfig {
        DedupConfig {
            correlation_window: chrono_secs(self.correlation_window_secs),
            correlation_labels: self.correlation_labels.clone(),
            lock_capacity: self.lock_capacity,
        }
    }
}

fn chrono_secs(secs: u64) -> chrono::Duration {
    let max = (i64::MAX / 1000) as u64;
    chrono::Duration::seconds(secs.min(max) as i64)
}

fn default_correlation_window_secs() -> u64 {
    300
}

fn default_correlation_labels() -> Vec<String> {
    vec!["instance".to_string(), "job".to_string()]
}

fn default_lock_capacity() -> usize {
    DEFAULT_LOCK_CAPACITY
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InhibitionSection {
    #[serde(default = "default_inhibition_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for InhibitionSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_inhibition_ttl_secs(),
        }
    }
}

impl InhibitionSection {
    pub fn ttl(&self) -> chrono::Duration {
        chrono_secs(self.ttl_secs)
    }
}

fn default_inhibition_ttl_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingSection {
    /// Used when no routing rule matches. Empty means "deliver nowhere".
    #[serde(default)]
    pub default_receivers: Vec<Receiver>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
    #[serde(default = "default_breaker_max_failures")]
    pub breaker_max_failures: u32,
    #[serde(default = "default_breaker_reset_secs")]
    pub breaker_reset_secs: u64,
    /// Named message templates on top of the built-in `default`.
    #[serde(default)]
    pub templates: HashMap<String, MessageTemplate>,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
            breaker_max_failures: default_breaker_max_failures(),
            breaker_reset_secs: default_breaker_reset_secs(),
            templates: HashMap::new(),
        }
    }
}

impl DispatchSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            max_failures: self.breaker_max_failures,
            reset_timeout: Duration::from_secs(self.breaker_reset_secs),
        }
    }

    pub fn template_set(&self) -> TemplateSet {
        self.templates
            .iter()
            .map(|(name, template)| (name.clone(), template.clone()))
            .collect()
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_jitter() -> bool {
    true
}

fn default_breaker_max_failures() -> u32 {
    5
}

fn default_breaker_reset_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Level for the `vigil` crates; `RUST_LOG` directives still apply.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_reevaluate_secs")]
    pub inhibition_reevaluate_secs: u64,
    #[serde(default = "default_purge_secs")]
    pub inhibition_purge_secs: u64,
    #[serde(default = "default_compact_secs")]
    pub compact_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            inhibition_reevaluate_secs: default_reevaluate_secs(),
            inhibition_purge_secs: default_purge_secs(),
            compact_secs: default_compact_secs(),
        }
    }
}

fn default_reevaluate_secs() -> u64 {
    30
}

fn default_purge_secs() -> u64 {
    60
}

fn default_compact_secs() -> u64 {
    300
}

/// Where pipeline counters go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsSinkKind {
    /// Kept in process and logged on shutdown.
    #[default]
    Memory,
    /// Forwarded to the `metrics` facade.
    Recorder,
    Noop,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSection {
    #[serde(default)]
    pub sink: MetricsSinkKind,
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dispatch.max_attempts == 0 {
            anyhow::bail!("dispatch.max_attempts must be at least 1");
        }
        let factor = self.dispatch.backoff_factor;
        if factor.is_nan() || factor < 1.0 {
            anyhow::bail!("dispatch.backoff_factor must be >= 1.0");
        }
        if self.dispatch.breaker_max_failures == 0 {
            anyhow::bail!("dispatch.breaker_max_failures must be at least 1");
        }
        if self.dedup.correlation_window_secs == 0 {
            anyhow::bail!("dedup.correlation_window_secs must be positive");
        }
        let scheduler = &self.scheduler;
        if scheduler.inhibition_reevaluate_secs == 0
            || scheduler.inhibition_purge_secs == 0
            || scheduler.compact_secs == 0
        {
            anyhow::bail!("scheduler intervals must be positive");
        }
        Ok(())
    }
}
