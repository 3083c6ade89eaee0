use anyhow::Result;
use chrono::Utc;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::time::Duration;

use vigil_common::metrics::{InMemoryMetrics, MetricsSink, NoopMetrics, RecorderMetrics};
use vigil_common::{Fingerprint, IncomingAlert};
use vigil_notify::registry::ProviderRegistry;
use vigil_server::config::{MetricsSinkKind, ServerConfig};
use vigil_server::logging;
use vigil_server::pipeline::AlertPipeline;
use vigil_server::scheduler::MaintenanceScheduler;
use vigil_server::seed::SeedFile;
use vigil_storage::{MemoryHistory, MemoryStore};

const DEFAULT_CONFIG_PATH: &str = "config/vigil.toml";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  vigil-server [config.toml]            Read NDJSON alert events from stdin");
    eprintln!("  vigil-server check-seed <seed.json>   Validate a seed file and exit");
    eprintln!();
    eprintln!("Each stdin line is either an alert event or {{\"ack\": \"<fingerprint>\"}}.");
}

/// One line of stdin input.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InputLine {
    Ack { ack: String },
    Event(IncomingAlert),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("check-seed") => {
            let seed_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("check-seed requires <seed.json> argument")
            })?;
            logging::init_tracing("warn")?;
            run_check_seed(seed_path)
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args.get(1).map(|s| s.as_str());
            run_server(config_path).await
        }
    }
}

#[allow(clippy::print_stdout)]
fn run_check_seed(seed_path: &str) -> Result<()> {
    let seed = SeedFile::load(seed_path)?;
    let problems = seed.validate(&ProviderRegistry::default(), Utc::now());
    if problems.is_empty() {
        println!("{seed_path}: ok ({})", seed.summary());
        return Ok(());
    }
    for problem in &problems {
        println!("{seed_path}: {problem}");
    }
    anyhow::bail!("{} problem(s) in seed file '{}'", problems.len(), seed_path)
}

fn load_config(path: Option<&str>) -> Result<ServerConfig> {
    match path {
        Some(path) => ServerConfig::load(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => ServerConfig::load(DEFAULT_CONFIG_PATH),
        None => Ok(ServerConfig::default()),
    }
}

async fn run_server(config_path: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    logging::init_tracing(&config.logging.level)?;
    vigil_common::id::init(config.node.machine_id, config.node.node_id);

    let store = Arc::new(MemoryStore::new());
    let registry = ProviderRegistry::default();
    if let Some(seed_path) = &config.seed_file {
        let seed = SeedFile::load(seed_path)?;
        let problems = seed.validate(&registry, Utc::now());
        if !problems.is_empty() {
            for problem in &problems {
                tracing::error!(seed = %seed_path, problem = %problem, "Invalid seed entry");
            }
            anyhow::bail!("seed file '{}' has {} problem(s)", seed_path, problems.len());
        }
        seed.apply(&store, Utc::now())?;
    } else {
        tracing::warn!("No seed_file configured; every alert goes to the default receivers");
    }

    let memory_metrics = Arc::new(InMemoryMetrics::new());
    let metrics: Arc<dyn MetricsSink> = match config.metrics.sink {
        MetricsSinkKind::Memory => memory_metrics.clone() as Arc<dyn MetricsSink>,
        MetricsSinkKind::Recorder => Arc::new(RecorderMetrics),
        MetricsSinkKind::Noop => Arc::new(NoopMetrics),
    };
    let history = Arc::new(MemoryHistory::default());

    let pipeline = Arc::new(AlertPipeline::new(
        &config,
        store.clone(),
        registry,
        metrics,
        history.clone(),
    ));

    let scheduler_cancel = pipeline.cancellation_token().child_token();
    let scheduler = MaintenanceScheduler::new(pipeline.clone(), &config.scheduler);
    let scheduler_handle = {
        let cancel = scheduler_cancel.clone();
        tokio::spawn(async move {
            scheduler.run(cancel).await;
        })
    };

    tracing::info!(
        config = config_path.unwrap_or(DEFAULT_CONFIG_PATH),
        "Pipeline started, reading alert events from stdin"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut processed = 0u64;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if handle_line(&pipeline, &line) {
                            processed += 1;
                        }
                    }
                    Ok(None) => {
                        tracing::info!("Input closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
            _ = signal::ctrl_c() => {
                tracing::info!("Shutting down gracefully");
                break;
            }
        }
    }

    scheduler_cancel.cancel();
    if let Err(e) = scheduler_handle.await {
        tracing::error!(error = %e, "Scheduler task failed");
    }
    pipeline.shutdown(SHUTDOWN_GRACE).await;

    tracing::info!(
        processed,
        alerts = store.alert_count(),
        history = history.len(),
        "Pipeline stopped"
    );
    if config.metrics.sink == MetricsSinkKind::Memory {
        for (key, value) in memory_metrics.snapshot() {
            tracing::info!(metric = %key, value, "Counter");
        }
    }
    Ok(())
}

/// Returns true when the line was a well-formed event or ack.
fn handle_line(pipeline: &Arc<AlertPipeline>, line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }
    let input: InputLine = match serde_json::from_str(line) {
        Ok(input) => input,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed input line");
            return false;
        }
    };

    match input {
        InputLine::Ack { ack } => {
            let fingerprint: Fingerprint = match ack.parse() {
                Ok(fingerprint) => fingerprint,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping acknowledgement");
                    return false;
                }
            };
            match pipeline.acknowledge(&fingerprint, Utc::now()) {
                Ok(alert) => {
                    tracing::info!(fingerprint = %alert.fingerprint.short(), "Alert acknowledged");
                }
                Err(e) => {
                    tracing::warn!(fingerprint = %fingerprint.short(), error = %e, "Acknowledge failed");
                }
            }
        }
        InputLine::Event(event) => {
            if let Err(e) = pipeline.ingest(&event, Utc::now()) {
                tracing::error!(error = %e, "Failed to process alert event");
            }
        }
    }
    true
}
