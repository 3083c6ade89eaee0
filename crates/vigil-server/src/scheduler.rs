use crate::config::SchedulerSection;
use crate::pipeline::AlertPipeline;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Periodic upkeep: inhibition reevaluation, purging of expired inhibition
/// records, and compaction of dedup state.
pub struct MaintenanceScheduler {
    pipeline: Arc<AlertPipeline>,
    reevaluate_secs: u64,
    purge_secs: u64,
    compact_secs: u64,
}

impl MaintenanceScheduler {
    pub fn new(pipeline: Arc<AlertPipeline>, config: &SchedulerSection) -> Self {
        Self {
            pipeline,
            reevaluate_secs: config.inhibition_reevaluate_secs,
            purge_secs: config.inhibition_purge_secs,
            compact_secs: config.compact_secs,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            reevaluate_secs = self.reevaluate_secs,
            purge_secs = self.purge_secs,
            compact_secs = self.compact_secs,
            "Maintenance scheduler started"
        );

        let mut reevaluate = ticker(self.reevaluate_secs);
        let mut purge = ticker(self.purge_secs);
        let mut compact = ticker(self.compact_secs);
        // The first tick of an interval fires immediately.
        reevaluate.tick().await;
        purge.tick().await;
        compact.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = reevaluate.tick() => self.reevaluate(),
                _ = purge.tick() => {
                    let purged = self.pipeline.purge_expired_inhibitions(Utc::now());
                    if purged > 0 {
                        tracing::info!(purged, "Purged expired inhibitions");
                    }
                }
                _ = compact.tick() => {
                    let (locks, windows) = self.pipeline.compact(Utc::now());
                    if locks + windows > 0 {
                        tracing::info!(locks, windows, "Compacted dedup state");
                    }
                }
            }
        }
        tracing::info!("Maintenance scheduler stopped");
    }

    fn reevaluate(&self) {
        match self.pipeline.reevaluate_inhibitions(Utc::now()) {
            Ok(report) if !report.inhibited.is_empty() || !report.cleared.is_empty() => {
                tracing::info!(
                    inhibited = report.inhibited.len(),
                    cleared = report.cleared.len(),
                    "Inhibitions reevaluated"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Inhibition reevaluation failed"),
        }
    }
}

fn ticker(secs: u64) -> tokio::time::Interval {
    let mut tick = interval(Duration::from_secs(secs.max(1)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick
}
