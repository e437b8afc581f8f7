use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use metrics::{counter, histogram};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use sheetops_kubehub::ClusterClient;
use sheetops_mirror::{MirrorClient, LANDING_PARTITION};

use crate::Settings;

/// Periodic reverse-path task: reads the mirror back, compares the
/// operator-owned desired column against the actual column, and issues a
/// replica patch for every row where they disagree.
pub struct DriftPoller {
    mirror: Arc<dyn MirrorClient>,
    cluster: Arc<dyn ClusterClient>,
    interval: Duration,
    max_rows: usize,
}

impl DriftPoller {
    pub fn new(mirror: Arc<dyn MirrorClient>, cluster: Arc<dyn ClusterClient>, settings: &Settings) -> Self {
        Self { mirror, cluster, interval: settings.drift_interval, max_rows: settings.max_rows }
    }

    /// Tick forever; a failed pass is logged and superseded by the next one.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.pass().await {
                warn!(error = %e, "drift pass failed");
            }
        }
    }

    /// One polling pass. Partition names come from the live mirror, not the
    /// reconciler's belief, so manually created or half-reconciled
    /// partitions are still covered.
    pub async fn pass(&self) -> Result<()> {
        let t0 = Instant::now();
        counter!("drift_passes_total", 1u64);
        let partitions = self.mirror.list_partitions().await?;
        let range = format!("A2:C{}", self.max_rows);
        for partition in partitions.iter().filter(|p| p.as_str() != LANDING_PARTITION) {
            let rows = match self.mirror.read_range(partition, &range).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(partition = %partition, error = %e, "mirror read failed");
                    continue;
                }
            };
            for row in &rows {
                let Some((name, replicas)) = scale_decision(row) else { continue };
                info!(ns = %partition, name = %name, replicas, "correcting drift");
                counter!("drift_corrections_total", 1u64);
                // Outcome is logged, never retried; the watch feed surfaces
                // the true state either way.
                if let Err(e) = self.cluster.patch_replicas(partition, name, replicas).await {
                    warn!(ns = %partition, name = %name, error = %e, "scale patch failed");
                }
            }
        }
        histogram!("drift_pass_ms", t0.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }
}

/// Drift decision for one `A2:C` row: `Some((name, replicas))` when the
/// desired cell disagrees with the actual cell.
///
/// The two cells are compared as strings so formatting differences surface
/// instead of being silently tolerated. A blank name or blank desired cell
/// skips the row; a desired value that is not a non-negative integer is
/// logged and ignored, never sent to the cluster.
fn scale_decision(row: &[String]) -> Option<(&str, i32)> {
    let name = row.first().filter(|s| !s.is_empty())?;
    let desired = row.get(1).filter(|s| !s.is_empty())?;
    let actual = row.get(2).map(String::as_str).unwrap_or("");
    if desired.as_str() == actual {
        return None;
    }
    match desired.trim().parse::<i32>() {
        Ok(n) if n >= 0 => Some((name.as_str(), n)),
        _ => {
            warn!(name = %name, desired = %desired, "ignoring non-integer desired value");
            counter!("drift_invalid_desired_total", 1u64);
            None
        }
    }
}
