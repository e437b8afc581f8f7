use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use metrics::{counter, histogram};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use sheetops_core::{group_by_namespace, partition_diff, Registry, WorkloadRecord};
use sheetops_mirror::{MirrorClient, RangeWrite, LANDING_PARTITION};

use crate::Settings;

const HEADER_NAME: &str = "Deployment";
const HEADER_DESIRED: &str = "Desired";
const HEADER_ACTUAL: &str = "Actual";

/// Periodic task projecting the registry onto the mirror: creates and
/// destroys partitions as the namespace set changes, then re-renders every
/// namespace partition's rows wholesale.
pub struct ReconcilerLoop {
    registry: Arc<Registry>,
    mirror: Arc<dyn MirrorClient>,
    /// Partitions we believe exist, landing partition included. The drift
    /// poller never reads this; it re-derives from the live mirror.
    partitions: Vec<String>,
    interval: Duration,
    max_rows: usize,
}

impl ReconcilerLoop {
    pub fn new(registry: Arc<Registry>, mirror: Arc<dyn MirrorClient>, settings: &Settings) -> Self {
        Self {
            registry,
            mirror,
            partitions: vec![LANDING_PARTITION.to_string()],
            interval: settings.reconcile_interval,
            max_rows: settings.max_rows,
        }
    }

    /// Tick forever. A failed pass is logged and superseded by the next one.
    /// Passes run inline, so a slow pass delays the next tick rather than
    /// overlapping it.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.pass().await {
                warn!(error = %e, "reconcile pass failed");
            }
        }
    }

    /// One reconciliation pass. An empty registry is a no-op so partitions
    /// are not torn down on a transient empty snapshot.
    pub async fn pass(&mut self) -> Result<()> {
        let t0 = Instant::now();
        counter!("reconcile_passes_total", 1u64);
        let records = self.registry.snapshot();
        if records.is_empty() {
            return Ok(());
        }
        let by_ns = group_by_namespace(records);

        let mut current: Vec<String> = vec![LANDING_PARTITION.to_string()];
        current.extend(by_ns.keys().cloned());
        let diff = partition_diff(&self.partitions, &current);
        if !diff.added.is_empty() || !diff.removed.is_empty() {
            info!(added = diff.added.len(), removed = diff.removed.len(), "partition set changed");
        }
        // Structural changes settle before any rows are rendered. The belief
        // only absorbs an outcome that landed, so a failed create or delete
        // shows up in the next diff and is retried there.
        let (created, deleted) = tokio::join!(
            self.mirror.create_partitions(&diff.added),
            self.mirror.delete_partitions(&diff.removed),
        );
        match created {
            Ok(()) => self.partitions.extend(diff.added.iter().cloned()),
            Err(e) => {
                warn!(error = %e, "partition create failed");
                counter!("reconcile_partition_errors_total", 1u64);
            }
        }
        match deleted {
            Ok(()) => self.partitions.retain(|p| !diff.removed.contains(p)),
            Err(e) => {
                warn!(error = %e, "partition delete failed");
                counter!("reconcile_partition_errors_total", 1u64);
            }
        }

        let renders = by_ns.iter().map(|(ns, group)| {
            let seed_desired = diff.added.iter().any(|a| a == ns);
            let plan = render_plan(group, self.max_rows, seed_desired);
            let mirror = Arc::clone(&self.mirror);
            async move { (ns.clone(), mirror.write_ranges(ns, &plan).await) }
        });
        for (ns, outcome) in futures::future::join_all(renders).await {
            if let Err(e) = outcome {
                warn!(ns = %ns, error = %e, "render failed");
                counter!("reconcile_render_errors_total", 1u64);
            }
        }

        histogram!("reconcile_pass_ms", t0.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }
}

/// Full-overwrite render plan for one partition: header row, one row per
/// workload, and blanks covering every other writable row so stale leftovers
/// cannot survive a shrink.
///
/// The desired column is seeded from the declared count only when the
/// partition is first materialized; after that the column belongs to the
/// operator and only its header cell is rewritten.
fn render_plan(group: &[WorkloadRecord], max_rows: usize, seed_desired: bool) -> Vec<RangeWrite> {
    let capacity = max_rows.saturating_sub(1); // row 1 is the header
    let group = if group.len() > capacity {
        warn!(workloads = group.len(), capacity, "over row capacity; truncating render");
        &group[..capacity]
    } else {
        group
    };
    let n = group.len();

    let names: Vec<Vec<String>> = std::iter::once(vec![HEADER_NAME.to_string()])
        .chain(group.iter().map(|r| vec![r.name.clone()]))
        .collect();
    let desired: Vec<Vec<String>> = if seed_desired {
        std::iter::once(vec![HEADER_DESIRED.to_string()])
            .chain(group.iter().map(|r| vec![r.declared_replicas.to_string()]))
            .collect()
    } else {
        vec![vec![HEADER_DESIRED.to_string()]]
    };
    let actuals: Vec<Vec<String>> = std::iter::once(vec![HEADER_ACTUAL.to_string()])
        .chain(group.iter().map(|r| vec![r.declared_replicas.to_string()]))
        .collect();

    let desired_range = if seed_desired { format!("B1:B{}", n + 1) } else { "B1".to_string() };
    let mut writes = vec![
        RangeWrite { range: format!("A1:A{}", n + 1), values: names },
        RangeWrite { range: desired_range, values: desired },
        RangeWrite { range: format!("C1:C{}", n + 1), values: actuals },
    ];
    if n + 2 <= max_rows {
        let blanks = vec![vec![String::new(); 3]; max_rows - n - 1];
        writes.push(RangeWrite { range: format!("A{}:C{}", n + 2, max_rows), values: blanks });
    }
    writes
}
