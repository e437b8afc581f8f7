//! Sheetops engine: the three long-running tasks of the reconciliation
//! triad. `watch` keeps the registry in sync with the cluster feed,
//! `reconcile` projects the registry onto the mirror, and `drift` reads the
//! mirror back and corrects the cluster. The tasks share nothing but the
//! registry (snapshot reads only) and the external collaborators.

#![forbid(unsafe_code)]

pub mod drift;
pub mod reconcile;
pub mod watch;

pub use drift::DriftPoller;
pub use reconcile::ReconcilerLoop;
pub use watch::WatchSession;

use std::time::Duration;

fn env_ms(name: &str, default_ms: u64) -> Duration {
    let ms = std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

/// Interval and capacity knobs, overridable via `SHEETOPS_*` env vars.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Mirror re-render cadence.
    pub reconcile_interval: Duration,
    /// Mirror read-back cadence.
    pub drift_interval: Duration,
    /// Fixed delay before reopening a dropped watch stream.
    pub reconnect_delay: Duration,
    /// Fixed row capacity per partition, header row included.
    pub max_rows: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_millis(1500),
            drift_interval: Duration::from_millis(5000),
            reconnect_delay: Duration::from_millis(5000),
            max_rows: 100,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            reconcile_interval: env_ms("SHEETOPS_RECONCILE_MS", d.reconcile_interval.as_millis() as u64),
            drift_interval: env_ms("SHEETOPS_DRIFT_MS", d.drift_interval.as_millis() as u64),
            reconnect_delay: env_ms("SHEETOPS_RECONNECT_MS", d.reconnect_delay.as_millis() as u64),
            max_rows: std::env::var("SHEETOPS_MAX_ROWS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(d.max_rows),
        }
    }
}
