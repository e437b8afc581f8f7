//! Tabular mirror access: the partitioned sheet surface the reconciler
//! renders into and the drift poller reads back.

#![forbid(unsafe_code)]

mod a1;
mod memory;
mod sheets;

pub use memory::InMemoryMirror;
pub use sheets::SheetsMirror;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Partition that always exists and never maps to a namespace.
pub const LANDING_PARTITION: &str = "Sheet1";

/// One contiguous cell rectangle plus the values to write into it.
/// `range` is A1 notation relative to a partition (e.g. `A1:C3`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RangeWrite {
    pub range: String,
    pub values: Vec<Vec<String>>,
}

/// Mirror-side collaborator contract consumed by the engine.
#[async_trait]
pub trait MirrorClient: Send + Sync {
    /// Partition names in mirror order.
    async fn list_partitions(&self) -> Result<Vec<String>>;

    /// Create the named partitions. Idempotent; no-op on empty input.
    async fn create_partitions(&self, names: &[String]) -> Result<()>;

    /// Delete the named partitions, ignoring ones that no longer exist.
    /// No-op on empty input.
    async fn delete_partitions(&self, names: &[String]) -> Result<()>;

    /// Read a rectangle of cells. Trailing empty rows may be omitted.
    async fn read_range(&self, partition: &str, range: &str) -> Result<Vec<Vec<String>>>;

    /// Write several rectangles in one batch; the batch lands or fails as a
    /// whole from the caller's perspective.
    async fn write_ranges(&self, partition: &str, writes: &[RangeWrite]) -> Result<()>;
}
