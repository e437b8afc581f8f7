use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::a1;
use crate::{MirrorClient, RangeWrite, LANDING_PARTITION};

/// Mutex-guarded in-memory mirror with the same observable behavior as the
/// Sheets backend. Backs the engine's tests; no network involved.
#[derive(Debug)]
pub struct InMemoryMirror {
    grids: Mutex<BTreeMap<String, Vec<Vec<String>>>>,
}

impl InMemoryMirror {
    /// Fresh mirror holding only the landing partition.
    pub fn new() -> Self {
        let mut grids = BTreeMap::new();
        grids.insert(LANDING_PARTITION.to_string(), Vec::new());
        Self { grids: Mutex::new(grids) }
    }

    /// Direct cell peek for assertions; zero-based coordinates.
    pub fn cell(&self, partition: &str, col: usize, row: usize) -> Option<String> {
        let grids = self.grids.lock().unwrap();
        grids.get(partition)?.get(row)?.get(col).cloned()
    }
}

impl Default for InMemoryMirror {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MirrorClient for InMemoryMirror {
    async fn list_partitions(&self) -> Result<Vec<String>> {
        Ok(self.grids.lock().unwrap().keys().cloned().collect())
    }

    async fn create_partitions(&self, names: &[String]) -> Result<()> {
        let mut grids = self.grids.lock().unwrap();
        for n in names {
            grids.entry(n.clone()).or_default();
        }
        Ok(())
    }

    async fn delete_partitions(&self, names: &[String]) -> Result<()> {
        let mut grids = self.grids.lock().unwrap();
        for n in names {
            grids.remove(n);
        }
        Ok(())
    }

    async fn read_range(&self, partition: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let rect = a1::parse(range)?;
        let grids = self.grids.lock().unwrap();
        let grid = grids
            .get(partition)
            .ok_or_else(|| anyhow!("no such partition: {}", partition))?;
        let mut rows = Vec::new();
        for r in rect.row_start..=rect.row_end {
            let mut row = Vec::new();
            for c in rect.col_start..=rect.col_end {
                row.push(grid.get(r).and_then(|cells| cells.get(c)).cloned().unwrap_or_default());
            }
            rows.push(row);
        }
        // The Sheets API omits trailing empty rows from a read; match that.
        while rows.last().map(|r| r.iter().all(String::is_empty)).unwrap_or(false) {
            rows.pop();
        }
        Ok(rows)
    }

    async fn write_ranges(&self, partition: &str, writes: &[RangeWrite]) -> Result<()> {
        let mut grids = self.grids.lock().unwrap();
        let grid = grids
            .get_mut(partition)
            .ok_or_else(|| anyhow!("no such partition: {}", partition))?;
        for w in writes {
            let rect = a1::parse(&w.range)?;
            for (i, r) in (rect.row_start..=rect.row_end).enumerate() {
                for (j, c) in (rect.col_start..=rect.col_end).enumerate() {
                    let value = w.values.get(i).and_then(|row| row.get(j)).cloned().unwrap_or_default();
                    if grid.len() <= r {
                        grid.resize(r + 1, Vec::new());
                    }
                    let row = &mut grid[r];
                    if row.len() <= c {
                        row.resize(c + 1, String::new());
                    }
                    row[c] = value;
                }
            }
        }
        Ok(())
    }
}
