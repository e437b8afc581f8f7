//! Local persistence for the three mirror identifiers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// The identifiers the engine needs, stored as plain JSON. The OAuth access
/// token is deliberately not persisted; it is short-lived and comes from
/// `SHEETOPS_ACCESS_TOKEN` at run time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub api_key: String,
    pub client_id: String,
    pub spreadsheet_id: String,
}

impl MirrorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config at {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config at {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw).with_context(|| format!("writing config at {}", path.display()))
    }
}

pub fn default_config_path() -> PathBuf {
    if let Ok(p) = std::env::var("SHEETOPS_CONFIG_PATH") {
        return PathBuf::from(p);
    }
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = PathBuf::from(home);
        p.push(".sheetops");
        p.push("config.json");
        return p;
    }
    // Fallback to current directory
    PathBuf::from("sheetops-config.json")
}
