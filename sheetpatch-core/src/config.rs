//! Session configuration loaded from TOML

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default file name looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "sheetpatch.toml";

/// Main session configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub patch: PatchConfig,
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject sizes that would make previews or reports meaningless
    pub fn validate(&self) -> Result<()> {
        if self.preview.max_rows == 0 || self.preview.max_cols == 0 {
            anyhow::bail!("Configuration error: preview size must be at least 1x1");
        }
        if self.patch.progress_interval == 0 {
            anyhow::bail!("Configuration error: patch.progress_interval must be positive");
        }
        if self.patch.failure_sample_chars == 0 {
            anyhow::bail!("Configuration error: patch.failure_sample_chars must be positive");
        }
        Ok(())
    }
}

/// Size of the grid shown for a whole-sheet region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub max_rows: u32,
    pub max_cols: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_rows: 50,
            max_cols: 50,
        }
    }
}

/// Patch engine reporting knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    /// Cell failures listed in a `write-cell` error (the total is always reported)
    pub max_reported_failures: usize,
    /// Characters of the offending value kept in a failure report
    pub failure_sample_chars: usize,
    /// Emit a progress note every N applied cells
    pub progress_interval: usize,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            max_reported_failures: 20,
            failure_sample_chars: 32,
            progress_interval: 100,
        }
    }
}
