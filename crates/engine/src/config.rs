// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sync configuration (§4.11, §6 "Config inputs"). Loaded from TOML with the
//! teacher's two-phase discipline: read the file (or fall back to built-in
//! defaults section by section), then validate.

use crate::error::EngineError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Transfer ordering strategy for the worker pool's ready queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferOrder {
    Default,
    SizeAsc,
    SizeDesc,
    NameAsc,
    NameDesc,
}

impl Default for TransferOrder {
    fn default() -> Self {
        TransferOrder::Default
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BigDeleteConfig {
    pub min_items: u64,
    pub threshold_count: u64,
    pub threshold_percent: f64,
}

impl Default for BigDeleteConfig {
    fn default() -> Self {
        Self {
            min_items: 20,
            threshold_count: 200,
            threshold_percent: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub download_workers: usize,
    pub upload_workers: usize,
    pub order: TransferOrder,
    /// Bytes per second, `0` means unlimited.
    pub bandwidth_limit: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_workers: 4,
            upload_workers: 4,
            order: TransferOrder::Default,
            bandwidth_limit: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub poll_interval_ms: u64,
    pub debounce_ms: u64,
    pub safety_scan_interval_ms: u64,
    pub write_coalesce_cooldown_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 30_000,
            debounce_ms: 2_000,
            safety_scan_interval_ms: 300_000,
            write_coalesce_cooldown_ms: 500,
        }
    }
}

/// Mirrors §6's "Config inputs" table, field for field.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub sync_root: PathBuf,
    pub state_dir: PathBuf,
    pub drive_id: String,
    pub max_file_size: u64,
    pub ignore_marker: String,
    pub big_delete: BigDeleteConfig,
    pub force: bool,
    pub tombstone_retention_days: u64,
    pub transfer: TransferConfig,
    pub watch: WatchConfig,
    pub use_local_trash: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_root: PathBuf::new(),
            state_dir: PathBuf::new(),
            drive_id: String::new(),
            max_file_size: 10 * 1024 * 1024 * 1024,
            ignore_marker: ".odignore".to_string(),
            big_delete: BigDeleteConfig::default(),
            force: false,
            tombstone_retention_days: 30,
            transfer: TransferConfig::default(),
            watch: WatchConfig::default(),
            use_local_trash: true,
        }
    }
}

impl SyncConfig {
    /// Read `path` if it exists, falling back to defaults for any missing
    /// section; then validate. Mirrors the teacher's namespace-resolution
    /// two-phase load.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| EngineError::Config(format!("reading {}: {e}", path.display())))?;
            toml::from_str::<SyncConfig>(&raw)
                .map_err(|e| EngineError::Config(format!("parsing {}: {e}", path.display())))?
        } else {
            SyncConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.drive_id.is_empty() {
            return Err(EngineError::Config("drive_id must not be empty".into()));
        }
        if self.sync_root.as_os_str().is_empty() {
            return Err(EngineError::Config("sync_root must be set".into()));
        }
        if !(0.0..=1.0).contains(&self.big_delete.threshold_percent) {
            return Err(EngineError::Config(
                "big_delete.threshold_percent must be in [0.0, 1.0]".into(),
            ));
        }
        if self.transfer.download_workers < 1 || self.transfer.upload_workers < 1 {
            return Err(EngineError::Config(
                "transfer.download_workers and upload_workers must each be >= 1".into(),
            ));
        }
        Ok(())
    }
}
