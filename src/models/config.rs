// NA Manager - Application Configuration
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Application configuration model.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration, persisted as TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Adapter poll interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Bounded wait for every external process, in seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Settle time between disable and enable during a reset.
    #[serde(default = "default_reset_delay")]
    pub reset_delay_ms: u64,

    /// Location of devcon.exe. Defaults to the system directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devcon_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Collect operation events for troubleshooting.
    #[serde(default = "default_true")]
    pub diagnostics_enabled: bool,

    /// Maximum diagnostic events kept in memory.
    #[serde(default = "default_max_diagnostic_events")]
    pub max_diagnostic_events: usize,

    /// Override for the directory holding profiles and preferences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_command_timeout() -> u64 {
    5
}

fn default_reset_delay() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_diagnostic_events() -> usize {
    1000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            command_timeout_secs: default_command_timeout(),
            reset_delay_ms: default_reset_delay(),
            devcon_path: None,
            log_level: default_log_level(),
            diagnostics_enabled: true,
            max_diagnostic_events: default_max_diagnostic_events(),
            data_dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self, super::Error> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), super::Error> {
        let content = toml::to_string_pretty(self)?;
        crate::storage::write_atomic(path, content.as_bytes())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }

    /// Resolved devcon location.
    pub fn devcon_path(&self) -> PathBuf {
        if let Some(path) = &self.devcon_path {
            return path.clone();
        }
        let system_root = std::env::var_os("SystemRoot")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\Windows"));
        system_root.join("System32").join("devcon.exe")
    }
}
