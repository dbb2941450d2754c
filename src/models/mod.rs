// NA Manager - Data Models
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! # Data Models
//!
//! Shared types used across the core:
//!
//! - **Adapter**: Per-poll snapshot of a physical adapter
//! - **Profile**: Named sets of per-adapter IP configurations
//! - **Preference**: Custom names and hidden flags
//! - **Result**: Fallback-chain and profile-apply reports
//! - **Config**: Application settings
//! - **Error**: Shared error types

pub mod adapter;
pub mod config;
pub mod error;
pub mod preference;
pub mod profile;
pub mod result;
pub mod validation;

// Re-export main types for convenience
pub use adapter::{AdapterRecord, ConnectionStatus};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use preference::{AdapterPreference, AdapterPreferences};
pub use profile::{AdapterConfiguration, NetworkProfile};
pub use result::{ApplyReport, AttemptRecord, EntryResult, StepStatus, ToggleReport};
pub use validation::StaticIpRequest;

/// Configuration directory name (under the user config dir).
pub const CONFIG_DIR_NAME: &str = "na-manager";

/// Data directory name (under the user local data dir).
pub const DATA_DIR_NAME: &str = "na-manager";

/// Settings file name inside the config directory.
pub const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Preferences document file name.
pub const PREFERENCES_FILE_NAME: &str = "adapter_preferences.json";

/// Profiles document file name.
pub const PROFILES_FILE_NAME: &str = "profiles.json";

/// Directory for diagnostic logs and reports, under the data directory.
pub const DIAGNOSTICS_DIR_NAME: &str = "debug_logs";
