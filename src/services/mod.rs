// NA Manager - Services
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Services built on top of the management and command seams.
//!
//! - Control: Enable/disable fallback chain, IP configuration, reset, renew
//! - Preferences: Custom adapter names and hidden flags
//! - Profiles: Saved configurations and applying them
//! - Diagnostics: Operation events, daily log, troubleshooting report
//! - Monitor: Periodic adapter snapshots

pub mod control;
pub mod diagnostics;
pub mod monitor;
pub mod preferences;
pub mod profiles;

pub use control::{AdapterControl, ToggleStrategy};
pub use diagnostics::{DiagnosticMonitor, DiagnosticReport, EventSink, OperationEvent, TracingSink};
pub use monitor::{AdapterMonitor, Snapshot, SnapshotDiff};
pub use preferences::PreferencesStore;
pub use profiles::ProfileStore;
