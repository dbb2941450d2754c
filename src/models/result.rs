// NA Manager - Operation Results
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Result types for the toggle fallback chain and profile application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Step completed successfully.
    Success,
    /// Step ran and reported failure.
    Failed,
    /// Step raised an error and was abandoned.
    Error,
    /// Step was not attempted.
    Skipped,
}

impl StepStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

/// One attempt of the enable/disable fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based position in the chain.
    pub ordinal: usize,
    /// Strategy name.
    pub method: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub duration_ms: u64,
}

/// Outcome of a full enable/disable request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleReport {
    pub device_id: String,
    pub enable: bool,
    pub attempts: Vec<AttemptRecord>,
    pub succeeded: bool,
    /// Human-readable reason when the request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub total_duration_ms: u64,
}

impl ToggleReport {
    pub fn new(device_id: impl Into<String>, enable: bool) -> Self {
        Self {
            device_id: device_id.into(),
            enable,
            attempts: Vec::new(),
            succeeded: false,
            reason: None,
            total_duration_ms: 0,
        }
    }

    /// The method that succeeded, if any.
    pub fn winning_method(&self) -> Option<&str> {
        self.attempts
            .iter()
            .find(|a| a.status.is_success())
            .map(|a| a.method.as_str())
    }

    /// Operation name used in events and messages.
    pub fn operation(&self) -> &'static str {
        if self.enable {
            "EnableAdapter"
        } else {
            "DisableAdapter"
        }
    }
}

/// Result of applying one profile entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryResult {
    pub adapter_name: String,
    pub device_id: String,
    pub use_dhcp: bool,
    pub status: StepStatus,
    pub duration_ms: u64,
}

/// Overall result of applying a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyReport {
    pub profile_id: String,
    pub profile_name: String,
    pub entries: Vec<EntryResult>,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ApplyReport {
    pub fn new(profile_id: impl Into<String>, profile_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            profile_id: profile_id.into(),
            profile_name: profile_name.into(),
            entries: Vec::new(),
            message: String::new(),
            started_at: now,
            completed_at: now,
        }
    }

    pub fn add_entry(&mut self, entry: EntryResult) {
        self.entries.push(entry);
    }

    /// Finalize the report and compute its summary message.
    pub fn finalize(&mut self) {
        self.completed_at = Utc::now();
        let failed = self.failure_count();
        self.message = if self.entries.is_empty() {
            "Profile has no adapter configurations".to_string()
        } else if failed == 0 {
            format!("{} adapter(s) configured successfully", self.entries.len())
        } else {
            format!("{} of {} adapter configuration(s) failed", failed, self.entries.len())
        };
    }

    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|e| e.status.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.entries.len() - self.success_count()
    }

    /// True only when every entry succeeded.
    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }

    pub fn total_duration_ms(&self) -> u64 {
        (self.completed_at - self.started_at).num_milliseconds().max(0) as u64
    }
}
