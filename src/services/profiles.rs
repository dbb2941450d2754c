// NA Manager - Profile Store
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Saved network profiles and applying them.
//!
//! Profiles live in one JSON array. Mutations follow the same rule as the
//! preferences store: write the new document first, publish it second.
//! Applying a profile walks every entry even after a failure; the overall
//! result is true only when every entry succeeded.

use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::models::{ApplyReport, EntryResult, Error, NetworkProfile, Result, StepStatus};
use crate::services::control::AdapterControl;
use crate::services::diagnostics::OperationEvent;
use crate::storage::{mutex_lock, read_json_or_default, read_lock, write_json_atomic, write_lock};

/// Store for network profiles.
pub struct ProfileStore {
    path: PathBuf,
    profiles: RwLock<Vec<NetworkProfile>>,
    writer: Mutex<()>,
}

impl ProfileStore {
    /// Load profiles from `path`. A missing or corrupt file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let profiles: Vec<NetworkProfile> = read_json_or_default(&path, "profiles");
        debug!("{} profile(s) loaded", profiles.len());
        Self {
            path,
            profiles: RwLock::new(profiles),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All profiles in stored order.
    pub fn profiles(&self) -> Vec<NetworkProfile> {
        read_lock(&self.profiles, "profiles").clone()
    }

    pub fn profile(&self, id: &str) -> Option<NetworkProfile> {
        read_lock(&self.profiles, "profiles")
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    /// Insert a new profile or update the one with the same id.
    ///
    /// An update keeps the stored creation date and refreshes `last_modified`.
    pub fn save_profile(&self, profile: NetworkProfile) -> bool {
        let id = profile.id.clone();
        let result = self.mutate(|profiles| {
            match profiles.iter_mut().find(|p| p.id == profile.id) {
                Some(existing) => {
                    existing.name = profile.name;
                    existing.description = profile.description;
                    existing.adapter_configurations = profile.adapter_configurations;
                    existing.last_modified = Local::now();
                }
                None => profiles.push(profile),
            }
            true
        });
        report_result("save", &id, result)
    }

    /// Delete a profile. `false` for an unknown id or a failed write.
    pub fn delete_profile(&self, id: &str) -> bool {
        let result = self.mutate(|profiles| {
            let before = profiles.len();
            profiles.retain(|p| p.id != id);
            profiles.len() != before
        });
        match result {
            Ok(false) => {
                warn!("Cannot delete unknown profile {}", id);
                false
            }
            other => report_result("delete", id, other),
        }
    }

    /// Apply a profile. `true` only when every entry succeeded.
    pub async fn apply_profile(&self, id: &str, control: &AdapterControl) -> bool {
        match self.apply_profile_report(id, control).await {
            Ok(report) => report.is_success(),
            Err(e) => {
                warn!("Cannot apply profile: {}", e);
                false
            }
        }
    }

    /// Apply a profile entry by entry and report each outcome.
    pub async fn apply_profile_report(&self, id: &str, control: &AdapterControl) -> Result<ApplyReport> {
        let profile = self
            .profile(id)
            .ok_or_else(|| Error::ProfileNotFound(id.to_string()))?;
        info!(
            "Applying profile '{}' ({} adapter configuration(s))",
            profile.name,
            profile.adapter_configurations.len()
        );

        let started = Instant::now();
        let mut report = ApplyReport::new(&profile.id, &profile.name);
        for config in &profile.adapter_configurations {
            let entry_started = Instant::now();
            let ok = if config.use_dhcp {
                control.set_dhcp(&config.adapter_device_id).await
            } else {
                control
                    .set_static_ip(
                        &config.adapter_device_id,
                        &config.ip_address,
                        &config.subnet_mask,
                        &config.default_gateway,
                        &config.preferred_dns,
                        &config.alternate_dns,
                    )
                    .await
            };
            if !ok {
                warn!("Profile '{}': {} failed", profile.name, config.adapter_name);
            }
            report.add_entry(EntryResult {
                adapter_name: config.adapter_name.clone(),
                device_id: config.adapter_device_id.clone(),
                use_dhcp: config.use_dhcp,
                status: if ok { StepStatus::Success } else { StepStatus::Failed },
                duration_ms: entry_started.elapsed().as_millis() as u64,
            });
        }
        report.finalize();

        let event = if report.is_success() {
            OperationEvent::succeeded("ApplyProfile", &profile.id, started.elapsed()).with_detail(&report.message)
        } else {
            OperationEvent::failed("ApplyProfile", &profile.id, started.elapsed(), &report.message)
        };
        control.sink().record(event);
        info!("Profile '{}': {}", profile.name, report.message);
        Ok(report)
    }

    /// Write one profile to its own file.
    pub fn export_profile(&self, id: &str, path: &Path) -> bool {
        let Some(profile) = self.profile(id) else {
            warn!("Cannot export unknown profile {}", id);
            return false;
        };
        match write_json_atomic(path, &profile) {
            Ok(()) => {
                info!("Exported profile '{}' to {:?}", profile.name, path);
                true
            }
            Err(e) => {
                error!("Failed to export profile {}: {}", id, e);
                false
            }
        }
    }

    /// Read a profile file and store it under a fresh identity.
    pub fn import_profile(&self, path: &Path) -> Option<NetworkProfile> {
        let mut profile = match read_profile_file(path) {
            Ok(profile) => profile,
            Err(e) => {
                error!("Failed to import profile from {:?}: {}", path, e);
                return None;
            }
        };
        profile.mint_identity();

        let stored = profile.clone();
        match self.mutate(move |profiles| {
            profiles.push(stored);
            true
        }) {
            Ok(_) => {
                info!("Imported profile '{}' as {}", profile.name, profile.id);
                Some(profile)
            }
            Err(e) => {
                error!("Failed to store imported profile: {}", e);
                None
            }
        }
    }

    /// Apply `change` to a copy, persist it if it reports a change, then publish.
    fn mutate<F>(&self, change: F) -> Result<bool>
    where
        F: FnOnce(&mut Vec<NetworkProfile>) -> bool,
    {
        let _writer = mutex_lock(&self.writer, "profiles writer");
        let mut next = read_lock(&self.profiles, "profiles").clone();
        if !change(&mut next) {
            return Ok(false);
        }
        write_json_atomic(&self.path, &next)?;
        *write_lock(&self.profiles, "profiles") = next;
        Ok(true)
    }
}

fn read_profile_file(path: &Path) -> Result<NetworkProfile> {
    let json = std::fs::read_to_string(path)?;
    Ok(NetworkProfile::from_json(&json)?)
}

fn report_result(action: &str, id: &str, result: Result<bool>) -> bool {
    match result {
        Ok(changed) => {
            debug!("Profile {} {}", id, action);
            changed
        }
        Err(e) => {
            error!("Failed to {} profile {}: {}", action, id, e);
            false
        }
    }
}
