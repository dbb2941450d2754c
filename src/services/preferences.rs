// NA Manager - Adapter Preferences Store
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Persistent custom names and hidden flags, keyed by device id.
//!
//! Every mutation is applied to a copy of the document, written to disk, and
//! only then published to readers. A failed write leaves memory unchanged.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::models::{AdapterPreference, AdapterPreferences, AdapterRecord, Result};
use crate::storage::{mutex_lock, read_json_or_default, read_lock, write_json_atomic, write_lock};

/// Store for per-adapter preferences.
pub struct PreferencesStore {
    path: PathBuf,
    document: RwLock<AdapterPreferences>,
    writer: Mutex<()>,
}

impl PreferencesStore {
    /// Load the store from `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let document: AdapterPreferences = read_json_or_default(&path, "adapter preferences");
        debug!("{} adapter preference(s) loaded", document.preferences.len());
        Self {
            path,
            document: RwLock::new(document),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set the custom name. An empty name restores the OS name.
    pub fn set_custom_name(&self, device_id: &str, custom_name: &str) -> Result<()> {
        let custom_name = custom_name.trim().to_string();
        self.mutate(|doc| {
            let pref = entry(doc, device_id);
            pref.custom_name = custom_name;
            pref.touch();
            true
        })?;
        info!("Custom name for {} updated", device_id);
        Ok(())
    }

    pub fn set_hidden(&self, device_id: &str, hidden: bool) -> Result<()> {
        self.mutate(|doc| {
            let pref = entry(doc, device_id);
            pref.is_hidden = hidden;
            pref.touch();
            true
        })?;
        info!("Adapter {} {}", device_id, if hidden { "hidden" } else { "unhidden" });
        Ok(())
    }

    pub fn get_preference(&self, device_id: &str) -> Option<AdapterPreference> {
        read_lock(&self.document, "preferences")
            .preferences
            .get(device_id)
            .cloned()
    }

    /// Remove the entry for `device_id`. Returns whether one existed.
    pub fn clear_preference(&self, device_id: &str) -> Result<bool> {
        self.mutate(|doc| doc.preferences.remove(device_id).is_some())
    }

    /// Custom name, empty when none is set.
    pub fn custom_name(&self, device_id: &str) -> String {
        self.get_preference(device_id)
            .map(|p| p.custom_name)
            .unwrap_or_default()
    }

    pub fn is_hidden(&self, device_id: &str) -> bool {
        self.get_preference(device_id).map(|p| p.is_hidden).unwrap_or(false)
    }

    /// Attach custom names and hidden flags to freshly enumerated records.
    pub fn apply_to(&self, records: &mut [AdapterRecord]) {
        let doc = read_lock(&self.document, "preferences");
        for record in records.iter_mut() {
            match doc.preferences.get(&record.device_id) {
                Some(pref) => {
                    record.custom_name = pref.custom_name.clone();
                    record.is_hidden = pref.is_hidden;
                }
                None => {
                    record.custom_name.clear();
                    record.is_hidden = false;
                }
            }
        }
    }

    /// All entries, sorted by device id.
    pub fn preferences(&self) -> Vec<AdapterPreference> {
        let mut prefs: Vec<_> = read_lock(&self.document, "preferences")
            .preferences
            .values()
            .cloned()
            .collect();
        prefs.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        prefs
    }

    /// Apply `change` to a copy, persist it if it reports a change, then publish.
    fn mutate<F>(&self, change: F) -> Result<bool>
    where
        F: FnOnce(&mut AdapterPreferences) -> bool,
    {
        let _writer = mutex_lock(&self.writer, "preferences writer");
        let mut next = read_lock(&self.document, "preferences").clone();
        if !change(&mut next) {
            return Ok(false);
        }
        write_json_atomic(&self.path, &next)?;
        *write_lock(&self.document, "preferences") = next;
        Ok(true)
    }
}

fn entry<'a>(doc: &'a mut AdapterPreferences, device_id: &str) -> &'a mut AdapterPreference {
    doc.preferences
        .entry(device_id.to_string())
        .or_insert_with(|| AdapterPreference::new(device_id))
}
