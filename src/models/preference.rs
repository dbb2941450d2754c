// NA Manager - Adapter Preferences
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Per-adapter user preferences (custom name, hidden flag).

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Customization of one adapter, keyed by device id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AdapterPreference {
    pub device_id: String,
    /// Empty means "use the OS name".
    #[serde(default)]
    pub custom_name: String,
    #[serde(default)]
    pub is_hidden: bool,
    pub last_modified: DateTime<Local>,
}

impl AdapterPreference {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            custom_name: String::new(),
            is_hidden: false,
            last_modified: Local::now(),
        }
    }

    /// Refresh the modification timestamp.
    pub fn touch(&mut self) {
        self.last_modified = Local::now();
    }
}

/// The persisted preferences document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AdapterPreferences {
    #[serde(default)]
    pub preferences: HashMap<String, AdapterPreference>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_shape() {
        let mut doc = AdapterPreferences::default();
        let mut pref = AdapterPreference::new("{ABC}");
        pref.custom_name = "Dock".to_string();
        doc.preferences.insert(pref.device_id.clone(), pref);

        let value = serde_json::to_value(&doc).expect("Preferences should serialize");
        let entry = &value["Preferences"]["{ABC}"];
        assert_eq!(entry["DeviceId"], "{ABC}");
        assert_eq!(entry["CustomName"], "Dock");
        assert_eq!(entry["IsHidden"], false);
        assert!(entry["LastModified"].is_string());
    }

    #[test]
    fn test_empty_document_parses() {
        let doc: AdapterPreferences = serde_json::from_str("{}").expect("Empty document should parse");
        assert!(doc.preferences.is_empty());
    }
}
