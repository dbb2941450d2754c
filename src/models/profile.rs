// NA Manager - Profile Data Model
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Profile data model and serialization.
//!
//! A NetworkProfile is a named, reusable set of per-adapter IPv4
//! configurations. Profiles are stored as a JSON array and exported one
//! profile per file; the field names follow the persisted document shape.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::adapter::AdapterRecord;

/// Desired IPv4 configuration of one adapter inside a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AdapterConfiguration {
    #[serde(default)]
    pub adapter_name: String,
    #[serde(default)]
    pub adapter_device_id: String,
    #[serde(default)]
    pub use_dhcp: bool,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub subnet_mask: String,
    #[serde(default)]
    pub default_gateway: String,
    #[serde(default)]
    pub preferred_dns: String,
    #[serde(default)]
    pub alternate_dns: String,
    #[serde(default = "default_true")]
    pub auto_metric: bool,
    #[serde(default)]
    pub metric_value: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl AdapterConfiguration {
    /// A DHCP entry for the given adapter.
    pub fn dhcp(adapter_name: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            adapter_name: adapter_name.into(),
            adapter_device_id: device_id.into(),
            use_dhcp: true,
            ip_address: String::new(),
            subnet_mask: String::new(),
            default_gateway: String::new(),
            preferred_dns: String::new(),
            alternate_dns: String::new(),
            auto_metric: true,
            metric_value: None,
        }
    }

    /// A static entry for the given adapter.
    pub fn static_ip(
        adapter_name: impl Into<String>,
        device_id: impl Into<String>,
        ip_address: impl Into<String>,
        subnet_mask: impl Into<String>,
        default_gateway: impl Into<String>,
    ) -> Self {
        Self {
            use_dhcp: false,
            ip_address: ip_address.into(),
            subnet_mask: subnet_mask.into(),
            default_gateway: default_gateway.into(),
            ..Self::dhcp(adapter_name, device_id)
        }
    }

    /// Set the preferred and alternate DNS servers.
    pub fn with_dns(mut self, preferred: impl Into<String>, alternate: impl Into<String>) -> Self {
        self.preferred_dns = preferred.into();
        self.alternate_dns = alternate.into();
        self
    }

    /// Snapshot the current configuration of a live adapter.
    pub fn from_adapter(adapter: &AdapterRecord) -> Self {
        let mut dns = adapter.dns_servers.iter().map(|d| d.trim().to_string());
        Self {
            adapter_name: adapter.name.clone(),
            adapter_device_id: adapter.device_id.clone(),
            use_dhcp: adapter.is_dhcp_enabled,
            ip_address: adapter.ip_address.clone(),
            subnet_mask: adapter.subnet_mask.clone(),
            default_gateway: adapter.default_gateway.clone(),
            preferred_dns: dns.next().unwrap_or_default(),
            alternate_dns: dns.next().unwrap_or_default(),
            auto_metric: true,
            metric_value: None,
        }
    }
}

/// A named collection of adapter configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkProfile {
    /// Opaque identifier, immutable after creation.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_date: DateTime<Local>,
    pub last_modified: DateTime<Local>,
    #[serde(default)]
    pub adapter_configurations: Vec<AdapterConfiguration>,
}

impl NetworkProfile {
    /// Create a new empty profile with a fresh identity.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Local::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            created_date: now,
            last_modified: now,
            adapter_configurations: Vec::new(),
        }
    }

    /// Build a profile capturing the current state of the given adapters.
    pub fn from_adapters<'a>(
        name: impl Into<String>,
        adapters: impl IntoIterator<Item = &'a AdapterRecord>,
    ) -> Self {
        let mut profile = Self::new(name);
        profile.description = "Current network configuration".to_string();
        profile.adapter_configurations = adapters
            .into_iter()
            .map(AdapterConfiguration::from_adapter)
            .collect();
        profile
    }

    /// Default name for a profile captured right now.
    pub fn default_name() -> String {
        format!("Profile {}", Local::now().format("%Y-%m-%d %H:%M"))
    }

    /// Replace identity and timestamps, as done on import.
    pub fn mint_identity(&mut self) {
        let now = Local::now();
        self.id = Uuid::new_v4().to_string();
        self.created_date = now;
        self.last_modified = now;
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_configuration(mut self, config: AdapterConfiguration) -> Self {
        self.adapter_configurations.push(config);
        self
    }

    /// Serialize to a pretty JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from a JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl Default for NetworkProfile {
    fn default() -> Self {
        Self::new("New Profile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_creation() {
        let profile = NetworkProfile::new("Office");
        assert_eq!(profile.name, "Office");
        assert!(profile.adapter_configurations.is_empty());
        assert_eq!(profile.created_date, profile.last_modified);
        assert!(Uuid::parse_str(&profile.id).is_ok());
    }

    #[test]
    fn test_profile_json_shape() {
        let profile = NetworkProfile::new("Lab").with_configuration(
            AdapterConfiguration::static_ip("Ethernet", "{4D36E972-1}", "10.0.0.5", "255.255.255.0", "10.0.0.1")
                .with_dns("1.1.1.1", ""),
        );
        let value: serde_json::Value =
            serde_json::from_str(&profile.to_json().expect("Profile should serialize")).expect("valid JSON");
        assert_eq!(value["Name"], "Lab");
        assert!(value["CreatedDate"].is_string());
        let entry = &value["AdapterConfigurations"][0];
        assert_eq!(entry["AdapterDeviceId"], "{4D36E972-1}");
        assert_eq!(entry["UseDhcp"], false);
        assert_eq!(entry["PreferredDns"], "1.1.1.1");
        assert_eq!(entry["AutoMetric"], true);
        assert!(entry["MetricValue"].is_null());
    }

    #[test]
    fn test_configuration_defaults_when_fields_missing() {
        let json = r#"{"AdapterName":"Wi-Fi","AdapterDeviceId":"7","UseDhcp":true}"#;
        let config: AdapterConfiguration = serde_json::from_str(json).expect("Entry should deserialize");
        assert!(config.auto_metric);
        assert_eq!(config.metric_value, None);
        assert!(config.ip_address.is_empty());
    }

    #[test]
    fn test_snapshot_from_adapter_splits_dns() {
        let mut adapter = AdapterRecord::new("3", "Intel(R) Wi-Fi 6");
        adapter.ip_address = "192.168.1.20".to_string();
        adapter.subnet_mask = "255.255.255.0".to_string();
        adapter.dns_servers = vec!["8.8.8.8".to_string(), " 8.8.4.4".to_string(), "9.9.9.9".to_string()];
        let config = AdapterConfiguration::from_adapter(&adapter);
        assert!(!config.use_dhcp);
        assert_eq!(config.preferred_dns, "8.8.8.8");
        assert_eq!(config.alternate_dns, "8.8.4.4");
        assert_eq!(config.adapter_device_id, "3");
    }

    #[test]
    fn test_mint_identity_changes_id() {
        let mut profile = NetworkProfile::new("Home");
        let old_id = profile.id.clone();
        profile.mint_identity();
        assert_ne!(profile.id, old_id);
    }
}
