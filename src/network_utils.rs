// NA Manager - Adapter Enumeration
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Physical adapter detection.
//!
//! Each poll is three reads against the management layer: adapter identity
//! and link state, then the IP configuration object keyed by `Index`, then
//! traffic counters matched by description or connection name. A missing
//! configuration or counter entry leaves the record's defaults in place.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::cim_client::{InterfaceStatistics, ManagementApi, RawAdapter, RawConfiguration};
use crate::models::{AdapterRecord, ConnectionStatus, Error, Result};
use crate::services::PreferencesStore;

/// Read-only view of the machine's physical adapters.
#[derive(Clone)]
pub struct AdapterEnumerator {
    api: Arc<dyn ManagementApi>,
}

impl AdapterEnumerator {
    pub fn new(api: Arc<dyn ManagementApi>) -> Self {
        Self { api }
    }

    /// Snapshot every physical adapter.
    pub async fn list_adapters(&self) -> Result<Vec<AdapterRecord>> {
        let raw_adapters = self.api.physical_adapters().await.map_err(|e| match e {
            Error::Enumeration(_) => e,
            other => Error::Enumeration(other.to_string()),
        })?;

        let stats = match self.api.interface_statistics().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Interface statistics unavailable: {}", e);
                Vec::new()
            }
        };

        let mut adapters = Vec::with_capacity(raw_adapters.len());
        for raw in &raw_adapters {
            let config = match self.api.configuration(raw.index).await {
                Ok(config) => config,
                Err(e) => {
                    warn!("No configuration for adapter {} ({}): {}", raw.device_id, raw.name, e);
                    None
                }
            };
            adapters.push(build_record(raw, config.as_ref(), &stats));
        }

        adapters.sort_by(|a, b| natural_sort_key(a.friendly_name()).cmp(&natural_sort_key(b.friendly_name())));
        debug!("Enumerated {} physical adapter(s)", adapters.len());
        Ok(adapters)
    }

    /// Snapshot every adapter with custom names and hidden flags attached.
    pub async fn list_adapters_with_preferences(
        &self,
        preferences: &PreferencesStore,
    ) -> Result<Vec<AdapterRecord>> {
        let mut adapters = self.list_adapters().await?;
        preferences.apply_to(&mut adapters);
        Ok(adapters)
    }

    /// Snapshot a single adapter by device id.
    pub async fn adapter(&self, device_id: &str) -> Result<Option<AdapterRecord>> {
        let Some(raw) = self.api.adapter(device_id).await? else {
            return Ok(None);
        };
        let config = self.api.configuration(raw.index).await.unwrap_or_else(|e| {
            warn!("No configuration for adapter {}: {}", device_id, e);
            None
        });
        let stats = self.api.interface_statistics().await.unwrap_or_default();
        Ok(Some(build_record(&raw, config.as_ref(), &stats)))
    }
}

/// Merge the three management reads into one record.
pub fn build_record(
    raw: &RawAdapter,
    config: Option<&RawConfiguration>,
    stats: &[InterfaceStatistics],
) -> AdapterRecord {
    let mut record = AdapterRecord::new(&raw.device_id, &raw.name);
    record.description = raw.description.clone();
    record.connection_id = raw.net_connection_id.clone().filter(|id| !id.is_empty());
    if let Some(mac) = raw.mac_address.as_deref().filter(|m| !m.is_empty()) {
        record.mac_address = mac.to_string();
    }
    if let Some(kind) = raw.adapter_type.as_deref().filter(|t| !t.is_empty()) {
        record.adapter_type = kind.to_string();
    }
    record.speed_bits_per_sec = raw.speed.unwrap_or(0);
    record.set_status(
        raw.net_connection_status
            .map(ConnectionStatus::from_code)
            .unwrap_or(ConnectionStatus::Unknown),
    );

    if let Some(config) = config {
        record.is_dhcp_enabled = config.dhcp_enabled;
        // IPv4 entries come first, but the position is what pairs an address with its mask
        if let Some(pos) = config.ip_address.iter().position(|a| is_ipv4(a)) {
            record.ip_address = config.ip_address[pos].clone();
            record.subnet_mask = config.ip_subnet.get(pos).cloned().unwrap_or_default();
        }
        record.default_gateway = config
            .default_ip_gateway
            .iter()
            .find(|g| is_ipv4(g))
            .or_else(|| config.default_ip_gateway.first())
            .cloned()
            .unwrap_or_default();
        record.dns_servers = config.dns_server_search_order.clone();
    }

    let friendly = raw.friendly_name();
    if let Some(counters) = stats
        .iter()
        .find(|s| s.description == raw.description || s.name == friendly)
    {
        record.bytes_received = counters.bytes_received;
        record.bytes_sent = counters.bytes_sent;
    }

    record
}

fn is_ipv4(text: &str) -> bool {
    text.parse::<std::net::Ipv4Addr>().is_ok()
}

/// Generate a sort key that sorts numbers naturally.
fn natural_sort_key(s: &str) -> (String, u32) {
    let mut prefix = String::new();
    let mut num_str = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            num_str.push(c);
        } else if num_str.is_empty() {
            prefix.push(c);
        }
    }

    let num: u32 = num_str.parse().unwrap_or(0);
    (prefix.to_lowercase(), num)
}


#[cfg(test)]
mod tests {
    use super::testing::FakeManagement;
    use super::*;

    #[test]
    fn test_natural_sort_key() {
        assert_eq!(natural_sort_key("Ethernet 2"), ("ethernet ".to_string(), 2));
        assert_eq!(natural_sort_key("Ethernet 10"), ("ethernet ".to_string(), 10));
        assert_eq!(natural_sort_key("Wi-Fi"), ("wi-fi".to_string(), 0));
    }

    #[test]
    fn test_build_record_pairs_ipv4_with_mask() {
        let raw = RawAdapter {
            device_id: "7".into(),
            index: 7,
            name: "Intel(R) Wi-Fi 6".into(),
            description: "Intel(R) Wi-Fi 6 AX201".into(),
            net_connection_id: Some("Wi-Fi".into()),
            net_connection_status: Some(7),
            ..Default::default()
        };
        let config = RawConfiguration {
            index: 7,
            dhcp_enabled: true,
            ip_address: vec!["fe80::1".into(), "10.1.2.3".into()],
            ip_subnet: vec!["64".into(), "255.255.0.0".into()],
            default_ip_gateway: vec!["10.1.0.1".into()],
            dns_server_search_order: vec!["10.1.0.1".into(), "8.8.8.8".into()],
        };
        let stats = vec![InterfaceStatistics {
            name: "Wi-Fi".into(),
            description: "something else".into(),
            bytes_received: 2048,
            bytes_sent: 1024,
        }];

        let record = build_record(&raw, Some(&config), &stats);
        assert_eq!(record.ip_address, "10.1.2.3");
        assert_eq!(record.subnet_mask, "255.255.0.0");
        assert_eq!(record.dns_servers.len(), 2);
        assert_eq!(record.connection_status, ConnectionStatus::MediaDisconnected);
        assert!(!record.is_enabled);
        assert_eq!(record.bytes_received, 2048);
        assert_eq!(record.mac_address, "N/A");
    }

    #[test]
    fn test_build_record_without_config_or_stats() {
        let raw = RawAdapter {
            device_id: "1".into(),
            index: 1,
            name: "Realtek".into(),
            net_connection_status: Some(2),
            ..Default::default()
        };
        let record = build_record(&raw, None, &[]);
        assert!(record.is_enabled);
        assert_eq!(record.bytes_sent, 0);
        assert!(record.ip_address.is_empty());
        assert_eq!(record.friendly_name(), "Realtek");
    }

    #[tokio::test]
    async fn test_list_adapters_sorted_and_joined() {
        let fake = FakeManagement::new()
            .with_adapter("10", 10, "Ethernet 10")
            .with_adapter("2", 2, "Ethernet 2");
        let enumerator = AdapterEnumerator::new(Arc::new(fake));
        let adapters = enumerator.list_adapters().await.expect("enumeration should succeed");
        assert_eq!(adapters.len(), 2);
        assert_eq!(adapters[0].device_id, "2");
        assert_eq!(adapters[0].ip_address, "192.168.1.12");
        assert!(adapters[0].is_dhcp_enabled);
    }

    #[tokio::test]
    async fn test_enumeration_failure() {
        let fake = FakeManagement::new();
        *fake.fail_enumeration.lock().expect("flag") = true;
        let enumerator = AdapterEnumerator::new(Arc::new(fake));
        assert!(matches!(
            enumerator.list_adapters().await,
            Err(Error::Enumeration(_))
        ));
    }
}
