// NA Manager - Adapter Records
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Snapshot types for physical network adapters.
//!
//! An [`AdapterRecord`] is rebuilt on every enumeration poll. The OS knows
//! nothing about custom names or hidden adapters, so those two fields are
//! re-attached from the preferences store after each poll.

use serde::{Deserialize, Serialize};

/// Connection status as reported by the management layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    HardwareNotPresent,
    HardwareDisabled,
    HardwareMalfunction,
    MediaDisconnected,
    Authenticating,
    AuthSucceeded,
    AuthFailed,
    InvalidAddress,
    CredentialsRequired,
    Unknown,
}

impl ConnectionStatus {
    /// Map the raw `NetConnectionStatus` code.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Disconnecting,
            4 => Self::HardwareNotPresent,
            5 => Self::HardwareDisabled,
            6 => Self::HardwareMalfunction,
            7 => Self::MediaDisconnected,
            8 => Self::Authenticating,
            9 => Self::AuthSucceeded,
            10 => Self::AuthFailed,
            11 => Self::InvalidAddress,
            12 => Self::CredentialsRequired,
            _ => Self::Unknown,
        }
    }

    /// Get human-readable name for this status.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnecting => "Disconnecting",
            Self::HardwareNotPresent => "Hardware not present",
            Self::HardwareDisabled => "Hardware disabled",
            Self::HardwareMalfunction => "Hardware malfunction",
            Self::MediaDisconnected => "Media disconnected",
            Self::Authenticating => "Authenticating",
            Self::AuthSucceeded => "Authentication succeeded",
            Self::AuthFailed => "Authentication failed",
            Self::InvalidAddress => "Invalid address",
            Self::CredentialsRequired => "Credentials required",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether the adapter is up. The only status that counts as enabled.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Statuses an adapter settles into after being disabled or unplugged.
    pub fn is_disconnected_family(&self) -> bool {
        matches!(
            self,
            Self::Disconnected
                | Self::Disconnecting
                | Self::HardwareNotPresent
                | Self::HardwareDisabled
                | Self::MediaDisconnected
        )
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One physical adapter as seen during a single enumeration poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterRecord {
    /// OS-assigned stable identifier.
    pub device_id: String,
    /// Adapter product name.
    pub name: String,
    /// Driver description.
    pub description: String,
    /// Friendly connection name ("Ethernet", "Wi-Fi"), if assigned.
    pub connection_id: Option<String>,
    /// Hardware address, "N/A" when the OS reports none.
    pub mac_address: String,
    /// OS adapter type label.
    pub adapter_type: String,

    pub is_enabled: bool,
    pub connection_status: ConnectionStatus,
    pub ip_address: String,
    pub subnet_mask: String,
    pub default_gateway: String,
    pub dns_servers: Vec<String>,
    pub is_dhcp_enabled: bool,

    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub speed_bits_per_sec: u64,

    /// User-assigned name from the preferences store.
    pub custom_name: String,
    /// Hidden flag from the preferences store.
    pub is_hidden: bool,
}

impl AdapterRecord {
    /// Create a record with identity only; everything else starts empty.
    pub fn new(device_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            name: name.into(),
            description: String::new(),
            connection_id: None,
            mac_address: "N/A".to_string(),
            adapter_type: "Unknown".to_string(),
            is_enabled: false,
            connection_status: ConnectionStatus::Disconnected,
            ip_address: String::new(),
            subnet_mask: String::new(),
            default_gateway: String::new(),
            dns_servers: Vec::new(),
            is_dhcp_enabled: false,
            bytes_received: 0,
            bytes_sent: 0,
            speed_bits_per_sec: 0,
            custom_name: String::new(),
            is_hidden: false,
        }
    }

    /// Set the connection status and the `is_enabled` flag derived from it.
    pub fn set_status(&mut self, status: ConnectionStatus) {
        self.connection_status = status;
        self.is_enabled = status.is_enabled();
    }

    /// Name shown to the user: custom name if set, OS name otherwise.
    pub fn display_name(&self) -> &str {
        if self.custom_name.trim().is_empty() {
            &self.name
        } else {
            &self.custom_name
        }
    }

    /// Name understood by netsh and the NetAdapter cmdlets.
    pub fn friendly_name(&self) -> &str {
        match self.connection_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => &self.name,
        }
    }

    /// DNS servers joined for display.
    pub fn dns_display(&self) -> String {
        self.dns_servers.join(", ")
    }

    pub fn formatted_bytes_received(&self) -> String {
        format_bytes(self.bytes_received)
    }

    pub fn formatted_bytes_sent(&self) -> String {
        format_bytes(self.bytes_sent)
    }

    pub fn formatted_speed(&self) -> String {
        format_speed(self.speed_bits_per_sec)
    }
}

/// Format a byte count with binary units.
pub fn format_bytes(bytes: u64) -> String {
    const SIZES: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut order = 0;
    let mut size = bytes as f64;
    while size >= 1024.0 && order < SIZES.len() - 1 {
        order += 1;
        size /= 1024.0;
    }
    format!("{} {}", trim_decimals(size), SIZES[order])
}

/// Format a link speed given in bits per second.
pub fn format_speed(bits_per_sec: u64) -> String {
    if bits_per_sec == 0 {
        return "N/A".to_string();
    }
    let mbps = bits_per_sec as f64 / 1_000_000.0;
    if mbps >= 1000.0 {
        format!("{} Gbps", trim_decimals(mbps / 1000.0))
    } else {
        format!("{} Mbps", trim_decimals(mbps))
    }
}

/// Render with at most two decimals and no trailing zeros.
fn trim_decimals(value: f64) -> String {
    let s = format!("{:.2}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}
