// NA Manager - Management Object Client
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Typed access to the OS management objects for network adapters.
//!
//! Identity and link state live on `Win32_NetworkAdapter`, IP settings on
//! `Win32_NetworkAdapterConfiguration`, and the two are joined by the numeric
//! `Index`. [`CimShell`] reaches them through PowerShell's CIM cmdlets with
//! JSON output, so every call is an external process behind the
//! [`CommandRunner`] seam.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::command::{CommandOutput, CommandRunner, CommandSpec, DEFAULT_COMMAND_TIMEOUT};
use crate::models::{Error, Result};

/// Management return code for success.
pub const RETURN_SUCCESS: u32 = 0;

/// Management return code for access denied.
pub const RETURN_ACCESS_DENIED: u32 = 5;

/// Identity and link fields of one adapter.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawAdapter {
    #[serde(rename = "DeviceID")]
    pub device_id: String,
    pub index: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, rename = "NetConnectionID")]
    pub net_connection_id: Option<String>,
    #[serde(default, rename = "MACAddress")]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub adapter_type: Option<String>,
    #[serde(default)]
    pub speed: Option<u64>,
    #[serde(default)]
    pub net_connection_status: Option<i64>,
}

impl RawAdapter {
    /// Connection id if assigned, else the adapter name.
    pub fn friendly_name(&self) -> &str {
        match self.net_connection_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => &self.name,
        }
    }
}

/// IP configuration object of one adapter.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawConfiguration {
    #[serde(rename = "Index")]
    pub index: u32,
    #[serde(rename = "DHCPEnabled", default, deserialize_with = "null_as_default")]
    pub dhcp_enabled: bool,
    #[serde(rename = "IPAddress", default, deserialize_with = "one_or_many")]
    pub ip_address: Vec<String>,
    #[serde(rename = "IPSubnet", default, deserialize_with = "one_or_many")]
    pub ip_subnet: Vec<String>,
    #[serde(rename = "DefaultIPGateway", default, deserialize_with = "one_or_many")]
    pub default_ip_gateway: Vec<String>,
    #[serde(rename = "DNSServerSearchOrder", default, deserialize_with = "one_or_many")]
    pub dns_server_search_order: Vec<String>,
}

/// Traffic counters of one interface.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InterfaceStatistics {
    #[serde(rename = "Name", default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "InterfaceDescription", default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(rename = "ReceivedBytes", default, deserialize_with = "null_as_default")]
    pub bytes_received: u64,
    #[serde(rename = "SentBytes", default, deserialize_with = "null_as_default")]
    pub bytes_sent: u64,
}

/// Namespace holding the adapter object used for enable/disable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterNamespace {
    /// `root\cimv2`, class `Win32_NetworkAdapter`.
    Cimv2,
    /// `root\StandardCimv2`, class `MSFT_NetAdapter`.
    StandardCimv2,
}

impl AdapterNamespace {
    fn namespace(&self) -> &'static str {
        match self {
            Self::Cimv2 => "root/cimv2",
            Self::StandardCimv2 => "root/StandardCimv2",
        }
    }

    fn class(&self) -> &'static str {
        match self {
            Self::Cimv2 => "Win32_NetworkAdapter",
            Self::StandardCimv2 => "MSFT_NetAdapter",
        }
    }
}

/// Methods invoked on a configuration object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationCall {
    EnableStatic { ip_address: String, subnet_mask: String },
    SetGateways { gateway: String, metric: u16 },
    /// An empty list resets DNS to automatic.
    SetDnsServers(Vec<String>),
    EnableDhcp,
    ReleaseDhcpLease,
}

impl ConfigurationCall {
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::EnableStatic { .. } => "EnableStatic",
            Self::SetGateways { .. } => "SetGateways",
            Self::SetDnsServers(_) => "SetDNSServerSearchOrder",
            Self::EnableDhcp => "EnableDHCP",
            Self::ReleaseDhcpLease => "ReleaseDHCPLease",
        }
    }

    /// PowerShell `-Arguments` hashtable, if the method takes any.
    fn arguments(&self) -> Option<String> {
        match self {
            Self::EnableStatic { ip_address, subnet_mask } => Some(format!(
                "@{{ IPAddress = [string[]]@({}); SubnetMask = [string[]]@({}) }}",
                ps_quote(ip_address),
                ps_quote(subnet_mask)
            )),
            Self::SetGateways { gateway, metric } => Some(format!(
                "@{{ DefaultIPGateway = [string[]]@({}); GatewayCostMetric = [uint16[]]@({}) }}",
                ps_quote(gateway),
                metric
            )),
            Self::SetDnsServers(servers) if !servers.is_empty() => Some(format!(
                "@{{ DNSServerSearchOrder = [string[]]@({}) }}",
                servers.iter().map(|s| ps_quote(s)).collect::<Vec<_>>().join(", ")
            )),
            _ => None,
        }
    }
}

/// Access to adapter management objects.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// All physical adapters.
    async fn physical_adapters(&self) -> Result<Vec<RawAdapter>>;

    /// The adapter with the given device id, if present.
    async fn adapter(&self, device_id: &str) -> Result<Option<RawAdapter>>;

    /// The configuration object with the given index, if present.
    async fn configuration(&self, index: u32) -> Result<Option<RawConfiguration>>;

    /// Per-interface traffic counters.
    async fn interface_statistics(&self) -> Result<Vec<InterfaceStatistics>>;

    /// Invoke `Enable`/`Disable` on the adapter object; returns the method's return code.
    async fn set_adapter_state(
        &self,
        namespace: AdapterNamespace,
        device_id: &str,
        enable: bool,
    ) -> Result<u32>;

    /// Invoke a method on the configuration object; returns the method's return code.
    async fn invoke_configuration(&self, index: u32, call: &ConfigurationCall) -> Result<u32>;
}

/// [`ManagementApi`] implemented with PowerShell CIM cmdlets.
#[derive(Clone)]
pub struct CimShell {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl CimShell {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run_script(&self, script: String) -> Result<CommandOutput> {
        let output = self
            .runner
            .run(CommandSpec::powershell(script).timeout(self.timeout))
            .await?;
        if !output.success() {
            let detail = first_line(&output.stderr).unwrap_or("no error output");
            return Err(Error::Management(format!(
                "exit {:?}: {}",
                output.exit_code, detail
            )));
        }
        Ok(output)
    }

    /// Run a query script whose output is a JSON array (or one object, or nothing).
    async fn query<T: serde::de::DeserializeOwned>(&self, script: String) -> Result<Vec<T>> {
        let output = self.run_script(script).await?;
        parse_json_list(&output.stdout)
    }

    /// Run a method-invocation script whose output is a return code.
    async fn invoke(&self, script: String, target: &str) -> Result<u32> {
        let output = self.run_script(script).await?;
        let text = output.stdout.trim();
        if text.is_empty() {
            return Err(Error::AdapterNotFound(target.to_string()));
        }
        text.parse::<u32>()
            .map_err(|_| Error::Management(format!("unexpected return value: {}", text)))
    }
}

#[async_trait]
impl ManagementApi for CimShell {
    async fn physical_adapters(&self) -> Result<Vec<RawAdapter>> {
        let script = format!(
            "ConvertTo-Json -Compress -InputObject @(Get-CimInstance -ClassName Win32_NetworkAdapter \
             -Filter 'PhysicalAdapter = True' | Select-Object {})",
            ADAPTER_FIELDS
        );
        self.query(script)
            .await
            .map_err(|e| Error::Enumeration(e.to_string()))
    }

    async fn adapter(&self, device_id: &str) -> Result<Option<RawAdapter>> {
        let script = format!(
            "ConvertTo-Json -Compress -InputObject @(Get-CimInstance -ClassName Win32_NetworkAdapter \
             -Filter {} | Select-Object {})",
            ps_quote(&format!("DeviceID = '{}'", wql_escape(device_id))),
            ADAPTER_FIELDS
        );
        let adapters: Vec<RawAdapter> = self.query(script).await?;
        Ok(adapters.into_iter().next())
    }

    async fn configuration(&self, index: u32) -> Result<Option<RawConfiguration>> {
        let script = format!(
            "ConvertTo-Json -Compress -InputObject @(Get-CimInstance -ClassName Win32_NetworkAdapterConfiguration \
             -Filter 'Index = {}' | Select-Object Index, DHCPEnabled, IPAddress, IPSubnet, DefaultIPGateway, DNSServerSearchOrder)",
            index
        );
        let configs: Vec<RawConfiguration> = self.query(script).await?;
        Ok(configs.into_iter().next())
    }

    async fn interface_statistics(&self) -> Result<Vec<InterfaceStatistics>> {
        let script = "ConvertTo-Json -Compress -InputObject @(Get-NetAdapterStatistics \
                      | Select-Object Name, InterfaceDescription, ReceivedBytes, SentBytes)"
            .to_string();
        self.query(script).await
    }

    async fn set_adapter_state(
        &self,
        namespace: AdapterNamespace,
        device_id: &str,
        enable: bool,
    ) -> Result<u32> {
        let method = if enable { "Enable" } else { "Disable" };
        let script = format!(
            "$a = Get-CimInstance -Namespace {} -ClassName {} -Filter {} | Select-Object -First 1; \
             if ($a) {{ (Invoke-CimMethod -InputObject $a -MethodName {}).ReturnValue }}",
            namespace.namespace(),
            namespace.class(),
            ps_quote(&format!("DeviceID = '{}'", wql_escape(device_id))),
            method
        );
        debug!("{} {} via {}", method, device_id, namespace.class());
        self.invoke(script, device_id).await
    }

    async fn invoke_configuration(&self, index: u32, call: &ConfigurationCall) -> Result<u32> {
        let arguments = call
            .arguments()
            .map(|args| format!(" -Arguments {}", args))
            .unwrap_or_default();
        let script = format!(
            "$c = Get-CimInstance -ClassName Win32_NetworkAdapterConfiguration -Filter 'Index = {}' \
             | Select-Object -First 1; \
             if ($c) {{ (Invoke-CimMethod -InputObject $c -MethodName {}{}).ReturnValue }}",
            index,
            call.method_name(),
            arguments
        );
        self.invoke(script, &format!("configuration index {}", index)).await
    }
}

const ADAPTER_FIELDS: &str =
    "DeviceID, Index, Name, Description, NetConnectionID, MACAddress, AdapterType, Speed, NetConnectionStatus";

/// Quote a value as a PowerShell single-quoted string.
pub fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Escape a value for a WQL string literal.
pub fn wql_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Parse JSON that may be an array, a single object, or empty.
pub fn parse_json_list<T: serde::de::DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    let text = text.trim();
    if text.is_empty() || text == "null" {
        return Ok(Vec::new());
    }
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| Error::Management(format!("invalid JSON from management query: {}", e)))?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Null => Vec::new(),
        other => vec![other],
    };
    let mut parsed = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value(item) {
            Ok(entry) => parsed.push(entry),
            Err(e) => warn!("Skipping malformed management object: {}", e),
        }
    }
    Ok(parsed)
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

/// Accept `null` for fields that have a natural default.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept `null`, a single string, or an array of strings.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<Option<String>>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v.into_iter().flatten().collect(),
    })
}
