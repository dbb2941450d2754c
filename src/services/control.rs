// NA Manager - Adapter Control Service
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Enable/disable, IP configuration, reset and renew for physical adapters.
//!
//! Enable and disable walk an ordered list of [`ToggleStrategy`] objects and
//! stop at the first one that reports success:
//!
//! 1. Management object method (`Win32_NetworkAdapter`, then `MSFT_NetAdapter`
//!    on access denied, then the configuration object on a management error)
//! 2. `netsh interface set interface`
//! 3. `Enable-NetAdapter` / `Disable-NetAdapter`
//! 4. `devcon`, when installed
//!
//! Every mutating operation holds a per-device async lock, so operations on
//! one adapter run one at a time while different adapters proceed in
//! parallel. Failures are reported as `false` (or a failed [`ToggleReport`])
//! and as an [`OperationEvent`]; they never surface as errors to the caller.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::cim_client::{
    ps_quote, AdapterNamespace, ConfigurationCall, ManagementApi, RawAdapter, RETURN_ACCESS_DENIED,
    RETURN_SUCCESS,
};
use crate::command::{CommandRunner, CommandSpec};
use crate::models::validation::{validate_ipv4, validate_optional_ipv4, validate_subnet_mask};
use crate::models::{AppConfig, AttemptRecord, Error, Result, StepStatus, ToggleReport};
use crate::services::diagnostics::{EventSink, OperationEvent};
use crate::storage::mutex_lock;

/// Reason attached to a failed toggle when elevation was the problem.
pub const ACCESS_DENIED_REASON: &str = "Access denied - run as Administrator";

/// Gateway metric used for static configurations.
const GATEWAY_METRIC: u16 = 1;

/// One way of enabling or disabling an adapter.
#[async_trait]
pub trait ToggleStrategy: Send + Sync {
    /// Short name for logs and attempt records.
    fn name(&self) -> &'static str;

    /// Whether the strategy can run on this machine at all.
    fn is_available(&self) -> bool {
        true
    }

    /// `Ok(true)` when the adapter was toggled, `Ok(false)` when the method
    /// ran and declined, `Err` when it could not complete.
    async fn toggle(&self, device_id: &str, enable: bool) -> Result<bool>;
}

fn operation_name(enable: bool) -> &'static str {
    if enable {
        "EnableAdapter"
    } else {
        "DisableAdapter"
    }
}

fn action_word(enable: bool) -> &'static str {
    if enable {
        "enable"
    } else {
        "disable"
    }
}

/// Whether command output reports missing rights.
pub(crate) fn mentions_access_denied(text: &str) -> bool {
    let text = text.to_lowercase();
    text.contains("access is denied") || text.contains("access denied") || text.contains("requires elevation")
}

async fn find_adapter(api: &dyn ManagementApi, device_id: &str) -> Result<RawAdapter> {
    api.adapter(device_id)
        .await?
        .ok_or_else(|| Error::AdapterNotFound(device_id.to_string()))
}

/// Resolve the connection name netsh and the NetAdapter cmdlets understand.
async fn resolve_friendly_name(api: &dyn ManagementApi, device_id: &str) -> Result<String> {
    let adapter = find_adapter(api, device_id).await?;
    let name = adapter.friendly_name().to_string();
    if name.is_empty() {
        return Err(Error::AdapterNotFound(format!("{} has no name", device_id)));
    }
    Ok(name)
}

// ============================================================================
// Strategies
// ============================================================================

/// `Enable`/`Disable` on the management adapter object.
pub struct WmiToggle {
    api: Arc<dyn ManagementApi>,
}

impl WmiToggle {
    pub fn new(api: Arc<dyn ManagementApi>) -> Self {
        Self { api }
    }

    /// Enable by turning DHCP on, disable by releasing the lease.
    async fn configuration_fallback(&self, device_id: &str, enable: bool) -> Result<bool> {
        let adapter = find_adapter(self.api.as_ref(), device_id).await?;
        let call = if enable {
            ConfigurationCall::EnableDhcp
        } else {
            ConfigurationCall::ReleaseDhcpLease
        };
        let code = self.api.invoke_configuration(adapter.index, &call).await?;
        debug!("{} returned {} for {}", call.method_name(), code, device_id);
        Ok(code == RETURN_SUCCESS)
    }
}

#[async_trait]
impl ToggleStrategy for WmiToggle {
    fn name(&self) -> &'static str {
        "management"
    }

    async fn toggle(&self, device_id: &str, enable: bool) -> Result<bool> {
        match self
            .api
            .set_adapter_state(AdapterNamespace::Cimv2, device_id, enable)
            .await
        {
            Ok(RETURN_SUCCESS) => Ok(true),
            Ok(RETURN_ACCESS_DENIED) => {
                warn!("Access denied on Win32_NetworkAdapter for {}, trying MSFT_NetAdapter", device_id);
                match self
                    .api
                    .set_adapter_state(AdapterNamespace::StandardCimv2, device_id, enable)
                    .await
                {
                    Ok(RETURN_SUCCESS) => Ok(true),
                    Ok(code) => Err(Error::control(
                        operation_name(enable),
                        format!("access denied (return code 5, alternate returned {})", code),
                    )),
                    Err(e) => Err(Error::control(
                        operation_name(enable),
                        format!("access denied (return code 5, alternate failed: {})", e),
                    )),
                }
            }
            Ok(code) => {
                debug!("{} returned {} for {}", operation_name(enable), code, device_id);
                Ok(false)
            }
            Err(e @ Error::AdapterNotFound(_)) => Err(e),
            Err(e) => {
                warn!("Management error for {}: {}; trying configuration approach", device_id, e);
                self.configuration_fallback(device_id, enable).await
            }
        }
    }
}

/// `netsh interface set interface "<name>" enable|disable`.
pub struct NetshToggle {
    api: Arc<dyn ManagementApi>,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl NetshToggle {
    pub fn new(api: Arc<dyn ManagementApi>, runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { api, runner, timeout }
    }
}

#[async_trait]
impl ToggleStrategy for NetshToggle {
    fn name(&self) -> &'static str {
        "netsh"
    }

    async fn toggle(&self, device_id: &str, enable: bool) -> Result<bool> {
        let name = resolve_friendly_name(self.api.as_ref(), device_id).await?;
        let output = self
            .runner
            .run(
                CommandSpec::netsh(["interface", "set", "interface"])
                    .arg(name)
                    .arg(action_word(enable))
                    .timeout(self.timeout),
            )
            .await?;
        debug!("netsh output: {} {}", output.stdout.trim(), output.stderr.trim());
        if output.success() {
            return Ok(true);
        }
        // netsh reports errors on stdout
        let text = format!("{} {}", output.stdout, output.stderr);
        if mentions_access_denied(&text) {
            return Err(Error::control(operation_name(enable), "netsh: access denied"));
        }
        Ok(false)
    }
}

/// `Enable-NetAdapter` / `Disable-NetAdapter`. Any stderr output is a failure.
pub struct PowerShellToggle {
    api: Arc<dyn ManagementApi>,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl PowerShellToggle {
    pub fn new(api: Arc<dyn ManagementApi>, runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { api, runner, timeout }
    }
}

#[async_trait]
impl ToggleStrategy for PowerShellToggle {
    fn name(&self) -> &'static str {
        "powershell"
    }

    async fn toggle(&self, device_id: &str, enable: bool) -> Result<bool> {
        let name = resolve_friendly_name(self.api.as_ref(), device_id).await?;
        let cmdlet = if enable { "Enable-NetAdapter" } else { "Disable-NetAdapter" };
        let script = format!("{} -Name {} -Confirm:$false", cmdlet, ps_quote(&name));
        let output = self
            .runner
            .run(CommandSpec::powershell(script).timeout(self.timeout))
            .await?;
        if output.clean_success() {
            return Ok(true);
        }
        if mentions_access_denied(&output.stderr) {
            return Err(Error::control(operation_name(enable), "PowerShell: access denied"));
        }
        debug!("{} failed: {}", cmdlet, output.stderr.trim());
        Ok(false)
    }
}

/// `devcon enable|disable "@<device-id>"`, only when devcon is installed.
pub struct DevconToggle {
    runner: Arc<dyn CommandRunner>,
    path: PathBuf,
    timeout: Duration,
}

impl DevconToggle {
    pub fn new(runner: Arc<dyn CommandRunner>, path: PathBuf, timeout: Duration) -> Self {
        Self { runner, path, timeout }
    }
}

#[async_trait]
impl ToggleStrategy for DevconToggle {
    fn name(&self) -> &'static str {
        "devcon"
    }

    fn is_available(&self) -> bool {
        self.runner.program_exists(&self.path)
    }

    async fn toggle(&self, device_id: &str, enable: bool) -> Result<bool> {
        let output = self
            .runner
            .run(
                CommandSpec::new(self.path.to_string_lossy())
                    .arg(action_word(enable))
                    .arg(format!("@{}", device_id))
                    .timeout(self.timeout),
            )
            .await?;
        debug!("devcon output: {}", output.stdout.trim());
        Ok(output.success())
    }
}

// ============================================================================
// Control service
// ============================================================================

/// Adapter control operations.
pub struct AdapterControl {
    api: Arc<dyn ManagementApi>,
    runner: Arc<dyn CommandRunner>,
    sink: Arc<dyn EventSink>,
    strategies: Vec<Arc<dyn ToggleStrategy>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    reset_delay: Duration,
    command_timeout: Duration,
}

impl AdapterControl {
    /// Create the service with the standard four-step chain.
    pub fn new(
        api: Arc<dyn ManagementApi>,
        runner: Arc<dyn CommandRunner>,
        sink: Arc<dyn EventSink>,
        config: &AppConfig,
    ) -> Self {
        let strategies = Self::default_strategies(
            api.clone(),
            runner.clone(),
            config.devcon_path(),
            config.command_timeout(),
        );
        Self {
            api,
            runner,
            sink,
            strategies,
            locks: Mutex::new(HashMap::new()),
            reset_delay: config.reset_delay(),
            command_timeout: config.command_timeout(),
        }
    }

    /// The standard chain, in order.
    pub fn default_strategies(
        api: Arc<dyn ManagementApi>,
        runner: Arc<dyn CommandRunner>,
        devcon_path: PathBuf,
        timeout: Duration,
    ) -> Vec<Arc<dyn ToggleStrategy>> {
        vec![
            Arc::new(WmiToggle::new(api.clone())),
            Arc::new(NetshToggle::new(api.clone(), runner.clone(), timeout)),
            Arc::new(PowerShellToggle::new(api, runner.clone(), timeout)),
            Arc::new(DevconToggle::new(runner, devcon_path, timeout)),
        ]
    }

    /// Replace the fallback chain.
    pub fn with_strategies(mut self, strategies: Vec<Arc<dyn ToggleStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_reset_delay(mut self, delay: Duration) -> Self {
        self.reset_delay = delay;
        self
    }

    /// The sink operation events go to.
    pub fn sink(&self) -> Arc<dyn EventSink> {
        self.sink.clone()
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    async fn lock_key(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = mutex_lock(&self.locks, "device locks");
            // An entry only the map references is neither held nor awaited
            locks.retain(|k, l| k == key || Arc::strong_count(l) > 1);
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    // ------------------------------------------------------------------------
    // Enable / disable
    // ------------------------------------------------------------------------

    /// Enable or disable an adapter. `false` when every method failed.
    pub async fn set_adapter_enabled(&self, device_id: &str, enable: bool) -> bool {
        self.toggle_adapter(device_id, enable).await.succeeded
    }

    pub async fn enable_adapter(&self, device_id: &str) -> bool {
        self.set_adapter_enabled(device_id, true).await
    }

    pub async fn disable_adapter(&self, device_id: &str) -> bool {
        self.set_adapter_enabled(device_id, false).await
    }

    /// Enable or disable an adapter and return the full attempt log.
    pub async fn toggle_adapter(&self, device_id: &str, enable: bool) -> ToggleReport {
        let _guard = self.lock_key(device_id).await;
        self.run_chain(device_id, enable).await
    }

    /// Walk the chain. The caller holds the device lock.
    async fn run_chain(&self, device_id: &str, enable: bool) -> ToggleReport {
        let started = Instant::now();
        let operation = operation_name(enable);
        let total = self.strategies.len();
        let mut report = ToggleReport::new(device_id, enable);
        let mut access_denied = false;

        for (i, strategy) in self.strategies.iter().enumerate() {
            let ordinal = i + 1;
            if !strategy.is_available() {
                debug!("{}: method {} of {} ({}) not available", operation, ordinal, total, strategy.name());
                report.attempts.push(AttemptRecord {
                    ordinal,
                    method: strategy.name().to_string(),
                    status: StepStatus::Skipped,
                    detail: Some(format!("{} not available", strategy.name())),
                    duration_ms: 0,
                });
                continue;
            }

            info!("{}: attempting method {} of {} ({}) for {}", operation, ordinal, total, strategy.name(), device_id);
            let attempt_started = Instant::now();
            let (status, detail) = match strategy.toggle(device_id, enable).await {
                Ok(true) => (StepStatus::Success, None),
                Ok(false) => (StepStatus::Failed, None),
                Err(e) => {
                    warn!("Method {} ({}) failed: {}", ordinal, strategy.name(), e);
                    if e.is_access_denied() {
                        access_denied = true;
                    }
                    (StepStatus::Error, Some(e.to_string()))
                }
            };
            report.attempts.push(AttemptRecord {
                ordinal,
                method: strategy.name().to_string(),
                status,
                detail,
                duration_ms: attempt_started.elapsed().as_millis() as u64,
            });

            if status.is_success() {
                report.succeeded = true;
                break;
            }
        }

        report.total_duration_ms = started.elapsed().as_millis() as u64;
        if report.succeeded {
            let method = report.winning_method().unwrap_or_default().to_string();
            info!("Adapter {} {}d via {}", device_id, action_word(enable), method);
            self.sink.record(
                OperationEvent::succeeded(operation, device_id, started.elapsed())
                    .with_detail(format!("via {}", method)),
            );
        } else {
            let reason = if access_denied {
                ACCESS_DENIED_REASON.to_string()
            } else {
                format!("Failed to {} adapter: all {} methods failed", action_word(enable), total)
            };
            warn!("{} {}: {}", operation, device_id, reason);
            self.sink.record(OperationEvent::failed(operation, device_id, started.elapsed(), &reason));
            report.reason = Some(reason);
        }
        report
    }

    // ------------------------------------------------------------------------
    // IP configuration
    // ------------------------------------------------------------------------

    /// Apply a static IPv4 configuration. Blank gateway or DNS fields are skipped.
    pub async fn set_static_ip(
        &self,
        device_id: &str,
        ip_address: &str,
        subnet_mask: &str,
        gateway: &str,
        preferred_dns: &str,
        alternate_dns: &str,
    ) -> bool {
        let started = Instant::now();
        let _guard = self.lock_key(device_id).await;
        let result = self
            .configure_static(device_id, ip_address, subnet_mask, gateway, preferred_dns, alternate_dns)
            .await;
        self.finish("SetStaticIP", device_id, started, result)
    }

    async fn configure_static(
        &self,
        device_id: &str,
        ip_address: &str,
        subnet_mask: &str,
        gateway: &str,
        preferred_dns: &str,
        alternate_dns: &str,
    ) -> Result<()> {
        let ip = validate_ipv4(ip_address)?;
        let mask = validate_subnet_mask(subnet_mask)?;
        let gateway = validate_optional_ipv4(gateway)?;
        let preferred = validate_optional_ipv4(preferred_dns)?;
        let alternate = validate_optional_ipv4(alternate_dns)?;

        let adapter = find_adapter(self.api.as_ref(), device_id).await?;
        info!("Setting static IP {}/{} on {} (index {})", ip, mask, device_id, adapter.index);

        self.invoke(
            adapter.index,
            ConfigurationCall::EnableStatic {
                ip_address: ip.to_string(),
                subnet_mask: mask.to_string(),
            },
        )
        .await?;

        if let Some(gateway) = gateway {
            self.invoke(
                adapter.index,
                ConfigurationCall::SetGateways {
                    gateway: gateway.to_string(),
                    metric: GATEWAY_METRIC,
                },
            )
            .await?;
        }

        if let Some(preferred) = preferred {
            let mut servers = vec![preferred.to_string()];
            servers.extend(alternate.map(|a| a.to_string()));
            self.invoke(adapter.index, ConfigurationCall::SetDnsServers(servers))
                .await?;
        }
        Ok(())
    }

    /// Switch an adapter to DHCP for both address and DNS.
    pub async fn set_dhcp(&self, device_id: &str) -> bool {
        let started = Instant::now();
        let _guard = self.lock_key(device_id).await;
        let result = self.configure_dhcp(device_id).await;
        self.finish("EnableDHCP", device_id, started, result)
    }

    async fn configure_dhcp(&self, device_id: &str) -> Result<()> {
        let adapter = find_adapter(self.api.as_ref(), device_id).await?;
        info!("Enabling DHCP on {} (index {})", device_id, adapter.index);
        self.invoke(adapter.index, ConfigurationCall::EnableDhcp).await?;
        self.invoke(adapter.index, ConfigurationCall::SetDnsServers(Vec::new()))
            .await
    }

    /// Invoke one configuration method; any non-zero return fails the whole call.
    async fn invoke(&self, index: u32, call: ConfigurationCall) -> Result<()> {
        let method = call.method_name();
        let code = self.api.invoke_configuration(index, &call).await?;
        debug!("{} returned {}", method, code);
        match code {
            RETURN_SUCCESS => Ok(()),
            RETURN_ACCESS_DENIED => Err(Error::control(method, "access denied (return code 5)")),
            other => Err(Error::control(method, format!("return code {}", other))),
        }
    }

    // ------------------------------------------------------------------------
    // Reset / renew / flush
    // ------------------------------------------------------------------------

    /// Disable, wait, enable. The enable step only runs if disable succeeded.
    pub async fn reset_adapter(&self, device_id: &str) -> bool {
        let started = Instant::now();
        let _guard = self.lock_key(device_id).await;

        let disabled = self.run_chain(device_id, false).await;
        if !disabled.succeeded {
            let reason = disabled.reason.unwrap_or_else(|| "disable failed".to_string());
            return self.finish("ResetAdapter", device_id, started, Err(Error::control("ResetAdapter", reason)));
        }

        tokio::time::sleep(self.reset_delay).await;

        let enabled = self.run_chain(device_id, true).await;
        let result = if enabled.succeeded {
            Ok(())
        } else {
            Err(Error::control(
                "ResetAdapter",
                enabled.reason.unwrap_or_else(|| "enable failed".to_string()),
            ))
        };
        self.finish("ResetAdapter", device_id, started, result)
    }

    /// `netsh interface ip set address "<name>" dhcp`.
    ///
    /// A name that matches a physical adapter takes that adapter's device
    /// lock. Other names (virtual interfaces) are serialized by name only.
    pub async fn renew_ip(&self, adapter_name: &str) -> bool {
        let started = Instant::now();
        let key = self.lock_key_for_name(adapter_name).await;
        let _guard = self.lock_key(&key).await;
        let result = self
            .run_netsh(["interface", "ip", "set", "address", adapter_name, "dhcp"])
            .await;
        self.finish("RenewIP", adapter_name, started, result)
    }

    async fn lock_key_for_name(&self, adapter_name: &str) -> String {
        match self.api.physical_adapters().await {
            Ok(adapters) => adapters
                .iter()
                .find(|a| a.friendly_name().eq_ignore_ascii_case(adapter_name))
                .map(|a| a.device_id.clone())
                .unwrap_or_else(|| format!("name:{}", adapter_name)),
            Err(e) => {
                debug!("Cannot resolve {} to a device: {}", adapter_name, e);
                format!("name:{}", adapter_name)
            }
        }
    }

    /// Resolve the adapter's connection name, then renew.
    pub async fn renew_ip_for_device(&self, device_id: &str) -> bool {
        let started = Instant::now();
        let _guard = self.lock_key(device_id).await;
        let result = match resolve_friendly_name(self.api.as_ref(), device_id).await {
            Ok(name) => {
                self.run_netsh(["interface", "ip", "set", "address", name.as_str(), "dhcp"])
                    .await
            }
            Err(e) => Err(e),
        };
        self.finish("RenewIP", device_id, started, result)
    }

    /// `netsh interface ip delete dnscache`.
    pub async fn flush_dns(&self) -> bool {
        let started = Instant::now();
        let result = self.run_netsh(["interface", "ip", "delete", "dnscache"]).await;
        self.finish("FlushDNS", "dns cache", started, result)
    }

    async fn run_netsh<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let spec = CommandSpec::netsh(args).timeout(self.command_timeout);
        let program = spec.display();
        let output = self.runner.run(spec).await?;
        if output.success() {
            Ok(())
        } else {
            let text = format!("{} {}", output.stdout.trim(), output.stderr.trim());
            Err(Error::command_failed(
                program,
                format!("exit {:?}: {}", output.exit_code, text.trim()),
            ))
        }
    }

    /// Log, emit the event, and collapse the result to a bool.
    fn finish(&self, operation: &str, target: &str, started: Instant, result: Result<()>) -> bool {
        match result {
            Ok(()) => {
                info!("{} on {} succeeded", operation, target);
                self.sink
                    .record(OperationEvent::succeeded(operation, target, started.elapsed()));
                true
            }
            Err(e) => {
                warn!("{} on {} failed: {}", operation, target, e);
                self.sink
                    .record(OperationEvent::failed(operation, target, started.elapsed(), e.to_string()));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::ScriptedRunner;
    use crate::command::CommandOutput;
    use crate::network_utils::testing::FakeManagement;
    use crate::network_utils::AdapterEnumerator;
    use crate::services::diagnostics::testing::CollectingSink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Outcome {
        Succeed,
        Decline,
        Fail(&'static str),
    }

    struct FakeStrategy {
        name: &'static str,
        on_enable: Outcome,
        on_disable: Outcome,
        available: bool,
        delay: Duration,
        calls: Mutex<Vec<(String, bool)>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeStrategy {
        fn base(name: &'static str, on_enable: Outcome, on_disable: Outcome) -> Self {
            Self {
                name,
                on_enable,
                on_disable,
                available: true,
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn new(name: &'static str, outcome: Outcome) -> Arc<Self> {
            Arc::new(Self::base(name, outcome, outcome))
        }

        fn split(name: &'static str, on_enable: Outcome, on_disable: Outcome) -> Arc<Self> {
            Arc::new(Self::base(name, on_enable, on_disable))
        }

        fn slow(name: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                ..Self::base(name, Outcome::Succeed, Outcome::Succeed)
            })
        }

        fn unavailable(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                available: false,
                ..Self::base(name, Outcome::Succeed, Outcome::Succeed)
            })
        }

        fn calls(&self) -> Vec<(String, bool)> {
            self.calls.lock().expect("calls").clone()
        }
    }

    #[async_trait]
    impl ToggleStrategy for FakeStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn toggle(&self, device_id: &str, enable: bool) -> Result<bool> {
            self.calls.lock().expect("calls").push((device_id.to_string(), enable));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            match if enable { self.on_enable } else { self.on_disable } {
                Outcome::Succeed => Ok(true),
                Outcome::Decline => Ok(false),
                Outcome::Fail(msg) => Err(Error::Management(msg.to_string())),
            }
        }
    }

    struct Harness {
        api: Arc<FakeManagement>,
        runner: Arc<ScriptedRunner>,
        sink: Arc<CollectingSink>,
        control: AdapterControl,
    }

    fn harness(api: FakeManagement) -> Harness {
        let api = Arc::new(api);
        let runner = Arc::new(ScriptedRunner::new());
        let sink = Arc::new(CollectingSink::new());
        let control = AdapterControl::new(api.clone(), runner.clone(), sink.clone(), &AppConfig::default());
        Harness { api, runner, sink, control }
    }

    fn with_fakes(strategies: &[Arc<FakeStrategy>]) -> Harness {
        let mut h = harness(FakeManagement::new().with_adapter("1", 1, "Ethernet"));
        let chain = strategies
            .iter()
            .map(|s| s.clone() as Arc<dyn ToggleStrategy>)
            .collect();
        h.control = h.control.with_strategies(chain);
        h
    }

    #[test]
    fn test_default_chain_order() {
        let h = harness(FakeManagement::new());
        assert_eq!(h.control.strategy_names(), vec!["management", "netsh", "powershell", "devcon"]);
    }

    #[tokio::test]
    async fn test_chain_stops_at_first_success() {
        let third = FakeStrategy::new("third", Outcome::Succeed);
        let fourth = FakeStrategy::new("fourth", Outcome::Succeed);
        let h = with_fakes(&[
            FakeStrategy::new("first", Outcome::Decline),
            FakeStrategy::new("second", Outcome::Fail("boom")),
            third.clone(),
            fourth.clone(),
        ]);

        let report = h.control.toggle_adapter("1", false).await;
        assert!(report.succeeded);
        assert_eq!(report.attempts.len(), 3);
        assert_eq!(report.attempts[1].status, StepStatus::Error);
        assert_eq!(report.winning_method(), Some("third"));
        assert_eq!(third.calls().len(), 1);
        assert!(fourth.calls().is_empty());
        assert_eq!(h.sink.operations(), vec!["DisableAdapter"]);
    }

    #[tokio::test]
    async fn test_all_methods_fail_returns_false() {
        let h = with_fakes(&[
            FakeStrategy::new("a", Outcome::Decline),
            FakeStrategy::new("b", Outcome::Fail("rpc unavailable")),
            FakeStrategy::new("c", Outcome::Decline),
        ]);
        assert!(!h.control.set_adapter_enabled("1", true).await);

        let report = h.control.toggle_adapter("1", true).await;
        assert_eq!(report.attempts.len(), 3);
        assert!(report.reason.as_deref().unwrap_or_default().contains("all 3 methods failed"));
        let events = h.sink.events();
        assert!(events.iter().all(|e| !e.success));
    }

    #[tokio::test]
    async fn test_access_denied_reason() {
        let h = with_fakes(&[
            FakeStrategy::new("a", Outcome::Fail("Access is denied.")),
            FakeStrategy::new("b", Outcome::Decline),
        ]);
        let report = h.control.toggle_adapter("1", false).await;
        assert!(!report.succeeded);
        assert_eq!(report.reason.as_deref(), Some(ACCESS_DENIED_REASON));
    }

    #[tokio::test]
    async fn test_unavailable_strategy_is_skipped() {
        let devcon = FakeStrategy::unavailable("devcon");
        let h = with_fakes(&[FakeStrategy::new("a", Outcome::Decline), devcon.clone()]);
        let report = h.control.toggle_adapter("1", true).await;
        assert!(!report.succeeded);
        assert_eq!(report.attempts[1].status, StepStatus::Skipped);
        assert!(devcon.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reset_skips_enable_when_disable_fails() {
        let strategy = FakeStrategy::split("only", Outcome::Succeed, Outcome::Decline);
        let h = with_fakes(&[strategy.clone()]);
        assert!(!h.control.reset_adapter("1").await);
        assert_eq!(strategy.calls(), vec![("1".to_string(), false)]);
        assert_eq!(h.sink.operations().last().map(String::as_str), Some("ResetAdapter"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_waits_between_steps() {
        let strategy = FakeStrategy::new("only", Outcome::Succeed);
        let h = with_fakes(&[strategy.clone()]);
        let started = tokio::time::Instant::now();
        assert!(h.control.reset_adapter("1").await);
        assert!(started.elapsed() >= Duration::from_millis(2000));
        assert_eq!(
            strategy.calls(),
            vec![("1".to_string(), false), ("1".to_string(), true)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_delay_is_configurable() {
        let strategy = FakeStrategy::new("only", Outcome::Succeed);
        let mut h = with_fakes(&[strategy.clone()]);
        h.control = h.control.with_reset_delay(Duration::from_millis(500));
        let started = tokio::time::Instant::now();
        assert!(h.control.reset_adapter("1").await);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_device_operations_are_serialized() {
        let strategy = FakeStrategy::slow("slow", Duration::from_millis(100));
        let h = with_fakes(&[strategy.clone()]);
        let (a, b) = tokio::join!(
            h.control.set_adapter_enabled("1", false),
            h.control.set_adapter_enabled("1", true)
        );
        assert!(a && b);
        assert_eq!(strategy.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_devices_run_in_parallel() {
        let strategy = FakeStrategy::slow("slow", Duration::from_millis(100));
        let h = with_fakes(&[strategy.clone()]);
        let (a, b) = tokio::join!(
            h.control.set_adapter_enabled("1", false),
            h.control.set_adapter_enabled("2", false)
        );
        assert!(a && b);
        assert_eq!(strategy.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_enable_disable_through_management_layer() {
        let h = harness(FakeManagement::new().with_adapter("1", 1, "Ethernet"));
        let enumerator = AdapterEnumerator::new(h.api.clone());

        assert!(h.control.set_adapter_enabled("1", true).await);
        let adapter = enumerator.adapter("1").await.expect("query").expect("present");
        assert!(adapter.is_enabled);

        assert!(h.control.set_adapter_enabled("1", false).await);
        let adapter = enumerator.adapter("1").await.expect("query").expect("present");
        assert!(!adapter.is_enabled);
        assert!(adapter.connection_status.is_disconnected_family());
        assert!(h.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_wmi_access_denied_tries_alternate_namespace() {
        let h = harness(FakeManagement::new().with_adapter("1", 1, "Ethernet"));
        h.api.queue_state_code(Ok(RETURN_ACCESS_DENIED));
        h.api.queue_state_code(Ok(RETURN_SUCCESS));

        assert!(WmiToggle::new(h.api.clone()).toggle("1", false).await.expect("toggle"));
        let namespaces: Vec<_> = h.api.state_calls.lock().expect("calls").iter().map(|c| c.0).collect();
        assert_eq!(namespaces, vec![AdapterNamespace::Cimv2, AdapterNamespace::StandardCimv2]);
    }

    #[tokio::test]
    async fn test_wmi_error_uses_configuration_approach() {
        let h = harness(FakeManagement::new().with_adapter("1", 1, "Ethernet"));
        h.api.queue_state_code(Err(Error::Management("Invalid method".into())));

        assert!(WmiToggle::new(h.api.clone()).toggle("1", false).await.expect("toggle"));
        assert_eq!(h.api.config_methods(), vec!["ReleaseDHCPLease"]);
    }

    #[tokio::test]
    async fn test_netsh_strategy_uses_connection_name() {
        let h = harness(FakeManagement::new().with_adapter("1", 1, "Ethernet 2"));
        h.runner.on("interface set interface", Ok(CommandOutput::with_exit(0, "", "")));
        let netsh = NetshToggle::new(h.api.clone(), h.runner.clone(), Duration::from_secs(5));

        assert!(netsh.toggle("1", false).await.expect("netsh runs"));
        let call = &h.runner.calls()[0];
        assert_eq!(call.program, "netsh");
        assert_eq!(call.args, vec!["interface", "set", "interface", "Ethernet 2", "disable"]);
    }

    #[tokio::test]
    async fn test_netsh_elevation_error_is_access_denied() {
        let h = harness(FakeManagement::new().with_adapter("1", 1, "Ethernet"));
        h.runner.on(
            "interface set interface",
            Ok(CommandOutput::with_exit(1, "The requested operation requires elevation (Run as administrator).", "")),
        );
        let netsh = NetshToggle::new(h.api.clone(), h.runner.clone(), Duration::from_secs(5));
        let err = netsh.toggle("1", true).await.expect_err("elevation required");
        assert!(err.is_access_denied());
    }

    #[tokio::test]
    async fn test_powershell_requires_empty_stderr() {
        let h = harness(FakeManagement::new().with_adapter("1", 1, "Wi-Fi"));
        h.runner.on("Disable-NetAdapter", Ok(CommandOutput::with_exit(0, "", "WARNING: something")));
        h.runner.on("Disable-NetAdapter", Ok(CommandOutput::with_exit(0, "", "")));
        let ps = PowerShellToggle::new(h.api.clone(), h.runner.clone(), Duration::from_secs(5));

        assert!(!ps.toggle("1", false).await.expect("first run"));
        assert!(ps.toggle("1", false).await.expect("second run"));
        let script = h.runner.calls()[0].args.last().cloned().unwrap_or_default();
        assert_eq!(script, "Disable-NetAdapter -Name 'Wi-Fi' -Confirm:$false");
    }

    #[tokio::test]
    async fn test_devcon_only_when_installed() {
        let runner = Arc::new(ScriptedRunner::new());
        let path = PathBuf::from(r"C:\Windows\System32\devcon.exe");
        let devcon = DevconToggle::new(runner.clone(), path.clone(), Duration::from_secs(5));
        assert!(!devcon.is_available());

        runner.with_program(path);
        runner.on("devcon", Ok(CommandOutput::with_exit(0, "1 device(s) enabled.", "")));
        assert!(devcon.is_available());
        assert!(devcon.toggle("PCI\\VEN_8086", true).await.expect("devcon runs"));
        assert_eq!(runner.calls()[0].args, vec!["enable", "@PCI\\VEN_8086"]);
    }

    #[tokio::test]
    async fn test_static_ip_step_sequence() {
        let h = harness(FakeManagement::new().with_adapter("1", 1, "Ethernet"));
        assert!(
            h.control
                .set_static_ip("1", "10.0.0.5", "255.255.255.0", "10.0.0.1", "1.1.1.1", "8.8.8.8")
                .await
        );
        assert_eq!(
            h.api.config_methods(),
            vec!["EnableStatic", "SetGateways", "SetDNSServerSearchOrder"]
        );
        let calls = h.api.config_calls.lock().expect("calls").clone();
        assert_eq!(
            calls[1].1,
            ConfigurationCall::SetGateways { gateway: "10.0.0.1".into(), metric: 1 }
        );
        assert_eq!(
            calls[2].1,
            ConfigurationCall::SetDnsServers(vec!["1.1.1.1".into(), "8.8.8.8".into()])
        );
        assert_eq!(h.sink.operations(), vec!["SetStaticIP"]);
    }

    #[tokio::test]
    async fn test_static_ip_skips_blank_fields() {
        let h = harness(FakeManagement::new().with_adapter("1", 1, "Ethernet"));
        assert!(h.control.set_static_ip("1", "10.0.0.5", "255.255.255.0", "", " ", "").await);
        assert_eq!(h.api.config_methods(), vec!["EnableStatic"]);
    }

    #[tokio::test]
    async fn test_static_ip_nonzero_return_is_hard_failure() {
        let h = harness(FakeManagement::new().with_adapter("1", 1, "Ethernet"));
        h.api.queue_config_code(Ok(RETURN_SUCCESS));
        h.api.queue_config_code(Ok(67));
        assert!(
            !h.control
                .set_static_ip("1", "10.0.0.5", "255.255.255.0", "10.0.0.1", "1.1.1.1", "")
                .await
        );
        assert_eq!(h.api.config_methods(), vec!["EnableStatic", "SetGateways"]);
        let event = h.sink.events().pop().expect("event recorded");
        assert!(!event.success);
        assert!(event.detail.unwrap_or_default().contains("return code 67"));
    }

    #[tokio::test]
    async fn test_static_ip_invalid_input_makes_no_calls() {
        let h = harness(FakeManagement::new().with_adapter("1", 1, "Ethernet"));
        assert!(!h.control.set_static_ip("1", "10.0.0.300", "255.255.255.0", "", "", "").await);
        assert!(!h.control.set_static_ip("1", "10.0.0.5", "255.0.255.0", "", "", "").await);
        assert!(h.api.config_methods().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_device_fails() {
        let h = harness(FakeManagement::new());
        assert!(!h.control.set_dhcp("missing").await);
        assert!(!h.control.set_static_ip("missing", "10.0.0.5", "255.255.255.0", "", "", "").await);
    }

    #[tokio::test]
    async fn test_set_dhcp_then_poll_shows_dhcp() {
        let h = harness(FakeManagement::new().with_adapter("1", 1, "Ethernet"));
        assert!(h.control.set_static_ip("1", "10.0.0.5", "255.255.255.0", "", "1.1.1.1", "").await);
        let enumerator = AdapterEnumerator::new(h.api.clone());
        let before = enumerator.adapter("1").await.expect("query").expect("present");
        assert!(!before.is_dhcp_enabled);

        assert!(h.control.set_dhcp("1").await);
        let after = enumerator.adapter("1").await.expect("query").expect("present");
        assert!(after.is_dhcp_enabled);
        assert!(after.dns_servers.is_empty());
        assert_eq!(
            h.api.config_methods()[2..].to_vec(),
            vec!["EnableDHCP", "SetDNSServerSearchOrder"]
        );
    }

    #[tokio::test]
    async fn test_set_dhcp_failure() {
        let h = harness(FakeManagement::new().with_adapter("1", 1, "Ethernet"));
        h.api.queue_config_code(Ok(RETURN_ACCESS_DENIED));
        assert!(!h.control.set_dhcp("1").await);
        assert_eq!(h.api.config_methods(), vec!["EnableDHCP"]);
    }

    #[tokio::test]
    async fn test_renew_and_flush_use_netsh() {
        let h = harness(FakeManagement::new().with_adapter("1", 1, "Ethernet"));
        h.runner.on("set address", Ok(CommandOutput::with_exit(0, "", "")));
        h.runner.on("set address", Ok(CommandOutput::with_exit(1, "The filename is invalid.", "")));
        h.runner.on("dnscache", Ok(CommandOutput::with_exit(0, "Ok.", "")));

        assert!(h.control.renew_ip("Ethernet").await);
        assert!(!h.control.renew_ip_for_device("1").await);
        assert!(h.control.flush_dns().await);

        let calls = h.runner.calls();
        assert_eq!(calls[0].args, vec!["interface", "ip", "set", "address", "Ethernet", "dhcp"]);
        assert_eq!(calls[2].args, vec!["interface", "ip", "delete", "dnscache"]);
        assert_eq!(h.sink.operations(), vec!["RenewIP", "RenewIP", "FlushDNS"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_by_name_waits_for_device_lock() {
        let h = harness(FakeManagement::new().with_adapter("1", 1, "Ethernet"));
        h.runner.on("set address", Ok(CommandOutput::with_exit(0, "", "")));

        let guard = h.control.lock_key("1").await;
        let blocked = tokio::time::timeout(Duration::from_millis(100), h.control.renew_ip("ethernet")).await;
        assert!(blocked.is_err());
        assert!(h.runner.calls().is_empty());

        drop(guard);
        assert!(h.control.renew_ip("ethernet").await);
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let h = harness(FakeManagement::new().with_adapter("1", 1, "Ethernet"));
        for i in 0..20 {
            assert!(!h.control.renew_ip(&format!("Tunnel {}", i)).await);
        }
        assert!(h.control.set_dhcp("1").await);
        let held = h.control.lock_key("1").await;
        assert!(!h.control.renew_ip("Other").await);
        let locks = mutex_lock(&h.control.locks, "device locks");
        assert_eq!(locks.len(), 2);
        assert!(locks.contains_key("1"));
        drop(locks);
        drop(held);
    }

    #[tokio::test]
    async fn test_command_timeout_is_a_failure() {
        let h = harness(FakeManagement::new());
        h.runner.on(
            "dnscache",
            Err(Error::CommandTimeout {
                program: "netsh".into(),
                timeout: Duration::from_secs(5),
            }),
        );
        assert!(!h.control.flush_dns().await);
    }
}
