// NA Manager - Main Entry Point
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! # NA Manager
//!
//! Command-line front end for the adapter manager core.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use na_manager::cim_client::CimShell;
use na_manager::command::{CommandRunner, SystemCommandRunner};
use na_manager::models::validation::validate_profile_name;
use na_manager::models::{AdapterRecord, AppConfig, Error, NetworkProfile, Result, StaticIpRequest};
use na_manager::network_utils::AdapterEnumerator;
use na_manager::services::{
    AdapterControl, AdapterMonitor, DiagnosticMonitor, EventSink, PreferencesStore, ProfileStore,
    SnapshotDiff, TracingSink,
};
use na_manager::storage::AppPaths;
use na_manager::{APP_NAME, VERSION};

/// Print version information and exit.
fn print_version() {
    println!("{} {}", APP_NAME, VERSION);
    println!("Copyright (C) 2026 Christos A. Daggas");
    println!("License: MIT");
    println!();
    println!("Network adapter and IP profile manager for Windows.");
}

/// Print help information and exit.
fn print_help() {
    println!(
        "Usage: {} [OPTIONS] <COMMAND> [ARGS]",
        env::args().next().unwrap_or_else(|| "na-manager".to_string())
    );
    println!();
    println!("Adapters are addressed by device id, connection name or custom name.");
    println!();
    println!("Commands:");
    println!("  list [--all]                         List adapters (--all includes hidden ones)");
    println!("  enable <adapter>                     Enable an adapter");
    println!("  disable <adapter>                    Disable an adapter");
    println!("  reset <adapter>                      Disable, wait, and enable an adapter");
    println!("  dhcp <adapter>                       Switch an adapter to DHCP");
    println!("  static <adapter> <ip> <mask> [gateway] [dns1] [dns2]");
    println!("                                       Assign a static IPv4 configuration");
    println!("  renew <adapter>                      Release and renew the DHCP lease");
    println!("  flush-dns                            Flush the DNS resolver cache");
    println!("  rename <adapter> [name]              Set or clear a custom name");
    println!("  hide <adapter> | unhide <adapter>    Hide or show an adapter");
    println!("  clear <adapter>                      Remove all preferences for an adapter");
    println!("  profiles                             List saved profiles");
    println!("  profile-save <name> [description]    Save the current configuration");
    println!("  profile-apply <id>                   Apply a saved profile");
    println!("  profile-delete <id>                  Delete a saved profile");
    println!("  profile-export <id> <file>           Export a profile to a file");
    println!("  profile-import <file>                Import a profile from a file");
    println!("  watch                                Poll adapters and print changes");
    println!();
    println!("Options:");
    println!("  -h, --help       Show this help message and exit");
    println!("  -v, --version    Show version information and exit");
    println!("  -d, --debug      Enable debug logging");
    println!("  -r, --report     Write a diagnostic report after the command");
    println!();
    println!("Environment variables:");
    println!("  RUST_LOG         Set log level (trace, debug, info, warn, error)");
}

/// Initialize logging. RUST_LOG wins, then --debug, then the configured level.
fn init_logging(debug_mode: bool, config: &AppConfig) {
    let default_level = if debug_mode { "debug" } else { config.log_level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Everything a command needs.
struct Context {
    paths: AppPaths,
    config: AppConfig,
    enumerator: AdapterEnumerator,
    control: AdapterControl,
    preferences: Arc<PreferencesStore>,
    profiles: ProfileStore,
    diagnostics: Option<Arc<DiagnosticMonitor>>,
}

impl Context {
    fn build(paths: AppPaths, config: AppConfig) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::new());
        let api = Arc::new(CimShell::new(runner.clone()).with_timeout(config.command_timeout()));

        let diagnostics = config.diagnostics_enabled.then(|| {
            Arc::new(DiagnosticMonitor::start(
                paths.diagnostics_dir(),
                config.max_diagnostic_events,
            ))
        });
        let sink: Arc<dyn EventSink> = match &diagnostics {
            Some(monitor) => monitor.clone(),
            None => Arc::new(TracingSink),
        };

        Self {
            enumerator: AdapterEnumerator::new(api.clone()),
            control: AdapterControl::new(api, runner, sink, &config),
            preferences: Arc::new(PreferencesStore::open(paths.preferences_file())),
            profiles: ProfileStore::open(paths.profiles_file()),
            diagnostics,
            paths,
            config,
        }
    }

    /// Find an adapter by device id, connection name or custom name.
    async fn resolve(&self, key: &str) -> Result<AdapterRecord> {
        let adapters = self
            .enumerator
            .list_adapters_with_preferences(&self.preferences)
            .await?;
        adapters
            .into_iter()
            .find(|a| {
                a.device_id == key
                    || a.friendly_name().eq_ignore_ascii_case(key)
                    || (!a.custom_name.is_empty() && a.custom_name.eq_ignore_ascii_case(key))
            })
            .ok_or_else(|| Error::AdapterNotFound(key.to_string()))
    }
}

fn print_adapters<'a>(adapters: impl IntoIterator<Item = &'a AdapterRecord>) {
    println!(
        "{:<28} {:<22} {:<16} {:<5} {:>10}  {}",
        "NAME", "STATUS", "IP ADDRESS", "DHCP", "SPEED", "DEVICE ID"
    );
    for adapter in adapters {
        let mut name = adapter.display_name().to_string();
        if adapter.is_hidden {
            name.push_str(" (hidden)");
        }
        println!(
            "{:<28} {:<22} {:<16} {:<5} {:>10}  {}",
            name,
            adapter.connection_status.display_name(),
            if adapter.ip_address.is_empty() { "-" } else { adapter.ip_address.as_str() },
            if adapter.is_dhcp_enabled { "yes" } else { "no" },
            adapter.formatted_speed(),
            adapter.device_id
        );
    }
}

fn outcome(ok: bool, success: &str, failure: &str) -> Result<()> {
    if ok {
        println!("{}", success);
        Ok(())
    } else {
        Err(Error::Other(failure.to_string()))
    }
}

fn arg<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| Error::Configuration(format!("Missing argument: {}", what)))
}

fn opt_arg(args: &[String], index: usize) -> &str {
    args.get(index).map(String::as_str).unwrap_or("")
}

async fn run(ctx: &Context, command: &str, args: &[String]) -> Result<()> {
    match command {
        "list" => {
            let show_all = args.iter().any(|a| a == "--all");
            let adapters = ctx
                .enumerator
                .list_adapters_with_preferences(&ctx.preferences)
                .await?;
            print_adapters(adapters.iter().filter(|a| show_all || !a.is_hidden));
            Ok(())
        }
        "enable" | "disable" => {
            let adapter = ctx.resolve(arg(args, 0, "adapter")?).await?;
            let enable = command == "enable";
            let report = ctx.control.toggle_adapter(&adapter.device_id, enable).await;
            for attempt in &report.attempts {
                println!(
                    "  {}. {:<12} {:<8} {}",
                    attempt.ordinal,
                    attempt.method,
                    attempt.status.as_str(),
                    attempt.detail.as_deref().unwrap_or("")
                );
            }
            let verb = if enable { "enabled" } else { "disabled" };
            match report.winning_method() {
                Some(method) => {
                    println!("{} {} via {}", adapter.display_name(), verb, method);
                    Ok(())
                }
                None => Err(Error::control(
                    report.operation(),
                    report.reason.unwrap_or_else(|| "All methods failed".to_string()),
                )),
            }
        }
        "reset" => {
            let adapter = ctx.resolve(arg(args, 0, "adapter")?).await?;
            let ok = ctx.control.reset_adapter(&adapter.device_id).await;
            outcome(ok, "Adapter reset", "Adapter reset failed")
        }
        "dhcp" => {
            let adapter = ctx.resolve(arg(args, 0, "adapter")?).await?;
            let ok = ctx.control.set_dhcp(&adapter.device_id).await;
            outcome(ok, "DHCP enabled", "Failed to enable DHCP")
        }
        "static" => {
            let adapter = ctx.resolve(arg(args, 0, "adapter")?).await?;
            let request = StaticIpRequest::parse(
                arg(args, 1, "ip address")?,
                arg(args, 2, "subnet mask")?,
                opt_arg(args, 3),
                opt_arg(args, 4),
                opt_arg(args, 5),
            )?;
            let ok = ctx
                .control
                .set_static_ip(
                    &adapter.device_id,
                    &request.ip_address.to_string(),
                    &request.subnet_mask.to_string(),
                    &StaticIpRequest::text(request.gateway),
                    &StaticIpRequest::text(request.preferred_dns),
                    &StaticIpRequest::text(request.alternate_dns),
                )
                .await;
            outcome(ok, "Static IP configured", "Failed to configure static IP")
        }
        "renew" => {
            let adapter = ctx.resolve(arg(args, 0, "adapter")?).await?;
            let ok = ctx.control.renew_ip_for_device(&adapter.device_id).await;
            outcome(ok, "IP address renewed", "Failed to renew IP address")
        }
        "flush-dns" => {
            let ok = ctx.control.flush_dns().await;
            outcome(ok, "DNS cache flushed", "Failed to flush DNS cache")
        }
        "rename" => {
            let adapter = ctx.resolve(arg(args, 0, "adapter")?).await?;
            let name = args[1..].join(" ");
            ctx.preferences.set_custom_name(&adapter.device_id, &name)?;
            if name.trim().is_empty() {
                println!("Custom name cleared");
            } else {
                println!("Renamed to '{}'", name.trim());
            }
            Ok(())
        }
        "hide" | "unhide" => {
            let adapter = ctx.resolve(arg(args, 0, "adapter")?).await?;
            ctx.preferences
                .set_hidden(&adapter.device_id, command == "hide")?;
            println!("{} {}", adapter.display_name(), if command == "hide" { "hidden" } else { "visible" });
            Ok(())
        }
        "clear" => {
            let key = arg(args, 0, "adapter")?;
            // Preferences may outlive the adapter, so accept a raw device id too
            let device_id = match ctx.resolve(key).await {
                Ok(adapter) => adapter.device_id,
                Err(_) => key.to_string(),
            };
            if ctx.preferences.clear_preference(&device_id)? {
                println!("Preferences cleared");
            } else {
                println!("No preferences stored for {}", device_id);
            }
            Ok(())
        }
        "profiles" => {
            for profile in ctx.profiles.profiles() {
                println!(
                    "{}  {:<30} {} adapter(s), modified {}",
                    profile.id,
                    profile.name,
                    profile.adapter_configurations.len(),
                    profile.last_modified.format("%Y-%m-%d %H:%M")
                );
            }
            Ok(())
        }
        "profile-save" => {
            let name = match args.first() {
                Some(name) => validate_profile_name(name)?,
                None => NetworkProfile::default_name(),
            };
            let adapters = ctx
                .enumerator
                .list_adapters_with_preferences(&ctx.preferences)
                .await?;
            let mut profile = NetworkProfile::from_adapters(name, adapters.iter().filter(|a| !a.is_hidden));
            if args.len() > 1 {
                profile.description = args[1..].join(" ");
            }
            let id = profile.id.clone();
            outcome(
                ctx.profiles.save_profile(profile),
                &format!("Profile saved as {}", id),
                "Failed to save profile",
            )
        }
        "profile-apply" => {
            let report = ctx
                .profiles
                .apply_profile_report(arg(args, 0, "profile id")?, &ctx.control)
                .await?;
            for entry in &report.entries {
                println!(
                    "  {:<28} {:<7} {:<8} {} ms",
                    entry.adapter_name,
                    if entry.use_dhcp { "dhcp" } else { "static" },
                    entry.status.as_str(),
                    entry.duration_ms
                );
            }
            outcome(report.is_success(), &report.message, &report.message)
        }
        "profile-delete" => {
            let ok = ctx.profiles.delete_profile(arg(args, 0, "profile id")?);
            outcome(ok, "Profile deleted", "Failed to delete profile")
        }
        "profile-export" => {
            let id = arg(args, 0, "profile id")?;
            let path = PathBuf::from(arg(args, 1, "file")?);
            let ok = ctx.profiles.export_profile(id, &path);
            outcome(ok, &format!("Exported to {}", path.display()), "Failed to export profile")
        }
        "profile-import" => {
            let path = PathBuf::from(arg(args, 0, "file")?);
            match ctx.profiles.import_profile(&path) {
                Some(profile) => {
                    println!("Imported '{}' as {}", profile.name, profile.id);
                    Ok(())
                }
                None => Err(Error::Other("Failed to import profile".to_string())),
            }
        }
        "watch" => watch(ctx).await,
        other => Err(Error::Configuration(format!("Unknown command: {}", other))),
    }
}

async fn watch(ctx: &Context) -> Result<()> {
    let monitor = AdapterMonitor::spawn(
        ctx.enumerator.clone(),
        ctx.preferences.clone(),
        ctx.config.poll_interval(),
    );
    let mut rx = monitor.subscribe();
    let mut previous: Arc<Vec<AdapterRecord>> = Arc::new(Vec::new());
    println!("Watching adapters every {:?}, Ctrl+C to stop", monitor.interval());

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                if let Some(status) = &snapshot.status {
                    eprintln!("{}", status);
                    continue;
                }
                let diff = SnapshotDiff::between(&previous, &snapshot.adapters);
                if snapshot.sequence == 1 {
                    print_adapters(snapshot.visible());
                } else if !diff.is_empty() {
                    let changed_ids = diff.added.iter().chain(diff.changed.iter());
                    for id in changed_ids {
                        if let Some(adapter) = snapshot.adapters.iter().find(|a| &a.device_id == id) {
                            println!(
                                "[{}] {} is {} ({})",
                                snapshot.taken_at.format("%H:%M:%S"),
                                adapter.display_name(),
                                adapter.connection_status.display_name(),
                                if adapter.ip_address.is_empty() { "no address" } else { adapter.ip_address.as_str() }
                            );
                        }
                    }
                    for id in &diff.removed {
                        println!("[{}] {} removed", snapshot.taken_at.format("%H:%M:%S"), id);
                    }
                }
                previous = snapshot.adapters.clone();
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    monitor.stop().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let mut debug_mode = false;
    let mut write_report = false;
    let mut positional: Vec<String> = Vec::new();

    for arg in &args[1..] {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "-v" | "--version" => {
                print_version();
                return ExitCode::SUCCESS;
            }
            "-d" | "--debug" => {
                debug_mode = true;
            }
            "-r" | "--report" => {
                write_report = true;
            }
            "--all" => positional.push(arg.clone()),
            _ => {
                if arg.starts_with('-') {
                    eprintln!("Unknown option: {}", arg);
                    eprintln!("Try '--help' for more information.");
                    return ExitCode::FAILURE;
                }
                positional.push(arg.clone());
            }
        }
    }

    let Some((command, command_args)) = positional.split_first() else {
        print_help();
        return ExitCode::FAILURE;
    };

    let paths = AppPaths::new();
    let config = paths.load_settings();
    let paths = paths.with_config_overrides(&config);
    init_logging(debug_mode, &config);
    tracing::debug!("Starting {} v{}", APP_NAME, VERSION);

    let ctx = Context::build(paths, config);
    let result = run(&ctx, command, command_args).await;

    if let Some(diagnostics) = &ctx.diagnostics {
        diagnostics.flush().await;
        if write_report {
            match diagnostics.write_report(&ctx.paths.diagnostics_dir()) {
                Ok(path) => println!("Diagnostic report: {}", path.display()),
                Err(e) => eprintln!("Failed to write diagnostic report: {}", e),
            }
        }
    } else if write_report {
        eprintln!("Diagnostics are disabled in settings");
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(fix) = na_manager::services::diagnostics::suggest_fix(&e.to_string()) {
                eprintln!("Hint: {}", fix.suggestion);
            }
            ExitCode::FAILURE
        }
    }
}
