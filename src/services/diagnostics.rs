// NA Manager - Diagnostic Monitor
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Structured operation events and where they go.
//!
//! Control and profile operations report to an injected [`EventSink`].
//! Recording must never fail or stall the operation that reports, so the
//! [`DiagnosticMonitor`] hands events to a background writer over a bounded
//! channel and drops (and counts) whatever does not fit.

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::models::Result;
use crate::storage::{mutex_lock, write_json_atomic};

/// Default capacity of the writer channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Operations slower than this are listed in reports.
pub const SLOW_OPERATION_THRESHOLD: Duration = Duration::from_millis(1000);

/// Number of failures kept in a report.
const RECENT_FAILURES_IN_REPORT: usize = 10;

/// Severity of an operation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// One completed (or abandoned) operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationEvent {
    pub timestamp: DateTime<Local>,
    pub operation: String,
    /// Device id, adapter name or profile id the operation acted on.
    pub target: String,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub level: EventLevel,
}

impl OperationEvent {
    pub fn new(operation: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            operation: operation.into(),
            target: target.into(),
            success: true,
            duration_ms: 0,
            detail: None,
            level: EventLevel::Info,
        }
    }

    /// A successful operation at info level.
    pub fn succeeded(operation: impl Into<String>, target: impl Into<String>, duration: Duration) -> Self {
        Self::new(operation, target).with_duration(duration)
    }

    /// A failed operation at error level.
    pub fn failed(
        operation: impl Into<String>,
        target: impl Into<String>,
        duration: Duration,
        detail: impl Into<String>,
    ) -> Self {
        let mut event = Self::new(operation, target)
            .with_duration(duration)
            .with_detail(detail);
        event.success = false;
        event.level = EventLevel::Error;
        event
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_level(mut self, level: EventLevel) -> Self {
        self.level = level;
        self
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// One line of the daily log file.
    pub fn log_line(&self) -> String {
        let mut line = format!(
            "[{}] [{}] {} target={} success={} {}ms",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level.as_str(),
            self.operation,
            self.target,
            self.success,
            self.duration_ms
        );
        if let Some(detail) = &self.detail {
            line.push_str(" - ");
            line.push_str(detail);
        }
        line
    }
}

/// Destination for operation events.
///
/// Implementations must not block and must not panic.
pub trait EventSink: Send + Sync {
    fn record(&self, event: OperationEvent);
}

/// Writes each event as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: OperationEvent) {
        trace_event(&event);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: OperationEvent) {}
}

fn trace_event(event: &OperationEvent) {
    let detail = event.detail.as_deref().unwrap_or("");
    match event.level {
        EventLevel::Debug => debug!(
            operation = %event.operation, subject = %event.target, duration_ms = event.duration_ms,
            "{} {}", event.operation, detail
        ),
        EventLevel::Info => info!(
            operation = %event.operation, subject = %event.target, duration_ms = event.duration_ms,
            "{} completed {}", event.operation, detail
        ),
        EventLevel::Warning => warn!(
            operation = %event.operation, subject = %event.target, duration_ms = event.duration_ms,
            "{} {}", event.operation, detail
        ),
        EventLevel::Error => error!(
            operation = %event.operation, subject = %event.target, duration_ms = event.duration_ms,
            "{} failed: {}", event.operation, detail
        ),
    }
}

// ============================================================================
// Fix suggestions
// ============================================================================

/// How urgent a suggested fix is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixSeverity {
    Low,
    Medium,
    High,
}

/// A canned remedy for a recognized failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixSuggestion {
    pub error_type: String,
    pub suggestion: String,
    pub severity: FixSeverity,
}

struct FixPattern {
    error_type: &'static str,
    pattern: Regex,
    suggestion: &'static str,
    severity: FixSeverity,
}

impl FixPattern {
    fn new(error_type: &'static str, pattern: &str, suggestion: &'static str, severity: FixSeverity) -> Option<Self> {
        match Regex::new(pattern) {
            Ok(pattern) => Some(Self { error_type, pattern, suggestion, severity }),
            Err(e) => {
                error!("Invalid fix pattern for {}: {}", error_type, e);
                None
            }
        }
    }
}

// First match wins, so the specific timeout comes before the generic one.
static FIX_PATTERNS: Lazy<Vec<FixPattern>> = Lazy::new(|| {
    [
        FixPattern::new(
            "AccessDenied",
            r"(?i)access (is )?denied|requires elevation|run as administrator",
            "Run NA Manager from an elevated (Administrator) prompt",
            FixSeverity::High,
        ),
        FixPattern::new(
            "ManagementTimeout",
            r"(?i)\b(wmi|cim|management)\b.*\b(timed out|timeout)\b",
            "Restart the Windows Management Instrumentation service (winmgmt) and retry",
            FixSeverity::Medium,
        ),
        FixPattern::new(
            "CommandTimeout",
            r"(?i)\btimed out\b|\btimeout\b",
            "The command did not finish in time; retry or raise command_timeout_secs in settings",
            FixSeverity::Medium,
        ),
        FixPattern::new(
            "NetworkUnreachable",
            r"(?i)network is unreachable|no route to host|host unreachable",
            "Check network adapter status and retry",
            FixSeverity::Medium,
        ),
        FixPattern::new(
            "DevconMissing",
            r"(?i)devcon(\.exe)?\b.*\b(not found|missing|cannot find|not installed)",
            "Install devcon.exe from the Windows Driver Kit or set devcon_path in settings",
            FixSeverity::Low,
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
});

/// Match a failure message against the known patterns.
pub fn suggest_fix(message: &str) -> Option<FixSuggestion> {
    FIX_PATTERNS
        .iter()
        .find(|p| p.pattern.is_match(message))
        .map(|p| FixSuggestion {
            error_type: p.error_type.to_string(),
            suggestion: p.suggestion.to_string(),
            severity: p.severity,
        })
}

// ============================================================================
// Monitor
// ============================================================================

/// Snapshot of recent diagnostic activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub generated_at: DateTime<Local>,
    pub total_events: u64,
    pub dropped_events: u64,
    pub error_count: usize,
    pub warning_count: usize,
    /// Most recent failures, newest first.
    pub recent_failures: Vec<OperationEvent>,
    pub slow_operations: Vec<OperationEvent>,
    pub suggestions: Vec<FixSuggestion>,
}

impl DiagnosticReport {
    /// Build a report from an event history, oldest first.
    pub fn from_events<'a>(
        events: impl IntoIterator<Item = &'a OperationEvent>,
        total_events: u64,
        dropped_events: u64,
    ) -> Self {
        let events: Vec<&OperationEvent> = events.into_iter().collect();
        let recent_failures: Vec<OperationEvent> = events
            .iter()
            .rev()
            .filter(|e| !e.success)
            .take(RECENT_FAILURES_IN_REPORT)
            .map(|e| (*e).clone())
            .collect();

        let mut suggestions: Vec<FixSuggestion> = Vec::new();
        for failure in &recent_failures {
            let text = format!("{} {}", failure.operation, failure.detail.as_deref().unwrap_or(""));
            if let Some(fix) = suggest_fix(&text) {
                if !suggestions.iter().any(|s| s.error_type == fix.error_type) {
                    suggestions.push(fix);
                }
            }
        }

        Self {
            generated_at: Local::now(),
            total_events,
            dropped_events,
            error_count: events.iter().filter(|e| e.level == EventLevel::Error).count(),
            warning_count: events.iter().filter(|e| e.level == EventLevel::Warning).count(),
            slow_operations: events
                .iter()
                .filter(|e| e.duration() > SLOW_OPERATION_THRESHOLD)
                .map(|e| (*e).clone())
                .collect(),
            recent_failures,
            suggestions,
        }
    }
}

enum Message {
    Event(OperationEvent),
    Flush(oneshot::Sender<()>),
}

struct Shared {
    history: Mutex<VecDeque<OperationEvent>>,
    max_events: usize,
    total: AtomicU64,
    dropped: AtomicU64,
}

/// Event sink that keeps a bounded history and appends to a daily log file.
pub struct DiagnosticMonitor {
    tx: mpsc::Sender<Message>,
    shared: Arc<Shared>,
    log_dir: PathBuf,
}

impl DiagnosticMonitor {
    /// Start the monitor and its writer task. Must be called inside a Tokio runtime.
    pub fn start(log_dir: impl Into<PathBuf>, max_events: usize) -> Self {
        Self::with_capacity(log_dir, max_events, DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(log_dir: impl Into<PathBuf>, max_events: usize, capacity: usize) -> Self {
        let log_dir = log_dir.into();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(write_loop(rx, log_dir.clone()));
        info!("Diagnostic monitor writing to {:?}", log_dir);
        Self {
            tx,
            shared: Arc::new(Shared {
                history: Mutex::new(VecDeque::new()),
                max_events: max_events.max(1),
                total: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
            log_dir,
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Today's log file.
    pub fn log_file(&self) -> PathBuf {
        daily_log_file(&self.log_dir)
    }

    /// Events that did not fit in the writer channel.
    pub fn dropped_events(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// The retained history, oldest first.
    pub fn recent_events(&self) -> Vec<OperationEvent> {
        mutex_lock(&self.shared.history, "diagnostic history")
            .iter()
            .cloned()
            .collect()
    }

    pub fn report(&self) -> DiagnosticReport {
        let history = mutex_lock(&self.shared.history, "diagnostic history");
        DiagnosticReport::from_events(
            history.iter(),
            self.shared.total.load(Ordering::Relaxed),
            self.dropped_events(),
        )
    }

    /// Write the current report as `debug_report_<timestamp>.json` in `dir`.
    pub fn write_report(&self, dir: &Path) -> Result<PathBuf> {
        let report = self.report();
        let path = dir.join(format!(
            "debug_report_{}.json",
            report.generated_at.format("%Y%m%d_%H%M%S")
        ));
        write_json_atomic(&path, &report)?;
        info!("Diagnostic report written to {:?}", path);
        Ok(path)
    }

    /// Wait until everything queued so far is on disk.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Message::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

impl EventSink for DiagnosticMonitor {
    fn record(&self, event: OperationEvent) {
        trace_event(&event);
        self.shared.total.fetch_add(1, Ordering::Relaxed);
        {
            let mut history = mutex_lock(&self.shared.history, "diagnostic history");
            history.push_back(event.clone());
            while history.len() > self.shared.max_events {
                history.pop_front();
            }
        }
        if self.tx.try_send(Message::Event(event)).is_err() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn daily_log_file(dir: &Path) -> PathBuf {
    dir.join(format!("debug_{}.log", Local::now().format("%Y%m%d")))
}

async fn write_loop(mut rx: mpsc::Receiver<Message>, log_dir: PathBuf) {
    while let Some(first) = rx.recv().await {
        let mut lines = Vec::new();
        let mut acks = Vec::new();
        let mut next = Some(first);
        while let Some(message) = next {
            match message {
                Message::Event(event) => lines.push(event.log_line()),
                Message::Flush(ack) => acks.push(ack),
            }
            next = rx.try_recv().ok();
        }

        if !lines.is_empty() {
            if let Err(e) = append_lines(&log_dir, &lines).await {
                warn!("Failed to write diagnostic log: {}", e);
            }
        }
        for ack in acks {
            let _ = ack.send(());
        }
    }
    debug!("Diagnostic writer stopped");
}

async fn append_lines(log_dir: &Path, lines: &[String]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(log_dir).await?;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(daily_log_file(log_dir))
        .await?;
    let mut content = lines.join("\n");
    content.push('\n');
    file.write_all(content.as_bytes()).await?;
    file.flush().await
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Sink that keeps every event for assertions.
    #[derive(Default)]
    pub struct CollectingSink {
        events: Mutex<Vec<OperationEvent>>,
    }

    impl CollectingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<OperationEvent> {
            self.events.lock().expect("events lock").clone()
        }

        pub fn operations(&self) -> Vec<String> {
            self.events().into_iter().map(|e| e.operation).collect()
        }
    }

    impl EventSink for CollectingSink {
        fn record(&self, event: OperationEvent) {
            self.events.lock().expect("events lock").push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggest_fix_patterns() {
        let fix = suggest_fix("Management call failed: Access is denied.").expect("access denied");
        assert_eq!(fix.error_type, "AccessDenied");
        assert_eq!(fix.severity, FixSeverity::High);

        let fix = suggest_fix("WMI operation timed out").expect("wmi timeout");
        assert_eq!(fix.error_type, "ManagementTimeout");

        let fix = suggest_fix("Command timed out after 5s: netsh").expect("command timeout");
        assert_eq!(fix.error_type, "CommandTimeout");

        let fix = suggest_fix("connect: network is unreachable").expect("unreachable");
        assert_eq!(fix.error_type, "NetworkUnreachable");

        let fix = suggest_fix("devcon.exe not found at C:\\Windows").expect("devcon");
        assert_eq!(fix.error_type, "DevconMissing");

        assert!(suggest_fix("everything is fine").is_none());
    }

    #[test]
    fn test_log_line_format() {
        let event = OperationEvent::failed("EnableAdapter", "7", Duration::from_millis(42), "all methods failed");
        let line = event.log_line();
        assert!(line.contains("[ERROR] EnableAdapter target=7 success=false 42ms - all methods failed"));
    }

    #[test]
    fn test_report_from_events() {
        let mut events = Vec::new();
        for i in 0..12 {
            events.push(OperationEvent::failed(
                "SetStaticIp",
                i.to_string(),
                Duration::from_millis(10),
                "Access is denied",
            ));
        }
        events.push(OperationEvent::succeeded("RenewIp", "Ethernet", Duration::from_millis(2500)));
        events.push(OperationEvent::new("Poll", "all").with_level(EventLevel::Warning));

        let report = DiagnosticReport::from_events(events.iter(), 14, 0);
        assert_eq!(report.error_count, 12);
        assert_eq!(report.warning_count, 1);
        assert_eq!(report.recent_failures.len(), 10);
        assert_eq!(report.recent_failures[0].target, "11");
        assert_eq!(report.slow_operations.len(), 1);
        assert_eq!(report.suggestions.len(), 1);
    }

    #[test]
    fn test_sinks_accept_events_as_trait_objects() {
        let sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(NullSink), Arc::new(TracingSink)];
        for sink in sinks {
            sink.record(OperationEvent::failed("FlushDNS", "dns cache", Duration::ZERO, "exit 1"));
        }
    }

    #[tokio::test]
    async fn test_record_never_blocks_when_full() {
        let dir = tempfile::tempdir().expect("tempdir");
        let monitor = DiagnosticMonitor::with_capacity(dir.path(), 100, 2);

        // The writer cannot run until this task yields, so the channel fills up.
        for i in 0..5 {
            monitor.record(OperationEvent::new("Poll", i.to_string()));
        }
        assert_eq!(monitor.dropped_events(), 3);
        assert_eq!(monitor.recent_events().len(), 5);

        monitor.flush().await;
        let log = std::fs::read_to_string(monitor.log_file()).expect("log file written");
        assert_eq!(log.lines().count(), 2);
        assert_eq!(monitor.report().dropped_events, 3);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let monitor = DiagnosticMonitor::start(dir.path(), 3);
        for i in 0..10 {
            monitor.record(OperationEvent::new("Poll", i.to_string()));
        }
        let history = monitor.recent_events();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].target, "7");
        assert_eq!(monitor.report().total_events, 10);
    }

    #[tokio::test]
    async fn test_write_report() {
        let dir = tempfile::tempdir().expect("tempdir");
        let monitor = DiagnosticMonitor::start(dir.path(), 10);
        monitor.record(OperationEvent::failed("DisableAdapter", "3", Duration::ZERO, "Access denied"));
        let path = monitor.write_report(dir.path()).expect("report written");
        let json = std::fs::read_to_string(path).expect("read report");
        let report: DiagnosticReport = serde_json::from_str(&json).expect("report parses");
        assert_eq!(report.recent_failures.len(), 1);
        assert_eq!(report.suggestions[0].error_type, "AccessDenied");
    }
}
