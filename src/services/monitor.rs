// NA Manager - Adapter Monitor Service
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Periodic adapter polling.
//!
//! The monitor enumerates on a fixed interval and publishes each result as an
//! immutable [`Snapshot`] on a watch channel. Consumers compare consecutive
//! snapshots with [`SnapshotDiff`] instead of receiving change notifications.

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::models::AdapterRecord;
use crate::network_utils::AdapterEnumerator;
use crate::services::PreferencesStore;

/// Result of one enumeration poll.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Poll counter, starting at 1. Zero is the placeholder before the first poll.
    pub sequence: u64,
    pub taken_at: DateTime<Local>,
    pub adapters: Arc<Vec<AdapterRecord>>,
    /// Set when enumeration failed; `adapters` is empty then.
    pub status: Option<String>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            sequence: 0,
            taken_at: Local::now(),
            adapters: Arc::new(Vec::new()),
            status: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status.is_some()
    }

    /// Adapters not marked hidden.
    pub fn visible(&self) -> impl Iterator<Item = &AdapterRecord> {
        self.adapters.iter().filter(|a| !a.is_hidden)
    }
}

/// Device ids that appeared, disappeared, or changed between two polls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl SnapshotDiff {
    pub fn between(previous: &[AdapterRecord], next: &[AdapterRecord]) -> Self {
        let before: HashMap<&str, &AdapterRecord> =
            previous.iter().map(|a| (a.device_id.as_str(), a)).collect();
        let after: HashMap<&str, &AdapterRecord> =
            next.iter().map(|a| (a.device_id.as_str(), a)).collect();

        let mut diff = Self::default();
        for adapter in next {
            match before.get(adapter.device_id.as_str()) {
                None => diff.added.push(adapter.device_id.clone()),
                Some(old) if !same_state(old, adapter) => diff.changed.push(adapter.device_id.clone()),
                Some(_) => {}
            }
        }
        for adapter in previous {
            if !after.contains_key(adapter.device_id.as_str()) {
                diff.removed.push(adapter.device_id.clone());
            }
        }
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Traffic counters move on every poll and are not a state change.
fn same_state(a: &AdapterRecord, b: &AdapterRecord) -> bool {
    a.name == b.name
        && a.connection_id == b.connection_id
        && a.connection_status == b.connection_status
        && a.ip_address == b.ip_address
        && a.subnet_mask == b.subnet_mask
        && a.default_gateway == b.default_gateway
        && a.dns_servers == b.dns_servers
        && a.is_dhcp_enabled == b.is_dhcp_enabled
        && a.speed_bits_per_sec == b.speed_bits_per_sec
        && a.custom_name == b.custom_name
        && a.is_hidden == b.is_hidden
}

/// Enumerate once and wrap the outcome in a snapshot.
pub async fn poll_once(
    enumerator: &AdapterEnumerator,
    preferences: &PreferencesStore,
    sequence: u64,
) -> Snapshot {
    match enumerator.list_adapters_with_preferences(preferences).await {
        Ok(adapters) => Snapshot {
            sequence,
            taken_at: Local::now(),
            adapters: Arc::new(adapters),
            status: None,
        },
        Err(e) => {
            warn!("Adapter poll failed: {}", e);
            Snapshot {
                sequence,
                taken_at: Local::now(),
                adapters: Arc::new(Vec::new()),
                status: Some(format!("Error loading adapters: {}", e)),
            }
        }
    }
}

/// Background poller publishing adapter snapshots.
pub struct AdapterMonitor {
    running: Arc<AtomicBool>,
    receiver: watch::Receiver<Snapshot>,
    handle: JoinHandle<()>,
    interval: Duration,
}

impl AdapterMonitor {
    /// Start polling. The first poll runs immediately. Must be called inside a Tokio runtime.
    pub fn spawn(
        enumerator: AdapterEnumerator,
        preferences: Arc<PreferencesStore>,
        interval: Duration,
    ) -> Self {
        let (tx, receiver) = watch::channel(Snapshot::empty());
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut sequence = 0u64;
            let mut previous: Arc<Vec<AdapterRecord>> = Arc::new(Vec::new());

            while flag.load(Ordering::SeqCst) {
                ticker.tick().await;
                sequence += 1;
                let snapshot = poll_once(&enumerator, &preferences, sequence).await;
                let diff = SnapshotDiff::between(&previous, &snapshot.adapters);
                if !diff.is_empty() {
                    debug!(
                        "Poll {}: {} added, {} removed, {} changed",
                        sequence,
                        diff.added.len(),
                        diff.removed.len(),
                        diff.changed.len()
                    );
                }
                previous = snapshot.adapters.clone();
                if tx.send(snapshot).is_err() {
                    debug!("No snapshot subscribers left, stopping monitor");
                    break;
                }
            }
            flag.store(false, Ordering::SeqCst);
        });

        info!("Adapter monitor started ({:?} interval)", interval);
        Self {
            running,
            receiver,
            handle,
            interval,
        }
    }

    /// A receiver that sees the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.receiver.clone()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop polling and wait for the task to end.
    pub async fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        self.handle.abort();
        let _ = self.handle.await;
        info!("Adapter monitor stopped");
    }
}
