// NA Manager - Library Root
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! # NA Manager
//!
//! Core of a Windows network adapter manager: adapter enumeration through
//! CIM, enable/disable with a four-step fallback chain, static and DHCP
//! addressing, saved profiles, per-adapter preferences, and operation
//! diagnostics.

pub mod cim_client;
pub mod command;
pub mod models;
pub mod network_utils;
pub mod services;
pub mod storage;

/// Human-readable application name.
pub const APP_NAME: &str = "NA Manager";

/// Application version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
