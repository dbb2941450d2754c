// NA Manager - Error Types
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Shared error types for the NA Manager core.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for NA Manager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for NA Manager operations.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================
    // Enumeration Errors
    // ========================================
    #[error("Adapter enumeration failed: {0}")]
    Enumeration(String),

    #[error("Adapter not found: {0}")]
    AdapterNotFound(String),

    // ========================================
    // Control Errors
    // ========================================
    #[error("Adapter control failed: {operation} - {reason}")]
    Control { operation: String, reason: String },

    #[error("Management call failed: {0}")]
    Management(String),

    #[error("Command timed out after {timeout:?}: {program}")]
    CommandTimeout { program: String, timeout: Duration },

    #[error("Command failed: {program} - {reason}")]
    CommandFailed { program: String, reason: String },

    // ========================================
    // Configuration Errors
    // ========================================
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid IP address: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid subnet mask: {0}")]
    InvalidSubnetMask(String),

    // ========================================
    // Storage Errors
    // ========================================
    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParseFailed(String),

    #[error("Failed to write configuration: {0}")]
    ConfigWriteFailed(String),

    // ========================================
    // System Errors
    // ========================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new control error.
    pub fn control(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Control {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a new command failed error.
    pub fn command_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CommandFailed {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is a validation error on user-supplied input.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::InvalidIpAddress(_) | Self::InvalidSubnetMask(_)
        )
    }

    /// Check if this error points at missing administrator rights.
    pub fn is_access_denied(&self) -> bool {
        let text = self.to_string().to_lowercase();
        text.contains("access denied") || text.contains("access is denied")
    }
}

// Convert from toml parse errors
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigParseFailed(err.to_string())
    }
}

// Convert from toml serialize errors
impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::ConfigWriteFailed(err.to_string())
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigParseFailed(err.to_string())
    }
}
