// NA Manager - Local Storage
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Local storage plumbing shared by the stores.
//!
//! Handles:
//! - Config and data directory resolution
//! - Application settings
//! - Atomic JSON documents (write to a temp file, then rename)
//!
//! Lock helpers recover from poisoning by taking the inner value, as poison
//! indicates a panic in another thread but the data itself may still be valid.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

use crate::models::{
    AppConfig, Error, Result, CONFIG_DIR_NAME, DATA_DIR_NAME, DIAGNOSTICS_DIR_NAME,
    PREFERENCES_FILE_NAME, PROFILES_FILE_NAME, SETTINGS_FILE_NAME,
};

/// Resolved on-disk locations.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Configuration directory path.
    config_dir: PathBuf,
    /// Directory holding profiles, preferences and diagnostics.
    data_dir: PathBuf,
}

impl AppPaths {
    /// Resolve the default directories.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME);
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DATA_DIR_NAME);
        Self::with_dirs(config_dir, data_dir)
    }

    /// Use explicit directories, creating them if needed.
    pub fn with_dirs(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        for dir in [&config_dir, &data_dir] {
            if let Err(e) = fs::create_dir_all(dir) {
                error!("Failed to create directory {:?}: {}", dir, e);
            }
        }
        Self { config_dir, data_dir }
    }

    /// Apply the `data_dir` override from the settings, if any.
    pub fn with_config_overrides(self, config: &AppConfig) -> Self {
        match &config.data_dir {
            Some(dir) => Self::with_dirs(self.config_dir, dir.clone()),
            None => self,
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE_NAME)
    }

    pub fn preferences_file(&self) -> PathBuf {
        self.data_dir.join(PREFERENCES_FILE_NAME)
    }

    pub fn profiles_file(&self) -> PathBuf {
        self.data_dir.join(PROFILES_FILE_NAME)
    }

    pub fn diagnostics_dir(&self) -> PathBuf {
        self.data_dir.join(DIAGNOSTICS_DIR_NAME)
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Load settings, falling back to defaults when missing or unreadable.
    pub fn load_settings(&self) -> AppConfig {
        let settings_file = self.settings_file();
        if !settings_file.exists() {
            return AppConfig::default();
        }
        match AppConfig::load_from_file(&settings_file) {
            Ok(config) => {
                info!("Loaded settings from {:?}", settings_file);
                config
            }
            Err(e) => {
                error!("Failed to load settings: {}", e);
                AppConfig::default()
            }
        }
    }

    /// Save settings to disk.
    pub fn save_settings(&self, config: &AppConfig) -> Result<()> {
        config.save_to_file(&self.settings_file())
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Atomic documents
// ============================================================================

/// Write bytes to `path` by writing a sibling temp file and renaming it over.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    let tmp_path = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(Error::Persistence(format!("{}: {}", path.display(), e)));
    }
    debug!("Wrote {} bytes to {:?}", contents.len(), path);
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| Error::Persistence(format!("serialize {}: {}", path.display(), e)))?;
    write_atomic(path, &json)
}

/// Read a JSON document. A missing file yields `None`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path).map_err(|e| Error::Persistence(format!("{}: {}", path.display(), e)))?;
    let value = serde_json::from_reader(BufReader::new(file))?;
    Ok(Some(value))
}

/// Read a JSON document, using the default on a missing or corrupt file.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path, context: &str) -> T {
    match read_json(path) {
        Ok(Some(value)) => {
            info!("Loaded {} from {:?}", context, path);
            value
        }
        Ok(None) => T::default(),
        Err(e) => {
            warn!("Failed to load {}: {}; starting empty", context, e);
            T::default()
        }
    }
}

// ============================================================================
// Lock helpers (handle poisoning gracefully)
// ============================================================================

/// Read from RwLock, recovering from poison if needed.
pub(crate) fn read_lock<'a, T>(lock: &'a RwLock<T>, context: &str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned reading {}, recovering", context);
        poisoned.into_inner()
    })
}

/// Write to RwLock, recovering from poison if needed.
pub(crate) fn write_lock<'a, T>(lock: &'a RwLock<T>, context: &str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned writing {}, recovering", context);
        poisoned.into_inner()
    })
}

/// Lock a Mutex, recovering from poison if needed.
pub(crate) fn mutex_lock<'a, T>(lock: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!("Mutex poisoned locking {}, recovering", context);
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc.json");
        write_atomic(&path, b"first").expect("first write");
        write_atomic(&path, b"second").expect("second write");
        assert_eq!(fs::read_to_string(&path).expect("read back"), "second");

        // No temp files left behind
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("list dir")
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_read_json_missing_and_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing.json");
        assert!(read_json::<Vec<String>>(&path).expect("missing is ok").is_none());

        fs::write(&path, "{ not json").expect("write corrupt");
        assert!(read_json::<Vec<String>>(&path).is_err());
        let fallback: Vec<String> = read_json_or_default(&path, "test");
        assert!(fallback.is_empty());
    }

    #[test]
    fn test_paths_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::with_dirs(dir.path().join("cfg"), dir.path().join("data"));
        assert!(paths.config_dir().exists());
        assert!(paths.profiles_file().ends_with("profiles.json"));
        assert!(paths.preferences_file().ends_with("adapter_preferences.json"));
        assert_eq!(paths.load_settings(), AppConfig::default());
    }

    #[test]
    fn test_settings_round_trip_and_data_dir_override() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::with_dirs(dir.path().join("cfg"), dir.path().join("data"));
        let config = AppConfig {
            poll_interval_secs: 10,
            data_dir: Some(dir.path().join("elsewhere")),
            ..AppConfig::default()
        };
        paths.save_settings(&config).expect("save settings");

        let loaded = paths.load_settings();
        assert_eq!(loaded, config);
        let paths = paths.with_config_overrides(&loaded);
        assert!(paths.profiles_file().starts_with(dir.path().join("elsewhere")));
        assert!(paths.data_dir().exists());
    }
}
