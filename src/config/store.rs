//! Durable settings store
//!
//! Owns the in-memory copy of [`Configuration`] and its JSON file. Loading
//! never fails: absent or broken files fall back to defaults, field by field.
//! Saving failures are logged and the in-memory copy stays authoritative.

use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::settings::{ConfigField, Configuration, TypeMismatch};
use crate::constants;

/// Settings file handle plus the authoritative in-memory record
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: Configuration,
}

impl ConfigStore {
    /// Default settings location in the per-user config directory
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(constants::config::APP_DIR);
        path.push(constants::config::FILENAME);
        path
    }

    /// Open the store at `path`, loading whatever is on disk
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = load_from(&path);
        Self { path, current }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the in-memory record
    pub fn current(&self) -> &Configuration {
        &self.current
    }

    /// Read the settings file, substituting defaults for anything unusable
    pub fn load(&self) -> Configuration {
        load_from(&self.path)
    }

    /// Write the full record; failures are logged, never returned
    pub fn save(&self, config: &Configuration) {
        match write_to(&self.path, config) {
            Ok(()) => debug!(path = %self.path.display(), ?config, "Config saved"),
            Err(e) => error!(path = %self.path.display(), error = ?e, "Failed to save config"),
        }
    }

    /// Set one field, persist the whole record and return the new snapshot.
    ///
    /// This is the only mutation path. A value of the wrong JSON type leaves
    /// the record untouched.
    pub fn update(&mut self, field: ConfigField, value: &Value) -> Result<Configuration, TypeMismatch> {
        let mut next = self.current.clone();
        if let Err(e) = next.set(field, value) {
            warn!(field = %field, value = %value, "Rejected config update with wrong type");
            return Err(e);
        }
        self.save(&next);
        self.current = next;
        info!(field = %field, value = %value, "Config updated");
        Ok(self.current.clone())
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .context(format!("Failed to create config directory: {}", parent.display()))?;
    }
    Ok(())
}

fn load_from(path: &Path) -> Configuration {
    if let Err(e) = ensure_parent_dir(path) {
        warn!(error = ?e, "Config directory unavailable");
    }

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No config file found, using defaults");
            return Configuration::default();
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
            return Configuration::default();
        }
    };

    let object = match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Object(object)) => object,
        Ok(other) => {
            warn!(path = %path.display(), found = %other, "Config file is not a JSON object, using defaults");
            return Configuration::default();
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
            return Configuration::default();
        }
    };

    let (config, replaced) = Configuration::from_object(&object);
    for field in &replaced {
        warn!(field = %field, "Config field missing or invalid, using default");
    }
    info!(path = %path.display(), ?config, "Config loaded");
    config
}

fn write_to(path: &Path, config: &Configuration) -> Result<()> {
    ensure_parent_dir(path)?;
    let contents = serde_json::to_string_pretty(config).context("Failed to serialize config to JSON")?;

    // Whole-file replace through a sibling temp file
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents).context(format!("Failed to write config file to {}", tmp.display()))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e).context(format!("Failed to move config file into {}", path.display()));
    }
    Ok(())
}
