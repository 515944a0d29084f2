//! Persisted settings: a small JSON key/value file, the desktop equivalent of browser local storage.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ConfigError, DashboardConfig};

/// Bump when the persisted layout changes incompatibly. A mismatch wipes the store on startup.
pub const SETTINGS_VERSION: &str = "2";
pub const VERSION_KEY: &str = "ahops.version";
pub const SETTINGS_KEY: &str = "ahops.settings";

/// Flat overrides, merged over [`DashboardConfig::default`]. Absent keys keep the default.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_endpoints: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_endpoints: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_override: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for_finalization: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer_program: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer_account: Option<String>,
}

impl SettingsOverrides {
    pub fn apply(self, config: &mut DashboardConfig) {
        if let Some(endpoints) = self.primary_endpoints.filter(|e| !e.is_empty()) {
            config.primary_endpoints = endpoints;
        }
        if let Some(endpoints) = self.secondary_endpoints.filter(|e| !e.is_empty()) {
            config.secondary_endpoints = endpoints;
        }
        if self.block_override.is_some() {
            config.block_override = self.block_override;
        }
        if let Some(page_size) = self.page_size.filter(|size| *size > 0) {
            config.page_size = page_size;
        }
        if let Some(wait) = self.wait_for_finalization {
            config.wait_for_finalization = wait;
        }
        if self.signer_program.is_some() {
            config.signer_program = self.signer_program;
        }
        if self.signer_account.is_some() {
            config.signer_account = self.signer_account;
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl SettingsStore {
    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => Map::new(),
            Ok(contents) => match serde_json::from_str::<Value>(&contents)? {
                Value::Object(values) => values,
                _ => Map::new(),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(SettingsStore { path, values })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) -> Result<(), ConfigError> {
        self.values.insert(key.to_string(), value);
        self.flush()
    }

    pub fn clear(&mut self) -> Result<(), ConfigError> {
        self.values.clear();
        self.flush()
    }

    /// One-shot startup step: if the persisted version tag differs from [`SETTINGS_VERSION`], clear
    /// everything and write the current tag. Returns true if anything was cleared.
    pub fn reconcile_version(&mut self) -> Result<bool, ConfigError> {
        let current = self.get(VERSION_KEY).and_then(Value::as_str);
        if current == Some(SETTINGS_VERSION) {
            return Ok(false);
        }
        let had_state = !self.values.is_empty();
        self.values.clear();
        self.set(VERSION_KEY, Value::String(SETTINGS_VERSION.to_string()))?;

        Ok(had_state)
    }

    pub fn load_overrides(&self) -> Result<SettingsOverrides, ConfigError> {
        match self.get(SETTINGS_KEY) {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Ok(SettingsOverrides::default()),
        }
    }

    pub fn save_overrides(&mut self, overrides: &SettingsOverrides) -> Result<(), ConfigError> {
        self.set(SETTINGS_KEY, serde_json::to_value(overrides)?)
    }

    fn flush(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(
            &self.path,
            serde_json::to_string_pretty(&Value::Object(self.values.clone()))?,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_version_clears_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"ahops.version":"1","ahops.settings":{"blockOverride":5}}"#,
        )
        .unwrap();

        let mut store = SettingsStore::open(&path).unwrap();
        assert!(store.reconcile_version().unwrap());
        assert_eq!(store.load_overrides().unwrap(), SettingsOverrides::default());

        let reopened = SettingsStore::open(&path).unwrap();
        assert_eq!(
            reopened.get(VERSION_KEY),
            Some(&Value::String(SETTINGS_VERSION.to_string()))
        );
    }

    #[test]
    fn matching_version_keeps_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut store = SettingsStore::open(&path).unwrap();
        assert!(!store.reconcile_version().unwrap());
        store
            .save_overrides(&SettingsOverrides {
                page_size: Some(100),
                ..Default::default()
            })
            .unwrap();

        let mut reopened = SettingsStore::open(&path).unwrap();
        assert!(!reopened.reconcile_version().unwrap());
        assert_eq!(reopened.load_overrides().unwrap().page_size, Some(100));
    }

    #[test]
    fn overrides_are_flat_camel_case() {
        let overrides: SettingsOverrides =
            serde_json::from_str(r#"{"blockOverride":1000,"waitForFinalization":false}"#).unwrap();
        let mut config = DashboardConfig::default();
        overrides.apply(&mut config);
        assert_eq!(config.block_override, Some(1000));
        assert!(!config.wait_for_finalization);
        assert_eq!(config.page_size, crate::PAGE_SIZE);
    }
}
