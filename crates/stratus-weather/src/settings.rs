//! Persistence of the chosen city.

use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Location;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings file is corrupted: {0}")]
    Corrupted(String),
}

/// Single-value store for the user's chosen city.
pub trait SettingsStore: Send + Sync {
    /// The persisted city, or `None` if the user never chose one.
    fn location(&self) -> Result<Option<Location>, SettingsError>;

    fn set_location(&self, location: &Location) -> Result<(), SettingsError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSettings {
    #[serde(default)]
    city: Option<Location>,
}

/// JSON file store, e.g. `~/.config/stratus/settings.json`.
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    // Serializes read-modify-write cycles from concurrent callers
    io_lock: Mutex<()>,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io_lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<StoredSettings, SettingsError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoredSettings::default())
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents).map_err(|e| SettingsError::Corrupted(e.to_string()))
    }

    fn write(&self, settings: &StoredSettings) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| SettingsError::Corrupted(e.to_string()))?;

        // Write-then-rename so a crash never leaves a truncated file behind
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(write_err)?;
        std::fs::rename(&tmp_path, &self.path).map_err(write_err)?;
        Ok(())
    }
}

impl SettingsStore for FileSettingsStore {
    fn location(&self) -> Result<Option<Location>, SettingsError> {
        let _guard = self.io_lock.lock();
        Ok(self.read()?.city)
    }

    fn set_location(&self, location: &Location) -> Result<(), SettingsError> {
        let _guard = self.io_lock.lock();
        let mut settings = self.read().unwrap_or_else(|e| {
            tracing::warn!("Replacing unreadable settings file: {}", e);
            StoredSettings::default()
        });
        settings.city = Some(location.clone());
        self.write(&settings)?;
        tracing::info!("Saved chosen city: {}", location);
        Ok(())
    }
}

/// In-process store for hosts without persistence and for tests.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    location: Mutex<Option<Location>>,
}

impl MemorySettingsStore {
    pub fn with_location(location: Location) -> Self {
        Self {
            location: Mutex::new(Some(location)),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn location(&self) -> Result<Option<Location>, SettingsError> {
        Ok(self.location.lock().clone())
    }

    fn set_location(&self, location: &Location) -> Result<(), SettingsError> {
        *self.location.lock() = Some(location.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_has_no_location() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSettingsStore::new(dir.path().join("settings.json"));
        assert_eq!(store.location().unwrap(), None);
    }

    #[test]
    fn test_set_location_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stratus").join("settings.json");

        let store = FileSettingsStore::new(&path);
        store.set_location(&Location::parse("Tokyo").unwrap()).unwrap();

        let reopened = FileSettingsStore::new(&path);
        assert_eq!(reopened.location().unwrap(), Location::parse("Tokyo"));
    }

    #[test]
    fn test_set_location_overwrites_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSettingsStore::new(dir.path().join("settings.json"));

        store.set_location(&Location::parse("Paris").unwrap()).unwrap();
        store.set_location(&Location::parse("Oslo").unwrap()).unwrap();

        assert_eq!(store.location().unwrap(), Location::parse("Oslo"));
    }

    #[test]
    fn test_corrupted_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileSettingsStore::new(&path);
        assert!(matches!(store.location(), Err(SettingsError::Corrupted(_))));
    }

    #[test]
    fn test_blank_saved_city_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"city": "  "}"#).unwrap();

        let store = FileSettingsStore::new(&path);
        assert!(matches!(store.location(), Err(SettingsError::Corrupted(_))));
    }

    #[test]
    fn test_corrupted_file_is_replaced_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileSettingsStore::new(&path);
        store.set_location(&Location::parse("Lima").unwrap()).unwrap();
        assert_eq!(store.location().unwrap(), Location::parse("Lima"));
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySettingsStore::default();
        assert_eq!(store.location().unwrap(), None);

        store.set_location(&Location::parse("Cairo").unwrap()).unwrap();
        assert_eq!(store.location().unwrap(), Location::parse("Cairo"));
    }
}
