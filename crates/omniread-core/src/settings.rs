//! Scalar key/value settings storage.

use crate::catalog::{ContentHash, write_atomically};
use crate::error::PersistenceError;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const THEME_COLOR_SCHEME: &str = "theme.colorScheme";
pub const THEME_FONT_SCALE_PERCENT: &str = "theme.fontScalePercent";
pub const THEME_FONT_FAMILY: &str = "theme.fontFamily";
pub const LAYOUT_MODE: &str = "layout.mode";

const LAST_LOCATION_PREFIX: &str = "lastLocation.";

pub fn last_location_key(hash: &ContentHash) -> String {
    format!("{LAST_LOCATION_PREFIX}{hash}")
}

pub trait SettingsStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError>;
    fn remove(&mut self, key: &str) -> Result<(), PersistenceError>;
}

/// Settings persisted as a single TOML table of string values.
#[derive(Debug)]
pub struct TomlSettingsStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
    /// Set when an existing file could not be read or moved aside; writes
    /// are refused so it is never overwritten.
    locked: bool,
}

impl TomlSettingsStore {
    /// Load `{dir}/settings.toml`. An invalid file is moved aside to
    /// `settings.toml.bak` and the store starts empty; an unreadable one is
    /// left untouched and the store refuses to write over it.
    pub fn open(dir: &Path) -> Self {
        let path = dir.join("settings.toml");
        let (values, locked) = match fs::read_to_string(&path) {
            Ok(data) => match toml::from_str::<BTreeMap<String, String>>(&data) {
                Ok(values) => {
                    info!(path = %path.display(), keys = values.len(), "Loaded settings");
                    (values, false)
                }
                Err(err) => {
                    let backup = dir.join("settings.toml.bak");
                    match fs::rename(&path, &backup) {
                        Ok(()) => {
                            warn!(
                                path = %path.display(),
                                backup = %backup.display(),
                                "Invalid settings TOML moved aside; starting empty: {err}"
                            );
                            (BTreeMap::new(), false)
                        }
                        Err(rename_err) => {
                            warn!(
                                path = %path.display(),
                                "Invalid settings TOML could not be moved aside ({rename_err}); settings will not be saved: {err}"
                            );
                            (BTreeMap::new(), true)
                        }
                    }
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => (BTreeMap::new(), false),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    "Failed to read settings; leaving the file untouched and not saving: {err}"
                );
                (BTreeMap::new(), true)
            }
        };
        Self {
            path,
            values,
            locked,
        }
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<(), PersistenceError> {
        if self.locked {
            return Err(PersistenceError::Unavailable {
                message: format!(
                    "{} could not be loaded; refusing to overwrite it",
                    self.path.display()
                ),
            });
        }
        let contents = toml::to_string(values).map_err(|err| PersistenceError::Encode {
            what: "settings",
            message: err.to_string(),
        })?;
        write_atomically(&self.path, contents.as_bytes())
    }
}

impl SettingsStore for TomlSettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        if self.values.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        let mut next = self.values.clone();
        next.insert(key.to_string(), value.to_string());
        self.flush(&next)?;
        self.values = next;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistenceError> {
        if !self.values.contains_key(key) {
            return Ok(());
        }
        let mut next = self.values.clone();
        next.remove(key);
        self.flush(&next)?;
        self.values = next;
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemorySettingsStore {
    values: BTreeMap<String, String>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistenceError> {
        self.values.remove(key);
        Ok(())
    }
}
