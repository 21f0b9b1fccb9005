//! Theme, layout and last-location persistence for reading sessions.
//!
//! Writes never fail a session: a failed write is logged, kept pending and
//! retried on the next mutation or an explicit `flush`.

use crate::catalog::{Bookmark, ContentHash};
use crate::render::LayoutMode;
use crate::settings::{self, SettingsStore};
use crate::theme::{ColorScheme, Theme};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub struct SessionPersistence {
    store: Box<dyn SettingsStore>,
    pending_theme: Option<Theme>,
    pending_layout: Option<LayoutMode>,
    pending_locations: BTreeMap<ContentHash, Option<Bookmark>>,
}

impl SessionPersistence {
    pub fn new(store: Box<dyn SettingsStore>) -> Self {
        Self {
            store,
            pending_theme: None,
            pending_layout: None,
            pending_locations: BTreeMap::new(),
        }
    }

    /// The persisted theme, with each missing or unparsable key taken from
    /// `fallback`.
    pub fn load_defaults(&self, fallback: &Theme) -> Theme {
        if let Some(theme) = &self.pending_theme {
            return theme.clone();
        }
        let mut theme = fallback.clone();
        if let Some(raw) = self.read(settings::THEME_COLOR_SCHEME) {
            match raw.parse::<ColorScheme>() {
                Ok(scheme) => theme.color_scheme = scheme,
                Err(err) => warn!("Ignoring stored color scheme: {err}"),
            }
        }
        if let Some(raw) = self.read(settings::THEME_FONT_SCALE_PERCENT) {
            match raw.trim().parse::<u16>() {
                Ok(percent) => theme.font_scale_percent = percent,
                Err(err) => warn!(value = %raw, "Ignoring stored font scale: {err}"),
            }
        }
        if let Some(raw) = self.read(settings::THEME_FONT_FAMILY) {
            theme.font_family = raw;
        }
        theme.sanitized()
    }

    pub fn save_theme(&mut self, theme: &Theme) {
        self.pending_theme = Some(theme.clone());
        self.flush();
    }

    pub fn save_location(&mut self, hash: &ContentHash, bookmark: &Bookmark) {
        self.pending_locations
            .insert(hash.clone(), Some(bookmark.clone()));
        self.flush();
    }

    pub fn forget_location(&mut self, hash: &ContentHash) {
        self.pending_locations.insert(hash.clone(), None);
        self.flush();
    }

    pub fn load_location(&self, hash: &ContentHash) -> Option<Bookmark> {
        if let Some(pending) = self.pending_locations.get(hash) {
            return pending.clone();
        }
        self.read(&settings::last_location_key(hash))
            .filter(|raw| !raw.trim().is_empty())
            .map(Bookmark::new)
    }

    pub fn save_layout_mode(&mut self, mode: LayoutMode) {
        self.pending_layout = Some(mode);
        self.flush();
    }

    pub fn load_layout_mode(&self) -> Option<LayoutMode> {
        if let Some(mode) = self.pending_layout {
            return Some(mode);
        }
        let raw = self.read(settings::LAYOUT_MODE)?;
        match raw.parse() {
            Ok(mode) => Some(mode),
            Err(err) => {
                warn!("Ignoring stored layout mode: {err}");
                None
            }
        }
    }

    /// Number of writes still waiting on the store.
    pub fn pending_writes(&self) -> usize {
        usize::from(self.pending_theme.is_some())
            + usize::from(self.pending_layout.is_some())
            + self.pending_locations.len()
    }

    /// Retry every pending write. Whatever fails stays pending.
    pub fn flush(&mut self) {
        if let Some(theme) = self.pending_theme.take() {
            let scale = theme.font_scale_percent.to_string();
            let writes = [
                (settings::THEME_COLOR_SCHEME, theme.color_scheme.as_str()),
                (settings::THEME_FONT_SCALE_PERCENT, scale.as_str()),
                (settings::THEME_FONT_FAMILY, theme.font_family.as_str()),
            ];
            if !self.write_all(&writes) {
                self.pending_theme = Some(theme);
            }
        }

        if let Some(mode) = self.pending_layout.take() {
            if !self.write_all(&[(settings::LAYOUT_MODE, mode.as_str())]) {
                self.pending_layout = Some(mode);
            }
        }

        let locations = std::mem::take(&mut self.pending_locations);
        for (hash, bookmark) in locations {
            let key = settings::last_location_key(&hash);
            let result = match &bookmark {
                Some(bookmark) => self.store.set(&key, bookmark.as_str()),
                None => self.store.remove(&key),
            };
            match result {
                Ok(()) => debug!(hash = %hash.short(), "Persisted last location"),
                Err(err) => {
                    warn!(hash = %hash.short(), "Failed to persist last location: {err}");
                    self.pending_locations.insert(hash, bookmark);
                }
            }
        }
    }

    fn write_all(&mut self, writes: &[(&str, &str)]) -> bool {
        for (key, value) in writes {
            if let Err(err) = self.store.set(key, value) {
                warn!(key, "Failed to persist setting: {err}");
                return false;
            }
        }
        true
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, "Failed to read setting: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::PersistenceError;
    use crate::settings::MemorySettingsStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// Settings store that can be switched into a failing mode.
    #[derive(Clone, Default)]
    pub(crate) struct FlakySettings {
        pub failing: Arc<AtomicBool>,
        pub values: Arc<Mutex<BTreeMap<String, String>>>,
    }

    impl SettingsStore for FlakySettings {
        fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(PersistenceError::Unavailable {
                    message: "disk full".to_string(),
                });
            }
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn remove(&mut self, key: &str) -> Result<(), PersistenceError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(PersistenceError::Unavailable {
                    message: "disk full".to_string(),
                });
            }
            self.values.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[test]
    fn theme_round_trips_through_store() {
        let mut persistence = SessionPersistence::new(Box::new(MemorySettingsStore::new()));
        let theme = Theme {
            color_scheme: ColorScheme::Sepia,
            font_scale_percent: 130,
            font_family: "Georgia".to_string(),
        };
        persistence.save_theme(&theme);
        assert_eq!(persistence.pending_writes(), 0);
        assert_eq!(persistence.load_defaults(&Theme::default()), theme);
    }

    #[test]
    fn missing_keys_fall_back_per_field() {
        let mut store = MemorySettingsStore::new();
        store.set(settings::THEME_FONT_SCALE_PERCENT, "999").unwrap();
        store.set(settings::THEME_COLOR_SCHEME, "plaid").unwrap();
        let persistence = SessionPersistence::new(Box::new(store));

        let theme = persistence.load_defaults(&Theme::default());
        assert_eq!(theme.color_scheme, Theme::default().color_scheme);
        assert_eq!(theme.font_scale_percent, 200);
        assert_eq!(theme.font_family, "serif");
    }

    #[test]
    fn failed_writes_stay_pending_and_retry() {
        let store = FlakySettings::default();
        store.failing.store(true, Ordering::SeqCst);
        let mut persistence = SessionPersistence::new(Box::new(store.clone()));
        let hash = ContentHash::new("abc123");

        persistence.save_location(&hash, &Bookmark::new("0:42"));
        persistence.save_layout_mode(LayoutMode::DoublePage);
        assert_eq!(persistence.pending_writes(), 2);
        assert_eq!(persistence.load_location(&hash), Some(Bookmark::new("0:42")));
        assert_eq!(persistence.load_layout_mode(), Some(LayoutMode::DoublePage));

        store.failing.store(false, Ordering::SeqCst);
        persistence.flush();
        assert_eq!(persistence.pending_writes(), 0);
        let values = store.values.lock().unwrap();
        assert_eq!(values.get("lastLocation.abc123").map(String::as_str), Some("0:42"));
        assert_eq!(values.get("layout.mode").map(String::as_str), Some("double-page"));
    }

    #[test]
    fn forget_location_removes_key() {
        let mut persistence = SessionPersistence::new(Box::new(MemorySettingsStore::new()));
        let hash = ContentHash::new("def456");
        persistence.save_location(&hash, &Bookmark::new("2:10"));
        persistence.forget_location(&hash);
        assert_eq!(persistence.load_location(&hash), None);
        assert_eq!(persistence.pending_writes(), 0);
    }
}
