use super::models::AppConfig;
use super::tables::ConfigTables;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "conf/config.toml";
pub const CONFIG_PATH_ENV: &str = "OMNIREAD_CONFIG_PATH";

const TABLE_NAMES: [&str; 4] = ["library", "appearance", "input", "logging"];

/// Config path from the environment override, else the default location.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from the given path, falling back to defaults on error.
pub fn load_config(path: &Path) -> AppConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => {
            info!(path = %path.display(), "Loaded base config");
            data
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                "Falling back to default config: {err}"
            );
            return AppConfig::default();
        }
    };

    match parse_config(&contents) {
        Ok(cfg) => {
            debug!("Parsed configuration from disk");
            cfg
        }
        Err(err) => {
            warn!(path = %path.display(), "Invalid config TOML: {err}");
            AppConfig::default()
        }
    }
}

/// Parse either the tabled layout (`[library]`, `[appearance]`, ...) or the
/// flat one with every key at the top level.
pub fn parse_config(contents: &str) -> Result<AppConfig, toml::de::Error> {
    let raw: toml::Table = toml::from_str(contents)?;
    let tabled = TABLE_NAMES
        .iter()
        .any(|name| raw.get(*name).is_some_and(toml::Value::is_table));
    if tabled {
        let tables: ConfigTables = toml::from_str(contents)?;
        Ok(tables.into())
    } else {
        toml::from_str(contents)
    }
}

pub fn serialize_config(config: &AppConfig) -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&ConfigTables::from(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use crate::hashing::HashStrategy;
    use crate::render::LayoutMode;
    use crate::theme::ColorScheme;

    #[test]
    fn parses_flat_layout() {
        let cfg = parse_config(
            r#"
            data_dir = "/tmp/library"
            color_scheme = "sepia"
            layout_mode = "double-page"
            key_next_page = "n"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.data_dir, "/tmp/library");
        assert_eq!(cfg.color_scheme, ColorScheme::Sepia);
        assert_eq!(cfg.layout_mode, LayoutMode::DoublePage);
        assert_eq!(cfg.key_next_page, "n");
        assert_eq!(cfg.key_prev_page, "left");
    }

    #[test]
    fn parses_tabled_layout() {
        let cfg = parse_config(
            r#"
            [library]
            hash_strategy = "full"

            [appearance]
            font_scale_percent = 120
            viewport_columns = 100

            [input]
            input_debounce_ms = 40

            [logging]
            log_level = "warn"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.hash_strategy, HashStrategy::Full);
        assert_eq!(cfg.font_scale_percent, 120);
        assert_eq!(cfg.viewport().columns, 100);
        assert_eq!(cfg.input_debounce_ms, 40);
        assert_eq!(cfg.log_level, LogLevel::Warn);
        assert_eq!(cfg.data_dir, ".omniread");
    }

    #[test]
    fn serialized_config_round_trips() {
        let mut cfg = AppConfig::default();
        cfg.font_family = "Georgia".to_string();
        cfg.key_close = "ctrl+q".to_string();
        let text = serialize_config(&cfg).unwrap();
        assert!(text.contains("[appearance]"));
        assert_eq!(parse_config(&text).unwrap(), cfg);
    }

    #[test]
    fn missing_or_invalid_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(load_config(&dir.path().join("absent.toml")), AppConfig::default());

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "layout_mode = \"sideways\"").unwrap();
        assert_eq!(load_config(&bad), AppConfig::default());
    }

    #[test]
    fn default_theme_clamps_configured_scale() {
        let cfg = parse_config("font_scale_percent = 900\nfont_family = \"  \"").unwrap();
        let theme = cfg.default_theme();
        assert_eq!(theme.font_scale_percent, 200);
        assert_eq!(theme.font_family, "serif");
    }
}
