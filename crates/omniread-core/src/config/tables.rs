use super::defaults;
use super::models::{AppConfig, LogLevel};
use crate::hashing::HashStrategy;
use crate::render::LayoutMode;
use crate::theme::ColorScheme;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub(super) struct ConfigTables {
    #[serde(default)]
    library: LibraryConfig,
    #[serde(default)]
    appearance: AppearanceConfig,
    #[serde(default)]
    input: InputConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

impl From<ConfigTables> for AppConfig {
    fn from(tables: ConfigTables) -> Self {
        AppConfig {
            data_dir: tables.library.data_dir,
            hash_strategy: tables.library.hash_strategy,
            hash_sample_bytes: tables.library.hash_sample_bytes,
            color_scheme: tables.appearance.color_scheme,
            font_scale_percent: tables.appearance.font_scale_percent,
            font_family: tables.appearance.font_family,
            layout_mode: tables.appearance.layout_mode,
            viewport_columns: tables.appearance.viewport_columns,
            viewport_rows: tables.appearance.viewport_rows,
            key_next_page: tables.input.key_next_page,
            key_prev_page: tables.input.key_prev_page,
            key_toggle_toc: tables.input.key_toggle_toc,
            key_cycle_layout: tables.input.key_cycle_layout,
            key_close: tables.input.key_close,
            input_debounce_ms: tables.input.input_debounce_ms,
            log_level: tables.logging.log_level,
        }
    }
}

impl From<&AppConfig> for ConfigTables {
    fn from(config: &AppConfig) -> Self {
        ConfigTables {
            library: LibraryConfig {
                data_dir: config.data_dir.clone(),
                hash_strategy: config.hash_strategy,
                hash_sample_bytes: config.hash_sample_bytes,
            },
            appearance: AppearanceConfig {
                color_scheme: config.color_scheme,
                font_scale_percent: config.font_scale_percent,
                font_family: config.font_family.clone(),
                layout_mode: config.layout_mode,
                viewport_columns: config.viewport_columns,
                viewport_rows: config.viewport_rows,
            },
            input: InputConfig {
                key_next_page: config.key_next_page.clone(),
                key_prev_page: config.key_prev_page.clone(),
                key_toggle_toc: config.key_toggle_toc.clone(),
                key_cycle_layout: config.key_cycle_layout.clone(),
                key_close: config.key_close.clone(),
                input_debounce_ms: config.input_debounce_ms,
            },
            logging: LoggingConfig {
                log_level: config.log_level,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct LibraryConfig {
    #[serde(default = "defaults::default_data_dir")]
    data_dir: String,
    #[serde(default = "defaults::default_hash_strategy")]
    hash_strategy: HashStrategy,
    #[serde(default = "defaults::default_hash_sample_bytes")]
    hash_sample_bytes: usize,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        LibraryConfig {
            data_dir: defaults::default_data_dir(),
            hash_strategy: defaults::default_hash_strategy(),
            hash_sample_bytes: defaults::default_hash_sample_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct AppearanceConfig {
    #[serde(default = "defaults::default_color_scheme")]
    color_scheme: ColorScheme,
    #[serde(default = "defaults::default_font_scale_percent")]
    font_scale_percent: u16,
    #[serde(default = "defaults::default_font_family")]
    font_family: String,
    #[serde(default = "defaults::default_layout_mode")]
    layout_mode: LayoutMode,
    #[serde(default = "defaults::default_viewport_columns")]
    viewport_columns: u16,
    #[serde(default = "defaults::default_viewport_rows")]
    viewport_rows: u16,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        AppearanceConfig {
            color_scheme: defaults::default_color_scheme(),
            font_scale_percent: defaults::default_font_scale_percent(),
            font_family: defaults::default_font_family(),
            layout_mode: defaults::default_layout_mode(),
            viewport_columns: defaults::default_viewport_columns(),
            viewport_rows: defaults::default_viewport_rows(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct InputConfig {
    #[serde(default = "defaults::default_key_next_page")]
    key_next_page: String,
    #[serde(default = "defaults::default_key_prev_page")]
    key_prev_page: String,
    #[serde(default = "defaults::default_key_toggle_toc")]
    key_toggle_toc: String,
    #[serde(default = "defaults::default_key_cycle_layout")]
    key_cycle_layout: String,
    #[serde(default = "defaults::default_key_close")]
    key_close: String,
    #[serde(default = "defaults::default_input_debounce_ms")]
    input_debounce_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            key_next_page: defaults::default_key_next_page(),
            key_prev_page: defaults::default_key_prev_page(),
            key_toggle_toc: defaults::default_key_toggle_toc(),
            key_cycle_layout: defaults::default_key_cycle_layout(),
            key_close: defaults::default_key_close(),
            input_debounce_ms: defaults::default_input_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct LoggingConfig {
    #[serde(default = "defaults::default_log_level")]
    log_level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_level: defaults::default_log_level(),
        }
    }
}
