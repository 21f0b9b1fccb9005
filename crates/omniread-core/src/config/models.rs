use crate::hashing::HashStrategy;
use crate::input::Keymap;
use crate::render::{LayoutMode, Viewport};
use crate::theme::{ColorScheme, Theme};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// High-level app configuration; deserializable from TOML.
#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "crate::config::defaults::default_data_dir")]
    pub data_dir: String,
    #[serde(default = "crate::config::defaults::default_hash_strategy")]
    pub hash_strategy: HashStrategy,
    #[serde(default = "crate::config::defaults::default_hash_sample_bytes")]
    pub hash_sample_bytes: usize,
    #[serde(default = "crate::config::defaults::default_color_scheme")]
    pub color_scheme: ColorScheme,
    #[serde(default = "crate::config::defaults::default_font_scale_percent")]
    pub font_scale_percent: u16,
    #[serde(default = "crate::config::defaults::default_font_family")]
    pub font_family: String,
    #[serde(default = "crate::config::defaults::default_layout_mode")]
    pub layout_mode: LayoutMode,
    #[serde(default = "crate::config::defaults::default_viewport_columns")]
    pub viewport_columns: u16,
    #[serde(default = "crate::config::defaults::default_viewport_rows")]
    pub viewport_rows: u16,
    #[serde(default = "crate::config::defaults::default_key_next_page")]
    pub key_next_page: String,
    #[serde(default = "crate::config::defaults::default_key_prev_page")]
    pub key_prev_page: String,
    #[serde(default = "crate::config::defaults::default_key_toggle_toc")]
    pub key_toggle_toc: String,
    #[serde(default = "crate::config::defaults::default_key_cycle_layout")]
    pub key_cycle_layout: String,
    #[serde(default = "crate::config::defaults::default_key_close")]
    pub key_close: String,
    #[serde(default = "crate::config::defaults::default_input_debounce_ms")]
    pub input_debounce_ms: u64,
    #[serde(default = "crate::config::defaults::default_log_level")]
    pub log_level: LogLevel,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            data_dir: crate::config::defaults::default_data_dir(),
            hash_strategy: crate::config::defaults::default_hash_strategy(),
            hash_sample_bytes: crate::config::defaults::default_hash_sample_bytes(),
            color_scheme: crate::config::defaults::default_color_scheme(),
            font_scale_percent: crate::config::defaults::default_font_scale_percent(),
            font_family: crate::config::defaults::default_font_family(),
            layout_mode: crate::config::defaults::default_layout_mode(),
            viewport_columns: crate::config::defaults::default_viewport_columns(),
            viewport_rows: crate::config::defaults::default_viewport_rows(),
            key_next_page: crate::config::defaults::default_key_next_page(),
            key_prev_page: crate::config::defaults::default_key_prev_page(),
            key_toggle_toc: crate::config::defaults::default_key_toggle_toc(),
            key_cycle_layout: crate::config::defaults::default_key_cycle_layout(),
            key_close: crate::config::defaults::default_key_close(),
            input_debounce_ms: crate::config::defaults::default_input_debounce_ms(),
            log_level: crate::config::defaults::default_log_level(),
        }
    }
}

impl AppConfig {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    /// Theme used until the reader has saved one of its own.
    pub fn default_theme(&self) -> Theme {
        Theme {
            color_scheme: self.color_scheme,
            font_scale_percent: self.font_scale_percent,
            font_family: self.font_family.clone(),
        }
        .sanitized()
    }

    pub fn viewport(&self) -> Viewport {
        let fallback = Viewport::default();
        Viewport {
            columns: if self.viewport_columns == 0 {
                fallback.columns
            } else {
                self.viewport_columns
            },
            rows: if self.viewport_rows == 0 {
                fallback.rows
            } else {
                self.viewport_rows
            },
        }
    }

    pub fn keymap(&self) -> Keymap {
        Keymap::new(
            &self.key_next_page,
            &self.key_prev_page,
            &self.key_toggle_toc,
            &self.key_cycle_layout,
            &self.key_close,
        )
    }

    pub fn input_debounce(&self) -> Duration {
        Duration::from_millis(self.input_debounce_ms)
    }
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
