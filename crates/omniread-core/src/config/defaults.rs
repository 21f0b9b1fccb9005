use crate::hashing::{DEFAULT_SAMPLE_BYTES, HashStrategy};
use crate::render::{LayoutMode, Viewport};
use crate::theme::{ColorScheme, Theme};

pub(crate) fn default_data_dir() -> String {
    ".omniread".to_string()
}

pub(crate) fn default_hash_strategy() -> HashStrategy {
    HashStrategy::Sampled
}

pub(crate) fn default_hash_sample_bytes() -> usize {
    DEFAULT_SAMPLE_BYTES
}

pub(crate) fn default_color_scheme() -> ColorScheme {
    ColorScheme::Dark
}

pub(crate) fn default_font_scale_percent() -> u16 {
    Theme::default().font_scale_percent
}

pub(crate) fn default_font_family() -> String {
    Theme::default().font_family
}

pub(crate) fn default_layout_mode() -> LayoutMode {
    LayoutMode::SinglePage
}

pub(crate) fn default_viewport_columns() -> u16 {
    Viewport::default().columns
}

pub(crate) fn default_viewport_rows() -> u16 {
    Viewport::default().rows
}

pub(crate) fn default_key_next_page() -> String {
    "right".to_string()
}

pub(crate) fn default_key_prev_page() -> String {
    "left".to_string()
}

pub(crate) fn default_key_toggle_toc() -> String {
    "t".to_string()
}

pub(crate) fn default_key_cycle_layout() -> String {
    "m".to_string()
}

pub(crate) fn default_key_close() -> String {
    "q".to_string()
}

pub(crate) fn default_input_debounce_ms() -> u64 {
    150
}

pub(crate) fn default_log_level() -> crate::config::LogLevel {
    crate::config::LogLevel::Debug
}
