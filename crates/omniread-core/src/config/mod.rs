//! Configuration loading for the reader.
//!
//! All user-tunable settings are centralized here and loaded from
//! `conf/config.toml` if present. Any missing or invalid entries fall back to
//! defaults so the reader can still start.

mod defaults;
mod io;
mod models;
mod tables;

pub use io::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, config_path, load_config, parse_config, serialize_config};
pub use models::{AppConfig, LogLevel};
