//! Configuration file parsing for the ESC configurator
//!
//! Supports `<config dir>/config.toml` with serial, session and simulator
//! settings. The config dir defaults to `~/.config/esc-configurator`.

pub mod settings;
pub mod types;

pub use settings::{default_config_dir, init_config_dir, load_settings, save_settings};
pub use types::*;
