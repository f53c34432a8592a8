//! Configuration for the kiosk auth helper.
//!
//! Provides TOML-based configuration with:
//! - Config file layering (XDG user config + project-local overrides)
//! - Environment overrides using the PrusaLink variable names
//! - Resolution into concrete, validated [`Settings`]
//!
//! Missing printer credentials are a hard error at resolution time.

pub mod discovery;
pub mod env;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    xdg_config_dir, xdg_config_path,
};
pub use env::{apply_env, apply_env_with};
pub use error::{ConfigError, Result};
pub use types::*;
