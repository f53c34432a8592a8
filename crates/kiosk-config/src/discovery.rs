//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/kiosk/config.toml` (XDG user config)
//! 2. `./kiosk.toml` (project-local)
//! 3. Environment and CLI arguments (handled by the caller)
//!
//! An explicit `--config <path>` replaces both discovered files.

use std::path::{Path, PathBuf};

use crate::{ConfigError, KioskConfig, Result};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "kiosk.toml";

/// Default config filename within XDG config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for XDG directory resolution.
const APP_NAME: &str = "kiosk";

/// Environment variable to override the config directory.
const CONFIG_DIR_ENV: &str = "KIOSK_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: KioskConfig,
    /// Sources that were checked, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Warnings generated during loading (unreadable files, exposed passwords).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Get paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Load configuration.
///
/// With `explicit`, that single file is loaded and must exist. Otherwise the
/// user config and `./kiosk.toml` are discovered and merged.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    match explicit {
        Some(path) => {
            let config = load_config_file(path)?;
            let mut warnings = Vec::new();
            check_password_exposure(&config, path, &mut warnings);
            Ok(LoadedConfig {
                config,
                sources: vec![ConfigSource {
                    path: path.to_path_buf(),
                    loaded: true,
                }],
                warnings,
            })
        }
        None => load_config_with_options(None, None),
    }
}

/// Discover config files with explicit control over both search locations.
///
/// `config_dir` overrides both `KIOSK_CONFIG_DIR` and the platform default;
/// `project_dir` replaces the current directory.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = KioskConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<KioskConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    KioskConfig::from_toml(&contents)
}

/// Get the user config file path.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Get the config directory for kiosk.
///
/// Checks `KIOSK_CONFIG_DIR` first, then falls back to the platform default.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Try to load a discovered config file and merge it. Failures become warnings.
fn load_layer(config: &mut KioskConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        };
    }

    match load_config_file(path) {
        Ok(layer) => {
            check_password_exposure(&layer, path, warnings);
            config.merge(layer);
            ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            }
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            }
        }
    }
}

/// Warn when a file holding the printer password is readable by other users.
fn check_password_exposure(config: &KioskConfig, path: &Path, warnings: &mut Vec<String>) {
    if config.upstream.password.is_none() {
        return;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if let Ok(meta) = std::fs::metadata(path)
            && meta.permissions().mode() & 0o077 != 0
        {
            warnings.push(format!(
                "{} contains the printer password and is readable by other users. \
                 Restrict it with chmod 600 or use PRUSALINK_PASS instead.",
                path.display()
            ));
        }
    }
}
