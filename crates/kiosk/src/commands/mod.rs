//! CLI command handlers.

pub mod check;
pub mod serve;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;

use kiosk_auth::{Credentials, PassthroughConfig, ProxyConfig};
use kiosk_config::{KioskConfig, Settings};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file, bypassing discovery.
    pub config_path: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Upstream overrides shared by every command that talks to the printer.
#[derive(Args, Debug, Default)]
pub struct UpstreamArgs {
    /// PrusaLink origin, e.g. http://127.0.0.1:80 (overrides config and PRUSALINK_HOST)
    #[arg(long)]
    pub upstream: Option<String>,

    /// PrusaLink username (overrides config and PRUSALINK_USER)
    #[arg(long)]
    pub username: Option<String>,

    /// PrusaLink password (overrides config and PRUSALINK_PASS)
    #[arg(long)]
    pub password: Option<String>,
}

impl UpstreamArgs {
    fn apply(&self, layer: &mut KioskConfig) {
        if self.upstream.is_some() {
            layer.upstream.origin = self.upstream.clone();
        }
        if self.username.is_some() {
            layer.upstream.username = self.username.clone();
        }
        if self.password.is_some() {
            layer.upstream.password = self.password.clone();
        }
    }
}

/// Load files, apply the environment, then `overrides`, and resolve.
pub fn load_settings(ctx: &Context, overrides: KioskConfig) -> Result<Settings> {
    let loaded = kiosk_config::load_config(ctx.config_path.as_deref())?;

    for warning in &loaded.warnings {
        eprintln!("warning: {}", warning);
    }

    if ctx.verbose {
        let sources = loaded.loaded_from();
        if sources.is_empty() {
            eprintln!("No config files found, using defaults + environment + CLI args");
        } else {
            for source in sources {
                eprintln!("Loaded config: {}", source.display());
            }
        }
    }

    let mut config = loaded.config;
    kiosk_config::apply_env(&mut config).context("Invalid environment override")?;
    config.merge(overrides);

    let settings = config.resolve()?;
    tracing::debug!(?settings, "Resolved settings");
    Ok(settings)
}

/// Translate resolved settings into the proxy's configuration.
pub fn proxy_config(settings: &Settings) -> ProxyConfig {
    ProxyConfig::new(Credentials::new(&settings.username, &settings.password))
        .with_bind_addr(settings.bind_addr)
        .with_path_prefix(&settings.path_prefix)
        .with_cors(settings.cors)
        .with_max_body_size(settings.max_body_size)
        .with_passthrough(passthrough_config(settings))
}

pub fn passthrough_config(settings: &Settings) -> PassthroughConfig {
    PassthroughConfig::new(&settings.origin).with_timeout(settings.timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        let mut config = KioskConfig::new();
        config.upstream.username = Some("maker".to_string());
        config.upstream.password = Some("secret".to_string());
        config.upstream.origin = Some("http://printer.local/".to_string());
        config.server.path_prefix = Some("printer/".to_string());
        config.resolve().unwrap()
    }

    #[test]
    fn test_proxy_config_from_settings() {
        let config = proxy_config(&settings());
        assert_eq!(config.path_prefix, "/printer");
        assert_eq!(config.passthrough.origin, "http://printer.local");
        assert_eq!(config.credentials.username(), "maker");
        assert_eq!(config.bind_addr, "127.0.0.1:3000".parse().unwrap());
    }

    #[test]
    fn test_upstream_args_override() {
        let mut layer = KioskConfig::new();
        layer.upstream.username = Some("from-file".to_string());

        let args = UpstreamArgs {
            upstream: None,
            username: Some("from-cli".to_string()),
            password: None,
        };
        args.apply(&mut layer);

        assert_eq!(layer.upstream.username.as_deref(), Some("from-cli"));
        assert!(layer.upstream.origin.is_none());
    }
}
