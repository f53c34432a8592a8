//! Configuration types.
//!
//! [`KioskConfig`] is the raw, partially filled shape of one layer (a file,
//! the environment, CLI overrides). Layers are merged field by field and the
//! result is resolved into concrete [`Settings`].

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;

use crate::{ConfigError, Result};

pub use kiosk_auth::passthrough::DEFAULT_UPSTREAM_ORIGIN as DEFAULT_ORIGIN;
pub use kiosk_auth::proxy::{DEFAULT_BIND_ADDR, DEFAULT_MAX_BODY_SIZE, DEFAULT_PATH_PREFIX};

pub const DEFAULT_TIMEOUT_SECS: u64 = kiosk_auth::passthrough::DEFAULT_TIMEOUT.as_secs();
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

/// One configuration layer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    pub upstream: UpstreamConfig,
    pub server: ServerConfig,
}

/// `[upstream]`: the PrusaLink instance and how to log in to it.
#[derive(Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub origin: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("origin", &self.origin)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// `[server]`: where the proxy listens.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path_prefix: Option<String>,
    pub cors: Option<bool>,
    pub max_body_size: Option<usize>,
    pub shutdown_grace_secs: Option<u64>,
}

impl KioskConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Merge another layer on top of this one (other takes priority).
    pub fn merge(&mut self, other: KioskConfig) {
        self.upstream.merge(other.upstream);
        self.server.merge(other.server);
    }

    /// Fill defaults and validate.
    pub fn resolve(&self) -> Result<Settings> {
        let username = non_empty(&self.upstream.username);
        let password = non_empty(&self.upstream.password);
        let (username, password) = match (username, password) {
            (Some(u), Some(p)) => (u.to_string(), p.to_string()),
            (u, p) => {
                let mut missing = Vec::new();
                if u.is_none() {
                    missing.push("username");
                }
                if p.is_none() {
                    missing.push("password");
                }
                return Err(ConfigError::MissingCredentials { missing });
            }
        };

        let origin = non_empty(&self.upstream.origin)
            .unwrap_or(DEFAULT_ORIGIN)
            .trim()
            .trim_end_matches('/')
            .to_string();
        if !(origin.starts_with("http://") || origin.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "upstream.origin",
                value: origin,
                reason: "expected an http:// or https:// URL".to_string(),
            });
        }

        let timeout_secs = self.upstream.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "upstream.timeout_secs",
                value: timeout_secs.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let ip: IpAddr = match non_empty(&self.server.host) {
            Some(host) => host.trim().parse().map_err(|e| ConfigError::InvalidValue {
                field: "server.host",
                value: host.to_string(),
                reason: format!("{}", e),
            })?,
            None => DEFAULT_BIND_ADDR.ip(),
        };
        let port = self.server.port.unwrap_or(DEFAULT_BIND_ADDR.port());

        Ok(Settings {
            origin,
            username,
            password,
            timeout: Duration::from_secs(timeout_secs),
            bind_addr: SocketAddr::new(ip, port),
            path_prefix: self
                .server
                .path_prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_PATH_PREFIX.to_string()),
            cors: self.server.cors.unwrap_or(false),
            max_body_size: self.server.max_body_size.unwrap_or(DEFAULT_MAX_BODY_SIZE),
            shutdown_grace: Duration::from_secs(
                self.server
                    .shutdown_grace_secs
                    .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
            ),
        })
    }
}

impl UpstreamConfig {
    fn merge(&mut self, other: UpstreamConfig) {
        merge_field(&mut self.origin, other.origin);
        merge_field(&mut self.username, other.username);
        merge_field(&mut self.password, other.password);
        merge_field(&mut self.timeout_secs, other.timeout_secs);
    }
}

impl ServerConfig {
    fn merge(&mut self, other: ServerConfig) {
        merge_field(&mut self.host, other.host);
        merge_field(&mut self.port, other.port);
        merge_field(&mut self.path_prefix, other.path_prefix);
        merge_field(&mut self.cors, other.cors);
        merge_field(&mut self.max_body_size, other.max_body_size);
        merge_field(&mut self.shutdown_grace_secs, other.shutdown_grace_secs);
    }
}

fn merge_field<T>(base: &mut Option<T>, other: Option<T>) {
    if other.is_some() {
        *base = other;
    }
}

/// The value, untouched, unless it is missing or blank.
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Fully resolved settings, ready to build the proxy from.
#[derive(Clone)]
pub struct Settings {
    pub origin: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
    pub bind_addr: SocketAddr,
    pub path_prefix: String,
    pub cors: bool,
    pub max_body_size: usize,
    pub shutdown_grace: Duration,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("origin", &self.origin)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("bind_addr", &self.bind_addr)
            .field("path_prefix", &self.path_prefix)
            .field("cors", &self.cors)
            .field("max_body_size", &self.max_body_size)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish()
    }
}
