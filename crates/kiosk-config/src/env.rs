//! Environment overrides.
//!
//! The variable names match the ones the printer's provisioning scripts
//! already export, so deployments keep working unchanged.

use crate::{ConfigError, KioskConfig, Result};

pub const ENV_USER: &str = "PRUSALINK_USER";
pub const ENV_PASS: &str = "PRUSALINK_PASS";
/// Upstream origin, e.g. `http://127.0.0.1:80`.
pub const ENV_HOST: &str = "PRUSALINK_HOST";
pub const ENV_PORT: &str = "PORT";

/// Apply overrides from the process environment.
pub fn apply_env(config: &mut KioskConfig) -> Result<()> {
    apply_env_with(config, |key| std::env::var(key).ok())
}

/// Apply overrides from `lookup`. Empty values are ignored.
pub fn apply_env_with<F>(config: &mut KioskConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(user) = get(ENV_USER) {
        config.upstream.username = Some(user);
    }
    if let Some(pass) = get(ENV_PASS) {
        config.upstream.password = Some(pass);
    }
    if let Some(origin) = get(ENV_HOST) {
        config.upstream.origin = Some(origin);
    }
    if let Some(port) = get(ENV_PORT) {
        let parsed = port
            .trim()
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "PORT",
                value: port.clone(),
                reason: e.to_string(),
            })?;
        config.server.port = Some(parsed);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = KioskConfig::from_toml(
            r#"
[upstream]
username = "file-user"
password = "file-pass"

[server]
port = 4000
"#,
        )
        .unwrap();

        apply_env_with(
            &mut config,
            lookup(&[
                (ENV_USER, "maker"),
                (ENV_PASS, "env-pass"),
                (ENV_HOST, "http://10.0.0.2"),
                (ENV_PORT, "3100"),
            ]),
        )
        .unwrap();

        let settings = config.resolve().unwrap();
        assert_eq!(settings.username, "maker");
        assert_eq!(settings.password, "env-pass");
        assert_eq!(settings.origin, "http://10.0.0.2");
        assert_eq!(settings.bind_addr.port(), 3100);
    }

    #[test]
    fn test_empty_env_values_ignored() {
        let mut config = KioskConfig::new();
        config.upstream.username = Some("file-user".to_string());

        apply_env_with(&mut config, lookup(&[(ENV_USER, ""), (ENV_PORT, "  ")])).unwrap();
        assert_eq!(config.upstream.username.as_deref(), Some("file-user"));
        assert!(config.server.port.is_none());
    }

    #[test]
    fn test_invalid_port() {
        let mut config = KioskConfig::new();
        let err = apply_env_with(&mut config, lookup(&[(ENV_PORT, "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "PORT", .. }));
    }
}
