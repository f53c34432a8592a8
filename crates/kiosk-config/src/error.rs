//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and resolution.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Printer credentials not supplied by any layer.
    #[error(
        "missing PrusaLink credentials ({}): set PRUSALINK_USER and PRUSALINK_PASS, or [upstream] username/password in the config file",
        .missing.join(", ")
    )]
    MissingCredentials { missing: Vec<&'static str> },

    /// A setting is present but unusable.
    #[error("invalid value for '{field}': '{value}' ({reason})")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: String,
    },
}
