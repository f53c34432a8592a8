//! Error types for the Digest authentication proxy.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, DigestError>;

/// Errors that can occur while authenticating against the upstream.
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    /// `WWW-Authenticate` header absent or not a Digest challenge.
    #[error("Challenge parse error: {0}")]
    ChallengeParse(String),

    /// Digest challenge lacks `realm` and/or `nonce`.
    #[error("Challenge is missing required fields: {}", .missing.join(", "))]
    MissingChallengeFields { missing: Vec<&'static str> },

    /// Upstream still answered 401 to a correctly formed Digest response.
    #[error("Digest authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Network or timeout failure talking to the upstream.
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Inbound request could not be turned into an upstream request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}

impl DigestError {
    /// Short machine-readable code used in log fields.
    pub fn code(&self) -> &'static str {
        match self {
            DigestError::ChallengeParse(_) => "challenge_parse",
            DigestError::MissingChallengeFields { .. } => "missing_challenge_fields",
            DigestError::AuthenticationFailed(_) => "authentication_failed",
            DigestError::UpstreamUnreachable(_) => "upstream_unreachable",
            DigestError::InvalidRequest(_) => "invalid_request",
            DigestError::Config(_) => "config_error",
        }
    }
}
