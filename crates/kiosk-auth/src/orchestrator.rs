//! Digest handshake state machine.
//!
//! ```text
//! Idle ─▶ FastPathAttempt ─▶ Success
//!              │ 401
//!              ▼
//!         SlowPathProbe ─▶ Success (no auth needed)
//!              │ 401
//!              ▼
//!       ChallengeReceived ─▶ SlowPathAttempt ─▶ Success
//!                                   │ 401
//!                                   ▼
//!                               AuthFailed
//! ```
//!
//! The fast path is only taken when the [`NonceCache`] holds a handshake.
//! A fast-path 401 already carries the new challenge, so the slow path reuses
//! it instead of probing again. Every inbound request costs at most two
//! upstream calls.

use std::fmt;
use std::sync::Arc;

use crate::challenge::Challenge;
use crate::digest::{DigestInput, compute_response, generate_cnonce};
use crate::error::{DigestError, Result};
use crate::header::AuthorizationHeader;
use crate::nonce_cache::{NonceCache, NonceCacheEntry};
use crate::passthrough::{ProxyRequest, ProxyResponse, Upstream};

/// Upstream username and password.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Which branch of the state machine produced the relayed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePath {
    /// Cached nonce accepted.
    FastPath,
    /// Upstream answered the unauthenticated probe without a challenge.
    Unauthenticated,
    /// Full challenge/response handshake.
    SlowPath,
}

impl HandshakePath {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandshakePath::FastPath => "fast_path",
            HandshakePath::Unauthenticated => "unauthenticated",
            HandshakePath::SlowPath => "slow_path",
        }
    }
}

/// Result of one orchestrated request.
#[derive(Debug)]
pub struct Outcome {
    pub response: ProxyResponse,
    pub path: HandshakePath,
    pub upstream_calls: u8,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    FastPathAttempt,
    SlowPathProbe,
    SlowPathAttempt,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::FastPathAttempt => "fast_path_attempt",
            Phase::SlowPathProbe => "slow_path_probe",
            Phase::SlowPathAttempt => "slow_path_attempt",
        }
    }
}

/// Drives a request through the Digest handshake.
///
/// Cheap to clone; clones share the upstream and the nonce cache.
#[derive(Debug, Clone)]
pub struct DigestOrchestrator {
    upstream: Arc<dyn Upstream>,
    cache: Arc<NonceCache>,
    credentials: Arc<Credentials>,
}

impl DigestOrchestrator {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        cache: Arc<NonceCache>,
        credentials: Credentials,
    ) -> Self {
        Self {
            upstream,
            cache,
            credentials: Arc::new(credentials),
        }
    }

    /// The shared nonce cache.
    pub fn cache(&self) -> &Arc<NonceCache> {
        &self.cache
    }

    /// Run `request` through the handshake and return the response to relay.
    ///
    /// Transport failures are returned as-is; nothing is retried beyond the
    /// fast-path-then-slow-path sequence.
    pub async fn execute(&self, request: &ProxyRequest) -> Result<Outcome> {
        // Sign and send the request line exactly as the transport will emit it.
        let request = &ProxyRequest {
            uri: self.upstream.request_target(&request.uri)?,
            ..request.clone()
        };
        let mut calls = 0u8;

        let challenge_source = match self.cache.checkout() {
            Some(entry) => {
                let authorization = self.authorization_for(request, &entry);
                calls += 1;
                let response = self
                    .send(Phase::FastPathAttempt, request, Some(&authorization))
                    .await?;

                if !response.is_unauthorized() {
                    tracing::debug!(
                        method = %request.method,
                        uri = %request.uri,
                        nc = %entry.nc_hex(),
                        "Cached nonce accepted"
                    );
                    return Ok(Outcome {
                        response,
                        path: HandshakePath::FastPath,
                        upstream_calls: calls,
                    });
                }

                self.cache.invalidate(&entry.nonce);
                tracing::debug!(
                    uri = %request.uri,
                    nc = %entry.nc_hex(),
                    "Cached nonce rejected, falling back to full handshake"
                );
                response
            }
            None => {
                calls += 1;
                let probe = self.send(Phase::SlowPathProbe, request, None).await?;
                if !probe.is_unauthorized() {
                    return Ok(Outcome {
                        response: probe,
                        path: HandshakePath::Unauthenticated,
                        upstream_calls: calls,
                    });
                }
                probe
            }
        };

        let challenge = Challenge::from_headers(&challenge_source.headers)?;
        if challenge.stale {
            tracing::debug!(realm = %challenge.realm, "Upstream reported stale nonce");
        }

        let entry = NonceCacheEntry::from_challenge(&challenge);
        let authorization = self.authorization_for(request, &entry);
        self.cache.store(entry.clone());

        calls += 1;
        let response = self
            .send(Phase::SlowPathAttempt, request, Some(&authorization))
            .await?;

        if response.is_unauthorized() {
            self.cache.invalidate(&entry.nonce);
            tracing::warn!(
                method = %request.method,
                uri = %request.uri,
                realm = %entry.realm,
                username = %self.credentials.username(),
                "Upstream rejected digest credentials"
            );
            return Err(DigestError::AuthenticationFailed(format!(
                "upstream rejected credentials for user '{}' in realm '{}'",
                self.credentials.username(),
                entry.realm
            )));
        }

        Ok(Outcome {
            response,
            path: HandshakePath::SlowPath,
            upstream_calls: calls,
        })
    }

    async fn send(
        &self,
        phase: Phase,
        request: &ProxyRequest,
        authorization: Option<&str>,
    ) -> Result<ProxyResponse> {
        match self.upstream.send(request, authorization).await {
            Ok(response) => {
                tracing::trace!(
                    phase = phase.as_str(),
                    status = response.status.as_u16(),
                    "Upstream responded"
                );
                Ok(response)
            }
            Err(e) => {
                tracing::warn!(
                    phase = phase.as_str(),
                    method = %request.method,
                    uri = %request.uri,
                    error = %e,
                    "Upstream call failed"
                );
                Err(e)
            }
        }
    }

    /// Build the `Authorization` value for `request` under `entry`, with a
    /// fresh cnonce and the entry's current counter.
    fn authorization_for(&self, request: &ProxyRequest, entry: &NonceCacheEntry) -> String {
        let cnonce = generate_cnonce();
        let nc = entry.nc_hex();

        let response = compute_response(&DigestInput {
            method: request.method.as_str(),
            uri: &request.uri,
            username: &self.credentials.username,
            password: &self.credentials.password,
            realm: &entry.realm,
            nonce: &entry.nonce,
            cnonce: &cnonce,
            nc: &nc,
            qop: &entry.qop,
            algorithm: entry.algorithm,
        });

        AuthorizationHeader {
            username: &self.credentials.username,
            realm: &entry.realm,
            nonce: &entry.nonce,
            uri: &request.uri,
            qop: &entry.qop,
            cnonce: &cnonce,
            nc: &nc,
            response: &response,
            algorithm: entry.algorithm,
            opaque: entry.opaque.as_deref(),
        }
        .build()
    }
}
