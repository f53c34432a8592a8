//! HTTP Digest authenticating proxy for the PrusaLink printer API.
//!
//! The kiosk UI talks plain HTTP to this proxy; the proxy performs the
//! RFC 7616 Digest handshake against the printer's embedded server and
//! caches the accepted nonce so that most requests cost a single round trip.
//!
//! # Components
//!
//! - [`challenge`]: `WWW-Authenticate` tokenizer and [`Challenge`] model
//! - [`digest`]: HA1/HA2/response computation, cnonce and nc helpers
//! - [`header`]: `Authorization` header serialization
//! - [`nonce_cache`]: process-wide cache of the last accepted challenge
//! - [`orchestrator`]: fast path / slow path handshake state machine
//! - [`passthrough`]: reqwest transport with hop-by-hop header stripping
//! - [`proxy`]: Axum-based proxy server

pub mod challenge;
pub mod digest;
pub mod error;
pub mod header;
pub mod nonce_cache;
pub mod orchestrator;
pub mod passthrough;
pub mod proxy;

pub use challenge::{Algorithm, Challenge, parse_directives};
pub use digest::{DigestInput, compute_response, format_nc, generate_cnonce};
pub use error::{DigestError, Result};
pub use header::AuthorizationHeader;
pub use nonce_cache::{NonceCache, NonceCacheEntry};
pub use orchestrator::{Credentials, DigestOrchestrator, HandshakePath, Outcome};
pub use passthrough::{Passthrough, PassthroughConfig, ProxyRequest, ProxyResponse, Upstream};
pub use proxy::{ProxyConfig, ProxyServer};
