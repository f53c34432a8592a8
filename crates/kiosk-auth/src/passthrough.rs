//! Passthrough transport for forwarding requests to the printer.
//!
//! Sends the caller's request to the fixed upstream origin, optionally with a
//! Digest `Authorization` header, and hands the raw response back. Status
//! codes are not interpreted here; the orchestrator decides what a 401 means.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::header::{AUTHORIZATION, CONNECTION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode, Url};

use crate::error::{DigestError, Result};

/// Default PrusaLink origin when the helper runs on the printer host.
pub const DEFAULT_UPSTREAM_ORIGIN: &str = "http://127.0.0.1:80";

/// Default upstream request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Headers never forwarded to the upstream.
const REQUEST_STRIPPED_HEADERS: &[&str] = &[
    "host",
    "connection",
    "authorization",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Headers never relayed back to the caller.
const RESPONSE_STRIPPED_HEADERS: &[&str] = &[
    "connection",
    "transfer-encoding",
    "www-authenticate",
    "keep-alive",
    "proxy-connection",
    "trailer",
    "upgrade",
];

/// A request as received from the caller.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Path and query, exactly as it will appear on the upstream request line.
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// An upstream response, headers untouched.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Upstream rejected (or demanded) authentication.
    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    /// Headers safe to hand back to the caller.
    pub fn relay_headers(&self) -> HeaderMap {
        strip_response_headers(&self.headers)
    }
}

/// Anything that can carry a [`ProxyRequest`] to the printer.
#[async_trait]
pub trait Upstream: Send + Sync + std::fmt::Debug {
    /// The path and query that will appear on the upstream request line for
    /// `uri`. This is the value the Digest `uri` directive must sign.
    fn request_target(&self, uri: &str) -> Result<String> {
        Ok(uri.to_string())
    }

    /// Perform one upstream call. `authorization` replaces any caller-supplied
    /// `Authorization` header.
    async fn send(
        &self,
        request: &ProxyRequest,
        authorization: Option<&str>,
    ) -> Result<ProxyResponse>;
}

/// Configuration for the passthrough client.
#[derive(Debug, Clone)]
pub struct PassthroughConfig {
    pub origin: String,
    pub timeout: Duration,
}

impl PassthroughConfig {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for PassthroughConfig {
    fn default() -> Self {
        Self {
            origin: DEFAULT_UPSTREAM_ORIGIN.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// reqwest-backed [`Upstream`].
#[derive(Debug, Clone)]
pub struct Passthrough {
    client: Client,
    config: PassthroughConfig,
}

impl Passthrough {
    /// Create with custom config.
    ///
    /// Redirects are relayed to the caller, never followed.
    pub fn with_config(config: PassthroughConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| DigestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Get the config.
    pub fn config(&self) -> &PassthroughConfig {
        &self.config
    }

    /// Full upstream URL for `uri`, after URL normalization (percent-encoding,
    /// dot segments).
    fn url_for(&self, uri: &str) -> Result<Url> {
        let origin = self.config.origin.trim_end_matches('/');
        let raw = if uri.starts_with('/') {
            format!("{}{}", origin, uri)
        } else {
            format!("{}/{}", origin, uri)
        };
        Url::parse(&raw)
            .map_err(|e| DigestError::InvalidRequest(format!("Invalid upstream URL '{}': {}", raw, e)))
    }
}

#[async_trait]
impl Upstream for Passthrough {
    fn request_target(&self, uri: &str) -> Result<String> {
        let url = self.url_for(uri)?;
        let mut target = url.path().to_string();
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }
        Ok(target)
    }

    async fn send(
        &self,
        request: &ProxyRequest,
        authorization: Option<&str>,
    ) -> Result<ProxyResponse> {
        let url = self.url_for(&request.uri)?;

        let mut headers = strip_request_headers(&request.headers);
        if let Some(value) = authorization {
            let value = HeaderValue::from_str(value).map_err(|e| {
                DigestError::InvalidRequest(format!("Invalid Authorization value: {}", e))
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let mut req = self
            .client
            .request(request.method.clone(), url)
            .headers(headers);
        if !request.body.is_empty() {
            req = req.body(request.body.clone());
        }

        let response = req.send().await.map_err(|e| {
            DigestError::UpstreamUnreachable(format!(
                "Failed to forward {} {}: {}",
                request.method, request.uri, e
            ))
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            DigestError::UpstreamUnreachable(format!("Failed to read upstream response: {}", e))
        })?;

        tracing::trace!(
            method = %request.method,
            uri = %request.uri,
            status = status.as_u16(),
            authenticated = authorization.is_some(),
            "Upstream call complete"
        );

        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }
}

/// Caller headers minus hop-by-hop headers, `host` and `authorization`.
pub fn strip_request_headers(headers: &HeaderMap) -> HeaderMap {
    strip_headers(headers, REQUEST_STRIPPED_HEADERS)
}

/// Upstream headers minus hop-by-hop headers and `www-authenticate`.
pub fn strip_response_headers(headers: &HeaderMap) -> HeaderMap {
    strip_headers(headers, RESPONSE_STRIPPED_HEADERS)
}

/// Copy `headers`, dropping `names` and anything nominated by `Connection`.
fn strip_headers(headers: &HeaderMap, names: &[&str]) -> HeaderMap {
    let nominated: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if names.contains(&name.as_str()) || nominated.contains(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}
