//! HTTP proxy server for the Digest-protected printer API.
//!
//! Accepts unauthenticated requests from the kiosk UI under a path prefix
//! and forwards them upstream through the [`DigestOrchestrator`].

use axum::{
    Json, Router as AxumRouter,
    body::Bytes,
    extract::{DefaultBodyLimit, OriginalUri, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{DigestError, Result};
use crate::nonce_cache::NonceCache;
use crate::orchestrator::{Credentials, DigestOrchestrator};
use crate::passthrough::{Passthrough, PassthroughConfig, ProxyRequest, ProxyResponse};

/// Default listen address of the auth helper.
pub const DEFAULT_BIND_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 3000));

/// Default path prefix routed to the printer.
pub const DEFAULT_PATH_PREFIX: &str = "/api";

/// Default max body size (256 MB); G-code uploads pass through here.
pub const DEFAULT_MAX_BODY_SIZE: usize = 256 * 1024 * 1024;

/// Error code reported for every upstream-side failure.
pub const UPSTREAM_UNAVAILABLE: &str = "upstream_unavailable";

/// Configuration for the proxy server.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind_addr: SocketAddr,
    pub path_prefix: String,
    pub enable_cors: bool,
    pub max_body_size: usize,
    pub passthrough: PassthroughConfig,
    pub credentials: Credentials,
}

impl ProxyConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR,
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            enable_cors: false,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            passthrough: PassthroughConfig::default(),
            credentials,
        }
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the routed prefix. Normalized to a leading `/` and no trailing `/`;
    /// an empty prefix routes everything except `/health`.
    pub fn with_path_prefix(mut self, prefix: &str) -> Self {
        self.path_prefix = normalize_prefix(prefix);
        self
    }

    pub fn with_cors(mut self, enabled: bool) -> Self {
        self.enable_cors = enabled;
        self
    }

    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    pub fn with_passthrough(mut self, passthrough: PassthroughConfig) -> Self {
        self.passthrough = passthrough;
        self
    }
}

/// Normalize a route prefix: `api/` → `/api`, `/` → ``.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Shared state for the proxy server.
struct ProxyState {
    orchestrator: DigestOrchestrator,
}

/// The auth helper server.
pub struct ProxyServer {
    config: ProxyConfig,
    state: Arc<ProxyState>,
}

impl ProxyServer {
    /// Create a proxy talking to the configured upstream with a fresh cache.
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let passthrough = Passthrough::with_config(config.passthrough.clone())?;
        let orchestrator = DigestOrchestrator::new(
            Arc::new(passthrough),
            Arc::new(NonceCache::new()),
            config.credentials.clone(),
        );
        Ok(Self::with_orchestrator(config, orchestrator))
    }

    /// Create a proxy around an existing orchestrator.
    pub fn with_orchestrator(config: ProxyConfig, orchestrator: DigestOrchestrator) -> Self {
        Self {
            state: Arc::new(ProxyState { orchestrator }),
            config,
        }
    }

    /// Build the axum router.
    pub fn router(&self) -> AxumRouter {
        let prefix = &self.config.path_prefix;

        let mut router = AxumRouter::new().route("/health", get(handle_health));
        router = if prefix.is_empty() {
            router.fallback(handle_proxy)
        } else {
            router
                .route(prefix, any(handle_proxy))
                .route(&format!("{}/{{*rest}}", prefix), any(handle_proxy))
        };

        let mut router = router
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        router
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(
            addr = %local_addr,
            prefix = %self.config.path_prefix,
            upstream = %self.config.passthrough.origin,
            "Starting auth helper"
        );
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }

    /// Run with graceful shutdown in a background task, returning the bound address.
    pub async fn run_with_shutdown(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "Starting auth helper");
        tokio::spawn(async move {
            axum::serve(listener, self.router())
                .with_graceful_shutdown(shutdown)
                .await
                .ok();
        });
        Ok(local_addr)
    }
}

/// Handle any request under the proxied prefix.
async fn handle_proxy(
    State(state): State<Arc<ProxyState>>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Response, ProxyError> {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    let request = ProxyRequest::new(method, target)
        .with_headers(headers)
        .with_body(body);

    let outcome = state.orchestrator.execute(&request).await?;
    tracing::debug!(
        method = %request.method,
        uri = %request.uri,
        status = outcome.response.status.as_u16(),
        path = outcome.path.as_str(),
        upstream_calls = outcome.upstream_calls,
        "Relaying upstream response"
    );

    Ok(relay(outcome.response))
}

/// Turn an upstream response into the caller's response.
fn relay(upstream: ProxyResponse) -> Response {
    let headers = upstream.relay_headers();
    let mut response = (upstream.status, upstream.body).into_response();
    // Only upstream headers are relayed; axum would otherwise add its own
    // content-type for a raw byte body.
    *response.headers_mut() = headers;
    response
}

/// Handle GET /health
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Error type for proxy responses.
#[derive(Debug)]
pub struct ProxyError(DigestError);

impl From<DigestError> for ProxyError {
    fn from(err: DigestError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let message = self.0.to_string();
        tracing::warn!(code = self.0.code(), error = %message, "Upstream request failed");

        let body = serde_json::json!({
            "error": UPSTREAM_UNAVAILABLE,
            "message": message,
        });

        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passthrough::Upstream;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderValue, Request, header};
    use parking_lot::Mutex;
    use tower::ServiceExt;

    /// Echoes the forwarded target and records the request it saw.
    #[derive(Debug, Default)]
    struct EchoUpstream {
        seen: Mutex<Vec<ProxyRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl Upstream for EchoUpstream {
        async fn send(
            &self,
            request: &ProxyRequest,
            _authorization: Option<&str>,
        ) -> Result<ProxyResponse> {
            self.seen.lock().push(request.clone());
            if self.fail {
                return Err(DigestError::UpstreamUnreachable("connection refused".into()));
            }
            let mut response = ProxyResponse::new(StatusCode::CREATED);
            response.body = Bytes::from(request.uri.clone());
            response.headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain"),
            );
            response.headers.insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Digest realm=\"r\", nonce=\"n\""),
            );
            Ok(response)
        }
    }

    fn server(upstream: Arc<EchoUpstream>, prefix: &str) -> ProxyServer {
        let credentials = Credentials::new("maker", "secret");
        let orchestrator =
            DigestOrchestrator::new(upstream, Arc::new(NonceCache::new()), credentials.clone());
        ProxyServer::with_orchestrator(
            ProxyConfig::new(credentials).with_path_prefix(prefix),
            orchestrator,
        )
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let router = server(Arc::new(EchoUpstream::default()), "/api").router();

        let response = router
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_forwards_full_path_and_query() {
        let upstream = Arc::new(EchoUpstream::default());
        let router = server(upstream.clone(), "/api").router();

        let response = router
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/v1/files/usb/model.gcode?overwrite=1")
                    .header("content-type", "application/octet-stream")
                    .header("authorization", "Basic bm9wZTpub3Bl")
                    .body(Body::from("G28\n"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );

        let seen = upstream.seen.lock().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::PUT);
        assert_eq!(seen[0].uri, "/api/v1/files/usb/model.gcode?overwrite=1");
        assert_eq!(seen[0].body, "G28\n");
        assert_eq!(
            seen[0].headers.get(header::CONTENT_TYPE).unwrap(),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn test_bare_prefix_is_proxied() {
        let upstream = Arc::new(EchoUpstream::default());
        let router = server(upstream.clone(), "api/").router();

        let response = router
            .oneshot(Request::builder().uri("/api").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(upstream.seen.lock()[0].uri, "/api");
    }

    #[tokio::test]
    async fn test_paths_outside_prefix_not_proxied() {
        let upstream = Arc::new(EchoUpstream::default());
        let router = server(upstream.clone(), "/api").router();

        let response = router
            .oneshot(Request::builder().uri("/other").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(upstream.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_empty_prefix_proxies_everything_but_health() {
        let upstream = Arc::new(EchoUpstream::default());
        let router = server(upstream.clone(), "/").router();

        let response = router
            .clone()
            .oneshot(Request::builder().uri("/other").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(upstream.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_503_json() {
        let upstream = Arc::new(EchoUpstream {
            fail: true,
            ..Default::default()
        });
        let router = server(upstream, "/api").router();

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"], UPSTREAM_UNAVAILABLE);
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .contains("connection refused")
        );
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/api"), "/api");
        assert_eq!(normalize_prefix("api/"), "/api");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/api/v1/"), "/api/v1");
    }

    #[test]
    fn test_proxy_config_defaults() {
        let config = ProxyConfig::new(Credentials::new("u", "p"));
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.path_prefix, "/api");
        assert!(!config.enable_cors);
        assert_eq!(config.max_body_size, DEFAULT_MAX_BODY_SIZE);
    }
}
