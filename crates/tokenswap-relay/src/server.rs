//! HTTP server exposing the exchange endpoints.

use std::net::SocketAddr;

use axum::{
    Json, Router,
    http::{HeaderValue, Method},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{self, ExchangeState};

/// Configuration for the relay server.
#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    pub bind_addr: SocketAddr,
    /// Origins allowed by CORS. Empty disables CORS, `*` allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            cors_origins: Vec::new(),
        }
    }
}

impl RelayServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }
}

/// The token relay server.
pub struct RelayServer {
    config: RelayServerConfig,
    state: ExchangeState,
}

impl RelayServer {
    pub fn new(config: RelayServerConfig, state: ExchangeState) -> Self {
        Self { config, state }
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/swap", post(handlers::swap))
            .route("/refresh", post(handlers::refresh))
            .route("/health", get(handle_health))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if let Some(cors) = cors_layer(&self.config.cors_origins) {
            router = router.layer(cors);
        }

        router
    }

    /// Serve in the foreground until `shutdown` resolves, then drain
    /// in-flight requests.
    pub async fn run_until(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "Starting token relay");
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
        tracing::info!(addr = %local_addr, "Starting token relay");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, self.router())
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(error = %e, "Token relay stopped with error");
            }
        });
        Ok(local_addr)
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::POST, Method::GET])
            .allow_headers(Any),
    )
}

/// Handle GET /health
async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::TokenCipher;
    use crate::upstream::{UpstreamClient, UpstreamConfig};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_server(cors_origins: Vec<String>) -> RelayServer {
        let endpoint = UpstreamClient::new(
            UpstreamConfig::new("client", "secret").with_token_url("http://127.0.0.1:9/token"),
        )
        .unwrap();
        let cipher =
            TokenCipher::from_secret("aes-256-ctr", "0123456789abcdef0123456789abcdef").unwrap();
        let state = ExchangeState::new(Arc::new(endpoint), cipher, "myapp://callback");
        RelayServer::new(
            RelayServerConfig::default().with_cors_origins(cors_origins),
            state,
        )
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = test_server(Vec::new())
            .router()
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
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "ok");
        assert!(!health["version"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_swap_rejects_get() {
        let response = test_server(Vec::new())
            .router()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/swap")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let response = test_server(vec!["https://app.example.com".to_string()])
            .router()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/health")
                    .header("origin", "https://app.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "https://app.example.com"
        );
    }

    #[test]
    fn test_cors_disabled_without_origins() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["*".to_string()]).is_some());
    }

    #[test]
    fn test_server_config_default() {
        let config = RelayServerConfig::default();
        assert_eq!(config.bind_addr.port(), 3000);
        assert!(config.cors_origins.is_empty());
    }
}
