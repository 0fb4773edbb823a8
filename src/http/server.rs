//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the forwarding handler
//! - Wire up middleware (request transformer, timeout, tracing)
//! - Bind server to listener
//! - Forward requests to the upstream

use std::str::FromStr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{
        uri::{Authority, PathAndQuery, Scheme},
        Request, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use url::Url;

use crate::config::ProxyConfig;
use crate::observability::metrics;
use crate::transform::RequestTransformer;

/// Error type for server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid upstream url '{0}'")]
    Upstream(String),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where forwarded requests go.
#[derive(Debug, Clone)]
struct Upstream {
    scheme: Scheme,
    authority: Authority,
}

impl Upstream {
    fn parse(raw: &str) -> Result<Self, ServerError> {
        let url = Url::parse(raw).map_err(|_| ServerError::Upstream(raw.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| ServerError::Upstream(raw.to_string()))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self {
            scheme: Scheme::from_str(url.scheme())
                .map_err(|_| ServerError::Upstream(raw.to_string()))?,
            authority: Authority::from_str(&authority)
                .map_err(|_| ServerError::Upstream(raw.to_string()))?,
        })
    }

    /// Point `uri` at the upstream, keeping path and query.
    fn rewrite(&self, uri: &Uri) -> Uri {
        let mut parts = uri.clone().into_parts();
        parts.scheme = Some(self.scheme.clone());
        parts.authority = Some(self.authority.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        Uri::from_parts(parts).unwrap_or_else(|_| uri.clone())
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    upstream: Upstream,
    client: Client<HttpConnector, Body>,
}

/// HTTP server for the transforming proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let upstream = Upstream::parse(&config.upstream.url)?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let transformer = RequestTransformer::new(
            config.middleware.transformer.clone(),
            config.middleware.name.clone(),
        );

        let state = AppState { upstream, client };
        let router = Self::build_router(&config, &transformer, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, transformer: &RequestTransformer, state: AppState) -> Router {
        let forward = Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state);

        transformer
            .wrap(forward)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// The router, for embedding into another service or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener until a
    /// message arrives on `shutdown`.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.url,
            middleware = %self.config.middleware.name,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Forward the (already transformed) request to the upstream.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (mut parts, body) = request.into_parts();
    parts.uri = state.upstream.rewrite(&parts.uri);

    tracing::debug!(method = %parts.method, uri = %parts.uri, "Forwarding request");

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            metrics::record_upstream(response.status().as_u16());
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(error = %e, "Upstream error");
            metrics::record_upstream(StatusCode::BAD_GATEWAY.as_u16());
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
