//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::Request,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use query_transformer::config::ProxyConfig;
use query_transformer::{HttpServer, Shutdown};

/// Start a backend that answers every request with a JSON description of it.
pub async fn start_echo_backend() -> SocketAddr {
    let app = Router::new().fallback(|request: Request<Body>| async move {
        let (parts, body) = request.into_parts();
        let body = to_bytes(body, usize::MAX).await.unwrap_or_default();
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Json(json!({
            "method": parts.method.as_str(),
            "path": parts.uri.path(),
            "query": parts.uri.query(),
            "authorization": header("authorization"),
            "content_type": header("content-type"),
            "content_length": header("content-length"),
            "body": String::from_utf8_lossy(&body),
        }))
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Start the proxy in front of `backend` and return its address.
pub async fn start_proxy(mut config: ProxyConfig, backend: SocketAddr, shutdown: &Shutdown) -> SocketAddr {
    config.upstream.url = format!("http://{}", backend);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.listener.bind_address = addr.to_string();

    let server = HttpServer::new(config).unwrap();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// POST `body` through the proxy and return what the backend saw.
#[allow(dead_code)]
pub async fn send(proxy: SocketAddr, path_and_query: &str, body: &'static str) -> Value {
    let res = client()
        .post(format!("http://{}{}", proxy, path_and_query))
        .header("content-type", "text/plain")
        .header("authorization", "Basic abc")
        .body(body)
        .send()
        .await
        .expect("Proxy unreachable");
    assert_eq!(res.status(), 200);
    res.json().await.unwrap()
}
