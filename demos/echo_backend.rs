//! Upstream for trying the proxy by hand: prints what it receives.
//!
//! ```text
//! cargo run --example echo_backend
//! cargo run -- --upstream http://127.0.0.1:3000 --bind 127.0.0.1:8080
//! curl -d RAWSTRING 'http://127.0.0.1:8080/?transformer=body%7Cjson%7Cbearer&token=TOKENDATA'
//! ```

use axum::{body::Bytes, http::HeaderMap, Router};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let app = Router::new().fallback(|headers: HeaderMap, body: Bytes| async move {
        let mut report = String::new();
        for (name, value) in &headers {
            report.push_str(&format!("{}: {}\n", name, value.to_str().unwrap_or("<binary>")));
        }
        report.push('\n');
        report.push_str(&String::from_utf8_lossy(&body));
        println!("{report}\n---");
        report
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    println!("Echo backend listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
