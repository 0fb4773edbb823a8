//! Query-driven request transformer for reverse proxies.
//!
//! Requests carrying `?transformer=body|json|bearer` (parameter names are
//! configurable) are rewritten before being handed to the next handler:
//! the body is wrapped into a JSON object, `Content-Type` is forced to
//! `application/json`, and `Authorization` is set from a token parameter.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod transform;

pub use config::schema::{ProxyConfig, TransformerConfig};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use transform::{RequestTransformer, TransformError};
