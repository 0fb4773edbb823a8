//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tracing, timeout)
//!     → transform (flag-driven request rewriting)
//!     → server.rs forwarding handler → upstream
//!     → upstream response streamed back to the client
//! ```

pub mod server;

pub use server::{HttpServer, ServerError};
