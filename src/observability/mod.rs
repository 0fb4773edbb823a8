//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Transformer and server produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (request outcome and flag counters)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics are cheap (atomic increments) and no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
