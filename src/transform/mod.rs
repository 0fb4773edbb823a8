//! Query-driven request transformation.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → options.rs (flag query parameter → OptionSet)
//!     → transformer.rs (body → content type → bearer)
//!         ├─ ok    → next handler
//!         └─ error → sink.rs (diagnostic line) + error response
//! ```

pub mod error;
pub mod options;
pub mod sink;
pub mod transformer;

pub use error::TransformError;
pub use options::{Flag, OptionSet};
pub use sink::{DiagnosticSink, MemorySink, StderrSink};
pub use transformer::{transform_middleware, RequestTransformer};
