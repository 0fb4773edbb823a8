//! Transformer error types.

use axum::http::StatusCode;
use thiserror::Error;

/// Failure while transforming a request. The request is answered directly
/// and never reaches the next handler.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The request body could not be read.
    #[error("{0}")]
    ReadBody(#[source] axum::Error),

    /// The wrapped body could not be serialized.
    #[error("{0}")]
    Encode(#[from] serde_json::Error),

    /// The token does not form a valid `Authorization` header value.
    #[error("invalid bearer token: {0}")]
    InvalidToken(#[from] axum::http::header::InvalidHeaderValue),
}

impl TransformError {
    /// Status code of the response sent in place of forwarding.
    pub fn status(&self) -> StatusCode {
        match self {
            TransformError::ReadBody(_) | TransformError::Encode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            TransformError::InvalidToken(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TransformError::ReadBody(_) => "read_body",
            TransformError::Encode(_) => "encode",
            TransformError::InvalidToken(_) => "invalid_token",
        }
    }
}
