use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Per-request failure kinds. The message text carries the underlying ledger
/// or transport error verbatim; it is never interpreted on this side.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The ledger does not know the requested entity.
    #[error("{0}")]
    NotFound(String),
    /// The ledger rejected the call arguments.
    #[error("{0}")]
    Validation(String),
    /// The ledger endpoint could not be reached or answered with garbage.
    #[error("{0}")]
    Network(String),
    /// The contract reverted or the ledger reported a chain-level failure.
    #[error("{0}")]
    Chain(String),
    /// The submitted transaction was not included before the deadline.
    #[error("transaction confirmation timed out after {0} seconds")]
    Timeout(u64),
}

impl GatewayError {
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::NotFound(_) => "not_found",
            GatewayError::Validation(_) => "validation",
            GatewayError::Network(_) => "network",
            GatewayError::Chain(_) => "chain",
            GatewayError::Timeout(_) => "timeout",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Network(_) | GatewayError::Chain(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Network(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: self.kind(), message: self.to_string() };
        (self.status(), Json(body)).into_response()
    }
}
