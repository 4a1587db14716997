//! Error types for request dispatch.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::http::response::json_message;

/// Errors that end a dispatched request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Static origin URL could not be parsed or has no host (maps to 502)
    #[error("invalid origin {origin:?}: {reason}")]
    InvalidOrigin { origin: String, reason: String },

    /// Outgoing request could not be built (maps to 502)
    #[error("failed to build upstream request: {0}")]
    Request(#[from] axum::http::Error),

    /// Connection, DNS or protocol failure talking upstream (maps to 502)
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    /// Upstream response body could not be read (maps to 502)
    #[error("failed to read upstream body: {0}")]
    Body(#[from] axum::Error),

    /// Upstream did not answer in time (maps to 504)
    #[error("upstream timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Endpoint configuration rejected at request time (maps to 400)
    #[error("endpoint misconfigured: {0}")]
    Endpoint(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidOrigin { .. }
            | GatewayError::Request(_)
            | GatewayError::Upstream(_)
            | GatewayError::Body(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Endpoint(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Convert error to HTTP response with appropriate status code.
    ///
    /// Transport details stay in the logs; only misconfiguration messages reach the client.
    pub fn to_response(&self) -> Response {
        match self {
            GatewayError::Endpoint(message) => json_message(self.status(), message),
            _ => self.status().into_response(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.to_response()
    }
}

/// Result type alias for dispatch operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
