//! Response rendering.
//!
//! # Responsibilities
//! - Render aggregate responses as JSON with the reconciled status
//! - Render short JSON error messages
//!
//! # Design Decisions
//! - A zero reconciled status renders as 200
//! - Completeness is reported in a header, the body stays the plain data map

use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};

use crate::aggregate::AggregateResponse;

pub const X_GATEWAY_COMPLETED: HeaderName = HeaderName::from_static("x-gateway-completed");

/// `{"message": ...}` with the given status.
pub fn json_message(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "message": message }))).into_response()
}

/// Render a merged response.
pub fn render_aggregate(aggregate: AggregateResponse) -> Response {
    let status = match aggregate.status {
        0 => StatusCode::OK,
        code => StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    };
    let completed = if aggregate.is_complete {
        HeaderValue::from_static("true")
    } else {
        HeaderValue::from_static("false")
    };

    let mut response = (status, Json(aggregate.data)).into_response();
    response.headers_mut().insert(X_GATEWAY_COMPLETED, completed);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn aggregate(status: u16, is_complete: bool) -> AggregateResponse {
        let mut data = Map::new();
        data.insert("a".into(), json!(1));
        AggregateResponse {
            data,
            is_complete,
            status,
            missing: 0,
            failed: 0,
        }
    }

    #[test]
    fn test_zero_status_renders_ok() {
        let response = render_aggregate(aggregate(0, true));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-gateway-completed"], "true");
    }

    #[test]
    fn test_reconciled_status_is_used() {
        let response = render_aggregate(aggregate(503, false));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()["x-gateway-completed"], "false");
    }

    #[test]
    fn test_json_message() {
        let response = json_message(StatusCode::BAD_REQUEST, "nope");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["content-type"], "application/json");
    }
}
