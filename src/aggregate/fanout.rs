//! Concurrent backend calls for aggregate endpoints.
//!
//! # Data Flow
//! ```text
//! Request (after pipeline stages)
//!     → buffer body once
//!     → execute every backend concurrently (each bounded by the endpoint timeout)
//!     → wait for all calls, keep configuration order
//!     → combine → render
//! ```
//!
//! # Design Decisions
//! - A failed call is a terminal outcome for that part; nothing here retries
//! - Transport errors and timeouts become missing parts, non-2xx answers become failed parts

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use futures_util::future::join_all;
use serde_json::{Map, Value};
use tracing::{Instrument, Span};

use crate::aggregate::combiner::{combine, AggregateResponse, PartialResponse};
use crate::config::BackendConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::http::response::render_aggregate;
use crate::http::upstream::{backend_uri, forward_headers, HttpClient};
use crate::observability::metrics;
use crate::pipeline::{Terminal, DEFAULT_BODY_LIMIT};

/// The parts of the inbound request every backend call reuses.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Performs one backend call and turns its outcome into a partial response.
///
/// `None` means the backend never produced a usable answer.
#[async_trait]
pub trait BackendExecutor: Send + Sync {
    async fn execute(&self, backend: &BackendConfig, req: &BackendRequest) -> Option<PartialResponse>;
}

/// Executor backed by the shared hyper client.
#[derive(Clone)]
pub struct HttpExecutor {
    client: HttpClient,
    timeout: Duration,
}

impl HttpExecutor {
    pub fn new(client: HttpClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn call(&self, backend: &BackendConfig, req: &BackendRequest) -> GatewayResult<(StatusCode, Bytes)> {
        let mut outgoing = Request::builder()
            .method(req.method.clone())
            .uri(backend_uri(backend, &req.uri)?)
            .body(Body::from(req.body.clone()))?;
        *outgoing.headers_mut() = req.headers.clone();

        let exchange = async {
            let response = self.client.request(outgoing).await?;
            let (parts, body) = response.into_parts();
            let body = to_bytes(Body::new(body), DEFAULT_BODY_LIMIT).await?;
            Ok::<_, GatewayError>((parts.status, body))
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl BackendExecutor for HttpExecutor {
    async fn execute(&self, backend: &BackendConfig, req: &BackendRequest) -> Option<PartialResponse> {
        match self.call(backend, req).await {
            Ok((status, body)) => Some(decode_part(backend, status, &body)),
            Err(e) => {
                tracing::warn!(backend = %backend.host, error = %e, "Backend call failed");
                None
            }
        }
    }
}

/// Turn a backend answer into a partial response.
pub fn decode_part(backend: &BackendConfig, status: StatusCode, body: &[u8]) -> PartialResponse {
    if !status.is_success() {
        let mut part = PartialResponse::failed(status.as_u16());
        if let Some(namespace) = &backend.error_namespace {
            let body = serde_json::from_slice::<Value>(body)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()));
            let mut detail = Map::new();
            detail.insert("status".into(), Value::from(status.as_u16()));
            detail.insert("body".into(), body);

            let mut data = Map::new();
            data.insert(namespace.clone(), Value::Object(detail));
            part.data = Some(data);
        }
        return part;
    }

    let data = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map,
        Ok(Value::Array(items)) => {
            let mut map = Map::new();
            map.insert("collection".into(), Value::Array(items));
            map
        }
        _ => {
            tracing::debug!(backend = %backend.host, "Backend body is not a JSON object or array");
            return PartialResponse::default();
        }
    };

    match &backend.group {
        Some(group) => {
            let mut grouped = Map::new();
            grouped.insert(group.clone(), Value::Object(data));
            PartialResponse::ok(grouped)
        }
        None => PartialResponse::ok(data),
    }
}

/// Multi-backend endpoint; the terminal of its pipeline.
pub struct AggregateEndpoint {
    backends: Vec<BackendConfig>,
    executor: Arc<dyn BackendExecutor>,
    span: Span,
}

impl AggregateEndpoint {
    pub fn new(backends: Vec<BackendConfig>, executor: Arc<dyn BackendExecutor>, span: Span) -> Self {
        Self {
            backends,
            executor,
            span,
        }
    }

    /// Call every backend concurrently; results keep configuration order.
    pub async fn fan_out(&self, req: &BackendRequest) -> Vec<Option<PartialResponse>> {
        join_all(
            self.backends
                .iter()
                .map(|backend| self.executor.execute(backend, req)),
        )
        .await
    }

    pub async fn aggregate(&self, req: &BackendRequest) -> AggregateResponse {
        combine(self.backends.len(), self.fan_out(req).await)
    }
}

#[async_trait]
impl Terminal for AggregateEndpoint {
    async fn handle(&self, req: Request<Body>) -> Response {
        let start = Instant::now();
        let (parts, body) = req.into_parts();
        let body = match to_bytes(body, DEFAULT_BODY_LIMIT).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(parent: &self.span, error = %e, "Failed to buffer request body");
                return StatusCode::PAYLOAD_TOO_LARGE.into_response();
            }
        };
        let request = BackendRequest {
            method: parts.method,
            uri: parts.uri,
            headers: forward_headers(&parts.headers),
            body,
        };

        let aggregate = self.aggregate(&request).instrument(self.span.clone()).await;
        tracing::debug!(
            parent: &self.span,
            complete = aggregate.is_complete,
            status = aggregate.status,
            missing = aggregate.missing,
            failed = aggregate.failed,
            "Aggregated backends"
        );

        metrics::record_aggregate(aggregate.is_complete);
        let response = render_aggregate(aggregate);
        metrics::record_request("aggregate", response.status().as_u16(), start);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    struct Scripted {
        answers: HashMap<&'static str, (Duration, Option<PartialResponse>)>,
    }

    #[async_trait]
    impl BackendExecutor for Scripted {
        async fn execute(&self, backend: &BackendConfig, _req: &BackendRequest) -> Option<PartialResponse> {
            let (delay, answer) = self.answers.get(backend.host.as_str())?.clone();
            tokio::time::sleep(delay).await;
            answer
        }
    }

    fn ok(value: Value) -> Option<PartialResponse> {
        match value {
            Value::Object(map) => Some(PartialResponse::ok(map)),
            _ => panic!("expected object"),
        }
    }

    fn request() -> BackendRequest {
        BackendRequest {
            method: Method::GET,
            uri: Uri::from_static("/api/users"),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    fn endpoint(hosts: &[&str], executor: Scripted) -> AggregateEndpoint {
        let backends = hosts.iter().map(|h| BackendConfig::new(*h)).collect();
        AggregateEndpoint::new(backends, Arc::new(executor), Span::none())
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_keep_config_order() {
        let executor = Scripted {
            answers: HashMap::from([
                ("a", (Duration::from_millis(300), ok(json!({"k": "a"})))),
                ("b", (Duration::from_millis(10), ok(json!({"k": "b"})))),
            ]),
        };
        let started = tokio::time::Instant::now();
        let result = endpoint(&["a", "b"], executor).aggregate(&request()).await;

        // Later configured backend wins the key even though it answered first.
        assert_eq!(Value::Object(result.data), json!({"k": "b"}));
        assert!(result.is_complete);
        // Calls ran concurrently.
        assert!(started.elapsed() < Duration::from_millis(310));
    }

    #[tokio::test]
    async fn test_missing_backend_is_incomplete() {
        let executor = Scripted {
            answers: HashMap::from([("a", (Duration::ZERO, ok(json!({"a": 1}))))]),
        };
        let result = endpoint(&["a", "gone"], executor).aggregate(&request()).await;
        assert!(!result.is_complete);
        assert_eq!(result.missing, 1);
        assert_eq!(Value::Object(result.data), json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_terminal_renders_status_and_header() {
        let executor = Scripted {
            answers: HashMap::from([
                ("a", (Duration::ZERO, ok(json!({"a": 1})))),
                ("b", (Duration::ZERO, Some(PartialResponse::failed(503)))),
            ]),
        };
        let req = Request::builder().uri("/api").body(Body::empty()).unwrap();
        let response = endpoint(&["a", "b"], executor).handle(req).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()["x-gateway-completed"], "false");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({"a": 1}));
    }

    #[test]
    fn test_decode_object_and_array() {
        let backend = BackendConfig::new("http://a");
        let part = decode_part(&backend, StatusCode::OK, br#"{"id": 7}"#);
        assert_eq!(part, ok(json!({"id": 7})).unwrap());

        let part = decode_part(&backend, StatusCode::OK, b"[1, 2]");
        assert_eq!(part, ok(json!({"collection": [1, 2]})).unwrap());
    }

    #[test]
    fn test_decode_non_json_success() {
        let backend = BackendConfig::new("http://a");
        let part = decode_part(&backend, StatusCode::OK, b"<html>");
        assert!(part.data.is_none());
        assert!(!part.is_complete);
        assert_eq!(part.status, 0);
    }

    #[test]
    fn test_decode_group() {
        let mut backend = BackendConfig::new("http://a");
        backend.group = Some("user".into());
        let part = decode_part(&backend, StatusCode::CREATED, br#"{"id": 7}"#);
        assert_eq!(part, ok(json!({"user": {"id": 7}})).unwrap());
    }

    #[test]
    fn test_decode_failure() {
        let backend = BackendConfig::new("http://a");
        let part = decode_part(&backend, StatusCode::NOT_FOUND, b"missing");
        assert_eq!(part, PartialResponse::failed(404));

        let mut backend = BackendConfig::new("http://a");
        backend.error_namespace = Some("user_error".into());
        let part = decode_part(&backend, StatusCode::NOT_FOUND, br#"{"reason": "no user"}"#);
        assert_eq!(part.status, 404);
        assert!(!part.is_complete);
        assert_eq!(
            Value::Object(part.data.unwrap()),
            json!({"user_error": {"status": 404, "body": {"reason": "no user"}}})
        );

        let part = decode_part(&backend, StatusCode::BAD_GATEWAY, b"upstream down");
        assert_eq!(
            Value::Object(part.data.unwrap()),
            json!({"user_error": {"status": 502, "body": "upstream down"}})
        );
    }
}
