//! Static-content dispatch.
//!
//! # Responsibilities
//! - Decide per request: gateway pipeline or static origin
//! - Forward static requests with the original path and query
//! - Overlay forwarding headers, rewrite `Host`, strip hop-by-hop headers
//!
//! # Design Decisions
//! - Gateway-reserved paths always reach the gateway
//! - Unparsable origins answer 502 without touching the network
//! - Transport failures answer 502; nothing is retried
//! - Bodies stream in both directions

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, Span};

use crate::error::{GatewayError, GatewayResult};
use crate::http::request::request_id;
use crate::http::upstream::{origin_uri, parse_origin, HttpClient};
use crate::observability::metrics;
use crate::routing::{Dispatch, ProxyTarget, RouteTable};
use crate::security::{propagate, strip_hop_by_hop};

/// Routes requests to static origins ahead of the gateway endpoints.
pub struct StaticContentRouter {
    table: RouteTable,
    client: HttpClient,
    span: Span,
}

impl StaticContentRouter {
    pub fn new(table: RouteTable, client: HttpClient, span: Span) -> Self {
        Self { table, client, span }
    }

    /// Reverse-proxy `req` to `target`.
    pub async fn forward(&self, target: &ProxyTarget, req: Request) -> GatewayResult<Response> {
        let origin = parse_origin(&target.service_host)?;
        let (parts, body) = req.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri = origin_uri(&origin, path_and_query)?;

        let mut outgoing = Request::builder()
            .method(parts.method.clone())
            .uri(uri)
            .body(body)?;

        let authority = outgoing.uri().authority().map(|a| a.as_str().to_string());
        let headers = outgoing.headers_mut();
        propagate(headers, &parts);
        if let Some(host) = authority.and_then(|a| HeaderValue::from_str(&a).ok()) {
            headers.insert(header::HOST, host);
        }
        if !target.keep_unsafe_headers {
            strip_hop_by_hop(headers);
        }

        let response = self.client.request(outgoing).await?;
        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

/// Middleware: static origins first, everything else continues to the gateway.
pub async fn static_content(
    State(router): State<Arc<StaticContentRouter>>,
    req: Request,
    next: Next,
) -> Response {
    let target = match router.table.dispatch(req.uri().path()) {
        Dispatch::Gateway => return next.run(req).await,
        Dispatch::Static(target) => target,
    };

    let start = Instant::now();
    let request_id = request_id(&req);
    let path = req.uri().path().to_string();

    let response = match router.forward(target, req).instrument(router.span.clone()).await {
        Ok(response) => {
            tracing::debug!(
                parent: &router.span,
                request_id = %request_id,
                path = %path,
                origin = %target.service_host,
                status = %response.status(),
                "Forwarded to static origin"
            );
            metrics::record_static_proxy("forwarded");
            response
        }
        Err(e) => {
            tracing::warn!(
                parent: &router.span,
                request_id = %request_id,
                path = %path,
                origin = %target.service_host,
                error = %e,
                "Static origin request failed"
            );
            let outcome = match e {
                GatewayError::InvalidOrigin { .. } => "invalid_origin",
                _ => "upstream_error",
            };
            metrics::record_static_proxy(outcome);
            e.to_response()
        }
    };

    metrics::record_request("static", response.status().as_u16(), start);
    response
}
