//! Request metadata.
//!
//! # Responsibilities
//! - Generate unique request IDs (UUID v4)
//! - Record the directly connected peer and whether this hop terminated TLS
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Peer address kept as a string so non-TCP transports (and test harnesses)
//!   can supply addresses without a port

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, Request},
    middleware::Next,
    response::Response,
};
use tower_http::request_id::{MakeRequestId, RequestId};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// UUID v4 request ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        id.parse().ok().map(RequestId::new)
    }
}

/// Read the request id set by the request-id layer.
pub fn request_id<B>(req: &Request<B>) -> String {
    req.headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// The directly connected client of this hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConn {
    /// Peer address, usually `ip:port`.
    pub remote_addr: String,
    /// The connection was TLS-terminated at this hop.
    pub tls: bool,
}

impl ClientConn {
    pub fn new(remote_addr: impl Into<String>, tls: bool) -> Self {
        Self {
            remote_addr: remote_addr.into(),
            tls,
        }
    }
}

/// Middleware attaching [`ClientConn`] from axum's connect info.
///
/// A `ClientConn` already present (inserted by an outer layer or a test) is kept.
pub async fn attach_client_conn(
    State(tls): State<bool>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if req.extensions().get::<ClientConn>().is_none() {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string());
        if let Some(remote_addr) = peer {
            req.extensions_mut().insert(ClientConn { remote_addr, tls });
        }
    }
    next.run(req).await
}
