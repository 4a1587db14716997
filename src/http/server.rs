//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with one handler per configured endpoint
//! - Wire up middleware (tracing, request ID, client connection, static content)
//! - Bind server to a plain or TLS listener
//! - Stop gracefully on the shutdown broadcast
//!
//! # Data Flow
//! ```text
//! Request
//!     → TraceLayer
//!     → SetRequestId / PropagateRequestId (x-request-id)
//!     → attach_client_conn (peer address, TLS flag)
//!     → static_content (reserved → gateway, static match → origin)
//!     → endpoint router
//!         aggregate: pipeline → AggregateEndpoint
//!         sse:       SseEndpoint (pipeline runs inside the session)
//!         none:      404
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware,
    response::Response,
    routing::{any, on, MethodFilter, MethodRouter},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::aggregate::{AggregateEndpoint, HttpExecutor};
use crate::config::{
    schema::parse_duration, validation::RouteRegistry, ConfigError, EndpointConfig, EndpointKind,
    GatewayConfig,
};
use crate::error::GatewayError;
use crate::http::request::{attach_client_conn, MakeRequestUuid, X_REQUEST_ID};
use crate::http::response::json_message;
use crate::http::static_proxy::{static_content, StaticContentRouter};
use crate::http::upstream::{build_client, HttpClient};
use crate::observability::metrics;
use crate::pipeline::{Pipeline, Stage};
use crate::routing::RouteTable;
use crate::sse::{sse_handler, SseEndpoint, SseSettings};

/// How long open connections (SSE streams included) may drain after shutdown.
const TLS_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Aggregate endpoint with the stages wrapped around it.
struct AggregateRoute {
    pipeline: Pipeline,
    endpoint: AggregateEndpoint,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    config: GatewayConfig,
    pipeline: Pipeline,
    client: HttpClient,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig) -> io::Result<Self> {
        Self::with_stages(config, Vec::new())
    }

    /// Create a server whose endpoints run behind `stages`, in order.
    ///
    /// Fails when the upstream CA bundle cannot be loaded.
    pub fn with_stages(config: GatewayConfig, stages: Vec<Arc<dyn Stage>>) -> io::Result<Self> {
        let client = build_client(&config.upstream)?;
        Ok(Self {
            config,
            pipeline: Pipeline::new(stages),
            client,
        })
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.build_router(false)
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Endpoints the router cannot register are skipped and logged.
    fn build_router(&self, tls: bool) -> Router {
        let mut routes = RouteRegistry::new();
        let mut router = Router::new();
        for endpoint in &self.config.endpoints {
            let rejected = routes.admit(endpoint);
            if !rejected.is_empty() {
                tracing::error!(
                    path = %endpoint.path,
                    errors = ?rejected,
                    "Endpoint not registered"
                );
                continue;
            }
            router = router.route(&endpoint.path, self.endpoint_route(endpoint));
        }
        router = router.fallback(not_found);

        let table = RouteTable::from_config(&self.config.static_content);
        if !table.is_empty() {
            let static_router = Arc::new(StaticContentRouter::new(
                table,
                self.client.clone(),
                tracing::info_span!("static_content"),
            ));
            router = router.layer(middleware::from_fn_with_state(static_router, static_content));
        }

        router
            .layer(middleware::from_fn_with_state(tls, attach_client_conn))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    fn endpoint_route(&self, endpoint: &EndpointConfig) -> MethodRouter {
        let span = tracing::info_span!("endpoint", path = %endpoint.path, kind = ?endpoint.kind);

        let handler: MethodRouter = match endpoint.kind {
            EndpointKind::Aggregate => match self.endpoint_timeout(endpoint) {
                Ok(timeout) => {
                    let executor = Arc::new(HttpExecutor::new(self.client.clone(), timeout));
                    let route = Arc::new(AggregateRoute {
                        pipeline: self.pipeline.clone(),
                        endpoint: AggregateEndpoint::new(endpoint.backends.clone(), executor, span),
                    });
                    method_route(endpoint, aggregate_handler).with_state(route)
                }
                Err(e) => misconfigured_route(endpoint, e.to_string()),
            },
            EndpointKind::Sse => match SseSettings::from_options(endpoint.sse.as_ref()) {
                Ok(settings) => {
                    let sse = Arc::new(SseEndpoint::new(
                        settings,
                        endpoint.backends.first().cloned(),
                        self.pipeline.clone(),
                        self.client.clone(),
                        span,
                    ));
                    method_route(endpoint, sse_handler).with_state(sse)
                }
                Err(e) => misconfigured_route(endpoint, e.to_string()),
            },
        };

        tracing::debug!(
            path = %endpoint.path,
            method = endpoint.method.as_deref().unwrap_or("ANY"),
            kind = ?endpoint.kind,
            backends = endpoint.backends.len(),
            "Registered endpoint"
        );
        handler
    }

    fn endpoint_timeout(&self, endpoint: &EndpointConfig) -> Result<Duration, ConfigError> {
        let Some(raw) = &endpoint.timeout else {
            return Ok(Duration::from_secs(self.config.timeouts.backend_secs));
        };
        let timeout = parse_duration(raw)?;
        if timeout.is_zero() {
            return Err(ConfigError::Duration(raw.clone()));
        }
        Ok(timeout)
    }

    /// Run the server, accepting connections on the given listener until
    /// the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            endpoints = self.config.endpoints.len(),
            static_routes = self.config.static_content.routes.len(),
            "HTTP server starting"
        );

        let app = self
            .build_router(false)
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server behind TLS. Requests are marked TLS-terminated.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(
            address = %addr,
            endpoints = self.config.endpoints.len(),
            static_routes = self.config.static_content.routes.len(),
            "HTTPS server starting"
        );

        let handle = axum_server::Handle::new();
        let draining = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received");
            draining.graceful_shutdown(Some(TLS_SHUTDOWN_GRACE));
        });

        let app = self
            .build_router(true)
            .into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Handler restricted to the endpoint's method, or any method when unset.
fn method_route<H, T, S>(endpoint: &EndpointConfig, handler: H) -> MethodRouter<S>
where
    H: axum::handler::Handler<T, S>,
    T: 'static,
    S: Clone + Send + Sync + 'static,
{
    let filter = endpoint
        .method
        .as_deref()
        .and_then(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
        .and_then(|m| MethodFilter::try_from(m).ok());
    match filter {
        Some(filter) => on(filter, handler),
        None => any(handler),
    }
}

/// Endpoint whose configuration could not be resolved; answers 400.
fn misconfigured_route(endpoint: &EndpointConfig, message: String) -> MethodRouter {
    tracing::warn!(path = %endpoint.path, error = %message, "Endpoint misconfigured");
    let message: Arc<str> = message.into();
    method_route(endpoint, misconfigured_handler).with_state(message)
}

async fn aggregate_handler(State(route): State<Arc<AggregateRoute>>, req: Request) -> Response {
    route.pipeline.run(req, &route.endpoint).await
}

async fn misconfigured_handler(State(message): State<Arc<str>>) -> Response {
    GatewayError::Endpoint(message.to_string()).to_response()
}

async fn not_found(req: Request) -> Response {
    tracing::debug!(path = %req.uri().path(), "No endpoint matched");
    metrics::record_status("gateway", StatusCode::NOT_FOUND.as_u16());
    json_message(StatusCode::NOT_FOUND, "no endpoint matched")
}
