//! SSE endpoint: validate through the pipeline, then relay one backend.
//!
//! # Data Flow
//! ```text
//! Request
//!     → 200 + SSE headers returned at once (body fed by EventWriter)
//!     → session task:
//!         retry frame → keep-alive ticker starts
//!         → pipeline (CaptureBody terminal)
//!             aborted  → relay aborted body, close          (Rejected)
//!             proceed  → resolve backend
//!                 missing/bad host → event: error, close   (Misconfigured)
//!                 connect failure  → event: error, close   (BackendError)
//!                 response         → [event: warning if not 200]
//!                                    → relay lines until EOF (Streaming)
//!     → keep-alive scope cancelled on every exit path      (Closed)
//! ```
//!
//! # Design Decisions
//! - The status line is committed before validation, so failures are reported in-band
//! - The backend request has no timeout; a client disconnect ends it

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::State,
    http::{header, HeaderName, HeaderValue, Request, StatusCode},
    response::Response,
};
use futures_util::TryStreamExt;
use tokio::io::{AsyncBufReadExt, AsyncReadExt};
use tokio_util::{io::StreamReader, sync::CancellationToken};
use tracing::{Instrument, Span};

use crate::config::{loader::ConfigError, schema::parse_duration, BackendConfig, SseOptions};
use crate::http::upstream::{backend_uri, forward_headers, HttpClient};
use crate::observability::metrics;
use crate::pipeline::{CaptureBody, Pipeline, Proceed, DEFAULT_BODY_LIMIT};
use crate::sse::event::{error_frame, retry_frame, warning_frame, EventWriter, WriterGuard};
use crate::sse::keepalive;

pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1000;

/// Longest backend line relayed; anything longer ends the session.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Resolved per-endpoint SSE settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SseSettings {
    pub keep_alive_interval: Duration,
    /// Client reconnect hint in milliseconds.
    pub retry_interval: u64,
}

impl Default for SseSettings {
    fn default() -> Self {
        Self {
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            retry_interval: DEFAULT_RETRY_INTERVAL_MS,
        }
    }
}

impl SseSettings {
    pub fn from_options(options: Option<&SseOptions>) -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        let Some(options) = options else {
            return Ok(settings);
        };

        if let Some(raw) = &options.keep_alive_interval {
            let interval = parse_duration(raw)?;
            if interval.is_zero() {
                return Err(ConfigError::Duration(raw.clone()));
            }
            settings.keep_alive_interval = interval;
        }
        if let Some(retry) = options.retry_interval {
            if retry <= 0 {
                return Err(ConfigError::RetryInterval(retry));
            }
            settings.retry_interval = retry as u64;
        }
        Ok(settings)
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Rejected,
    Misconfigured,
    BackendError,
    BackendDropped,
    ClientGone,
}

impl SessionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionOutcome::Completed => "completed",
            SessionOutcome::Rejected => "rejected",
            SessionOutcome::Misconfigured => "misconfigured",
            SessionOutcome::BackendError => "backend_error",
            SessionOutcome::BackendDropped => "backend_dropped",
            SessionOutcome::ClientGone => "client_gone",
        }
    }
}

/// One SSE endpoint. Only the first configured backend is relayed.
pub struct SseEndpoint {
    settings: SseSettings,
    backend: Option<BackendConfig>,
    pipeline: Pipeline,
    client: HttpClient,
    span: Span,
}

impl SseEndpoint {
    pub fn new(
        settings: SseSettings,
        backend: Option<BackendConfig>,
        pipeline: Pipeline,
        client: HttpClient,
        span: Span,
    ) -> Self {
        Self {
            settings,
            backend,
            pipeline,
            client,
            span,
        }
    }

    /// Return the SSE response right away and run the session in the background.
    pub fn serve(self: &Arc<Self>, req: Request<Body>) -> Response {
        let start = Instant::now();
        let (writer, body) = EventWriter::channel();
        let endpoint = Arc::clone(self);
        tokio::spawn(
            async move {
                metrics::sse_session_opened();
                let outcome = endpoint.run(req, &writer).await;
                tracing::debug!(outcome = outcome.as_str(), "SSE session closed");
                metrics::sse_session_closed(outcome.as_str());
            }
            .instrument(self.span.clone()),
        );

        metrics::record_request("sse", StatusCode::OK.as_u16(), start);
        event_stream_response(body)
    }

    async fn run(&self, req: Request<Body>, writer: &EventWriter) -> SessionOutcome {
        if writer.write(retry_frame(self.settings.retry_interval)).await.is_err() {
            return SessionOutcome::ClientGone;
        }

        let keepalive_scope = CancellationToken::new();
        keepalive::spawn(
            writer.clone(),
            self.settings.keep_alive_interval,
            keepalive_scope.clone(),
        );
        let _keepalive_guard = keepalive_scope.drop_guard();

        let method = req.method().clone();
        let uri = req.uri().clone();
        let headers = forward_headers(req.headers());

        let mut validated = self.pipeline.run(req, &CaptureBody::default()).await;
        let Some(body) = Proceed::take(&mut validated) else {
            tracing::info!(status = %validated.status(), "SSE request rejected");
            relay_rejection(validated, writer).await;
            return SessionOutcome::Rejected;
        };

        let Some(backend) = &self.backend else {
            tracing::warn!("SSE endpoint has no backend configured");
            let _ = writer.write(error_frame("no backend configured")).await;
            return SessionOutcome::Misconfigured;
        };
        let target = match backend_uri(backend, &uri) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(error = %e, "SSE backend host is not usable");
                let _ = writer.write(error_frame("backend host is not reachable")).await;
                return SessionOutcome::Misconfigured;
            }
        };

        let mut outgoing = match Request::builder()
            .method(method)
            .uri(target.clone())
            .body(Body::from(body))
        {
            Ok(outgoing) => outgoing,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build SSE backend request");
                let _ = writer.write(error_frame("backend request could not be built")).await;
                return SessionOutcome::Misconfigured;
            }
        };
        *outgoing.headers_mut() = headers;

        tracing::debug!(backend = %target, "Connecting to SSE backend");
        let response = tokio::select! {
            response = self.client.request(outgoing) => response,
            _ = writer.closed() => return SessionOutcome::ClientGone,
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(backend = %target, error = %e, "SSE backend connection failed");
                let _ = writer.write(error_frame("backend connection failed")).await;
                return SessionOutcome::BackendError;
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            tracing::info!(backend = %target, status = %status, "SSE backend answered with non-200 status");
            let message = format!("backend responded with status {}", status.as_u16());
            if writer.write(warning_frame(&message)).await.is_err() {
                return SessionOutcome::ClientGone;
            }
        }

        relay(Body::new(response.into_body()), writer).await
    }
}

/// Axum handler for SSE endpoints.
pub async fn sse_handler(State(endpoint): State<Arc<SseEndpoint>>, req: Request<Body>) -> Response {
    endpoint.serve(req)
}

fn event_stream_response(body: Body) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(X_ACCEL_BUFFERING, HeaderValue::from_static("no"));
    response
}

/// Write whatever the aborting stage answered into the open stream.
async fn relay_rejection(response: Response, writer: &EventWriter) {
    match to_bytes(response.into_body(), DEFAULT_BODY_LIMIT).await {
        Ok(body) if !body.is_empty() => {
            let _ = writer.write(body).await;
        }
        Ok(_) => {}
        Err(e) => tracing::debug!(error = %e, "Failed to read rejection body"),
    }
}

/// Copy backend lines verbatim until EOF.
///
/// The writer lock is held from the first line of an event to its blank-line
/// terminator, so keep-alive comments only land between events. A line longer
/// than [`MAX_LINE_BYTES`] is dropped and reported as an error event.
async fn relay(body: Body, writer: &EventWriter) -> SessionOutcome {
    let stream = Box::pin(body.into_data_stream().map_err(io::Error::other));
    let mut reader = StreamReader::new(stream);
    let mut line = Vec::new();
    let mut guard: Option<WriterGuard<'_>> = None;

    loop {
        line.clear();
        let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64);
        let read = tokio::select! {
            read = limited.read_until(b'\n', &mut line) => read,
            _ = writer.closed() => return SessionOutcome::ClientGone,
        };

        match read {
            Ok(0) => return SessionOutcome::Completed,
            Ok(n) if n == MAX_LINE_BYTES && !line.ends_with(b"\n") => {
                tracing::warn!(limit = MAX_LINE_BYTES, "SSE backend line too long");
                let frame = error_frame("backend event too large");
                match guard.as_mut() {
                    // Close the partial event first.
                    Some(held) => {
                        if held.write(Bytes::from_static(b"\n")).await.is_ok() {
                            let _ = held.write(frame).await;
                        }
                    }
                    None => {
                        let _ = writer.write(frame).await;
                    }
                }
                return SessionOutcome::BackendDropped;
            }
            Ok(_) => {
                let end_of_event = line == b"\n" || line == b"\r\n";
                if guard.is_none() {
                    guard = Some(writer.lock().await);
                }
                if let Some(held) = guard.as_mut() {
                    if held.write(Bytes::copy_from_slice(&line)).await.is_err() {
                        return SessionOutcome::ClientGone;
                    }
                }
                if end_of_event {
                    guard = None;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SSE backend stream ended with an error");
                return SessionOutcome::BackendDropped;
            }
        }
    }
}
