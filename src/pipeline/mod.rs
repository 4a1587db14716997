//! Request pipeline.
//!
//! The validation, authorization and metrics stages that wrap gateway
//! endpoints live outside this crate. They plug in as [`Stage`]s and run in
//! order in front of a [`Terminal`].
//!
//! # Data Flow
//! ```text
//! Request
//!     → Stage 1 → Stage 2 → ... → Terminal
//!       (each stage either calls next.run(req) or returns its own response)
//! ```
//!
//! # Design Decisions
//! - A stage that does not call `next` aborts the request; its response is final
//! - [`CaptureBody`] is a terminal that only buffers the body and signals [`Proceed`],
//!   so a caller can tell "validated, continue" apart from "already answered"

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body, Bytes},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};

/// Default cap on buffered request bodies.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// One step of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync + 'static {
    async fn call(&self, req: Request<Body>, next: Next<'_>) -> Response;
}

/// The end of the pipeline.
#[async_trait]
pub trait Terminal: Send + Sync {
    async fn handle(&self, req: Request<Body>) -> Response;
}

/// The remainder of the pipeline after the current stage.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    terminal: &'a dyn Terminal,
}

impl Next<'_> {
    pub async fn run(self, req: Request<Body>) -> Response {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    terminal: self.terminal,
                };
                stage.call(req, next).await
            }
            None => self.terminal.handle(req).await,
        }
    }
}

/// Ordered, immutable list of stages shared by every endpoint.
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Arc<dyn Stage>]>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self {
            stages: stages.into(),
        }
    }

    /// Run every stage in order, then `terminal`.
    pub async fn run(&self, req: Request<Body>, terminal: &dyn Terminal) -> Response {
        Next {
            stages: &self.stages,
            terminal,
        }
        .run(req)
        .await
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages.len())
            .finish()
    }
}

/// Marker left on the terminal response when the pipeline ran to completion.
#[derive(Debug, Clone)]
pub struct Proceed(pub Bytes);

impl Proceed {
    /// Take the captured body if the pipeline reached the terminal.
    pub fn take(response: &mut Response) -> Option<Bytes> {
        response.extensions_mut().remove::<Proceed>().map(|p| p.0)
    }
}

/// Terminal that buffers the request body and signals [`Proceed`].
#[derive(Debug, Clone, Copy)]
pub struct CaptureBody {
    limit: usize,
}

impl CaptureBody {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl Default for CaptureBody {
    fn default() -> Self {
        Self::new(DEFAULT_BODY_LIMIT)
    }
}

#[async_trait]
impl Terminal for CaptureBody {
    async fn handle(&self, req: Request<Body>) -> Response {
        match to_bytes(req.into_body(), self.limit).await {
            Ok(body) => {
                let mut response = StatusCode::OK.into_response();
                response.extensions_mut().insert(Proceed(body));
                response
            }
            Err(e) => {
                tracing::warn!(error = %e, limit = self.limit, "Failed to buffer request body");
                StatusCode::PAYLOAD_TOO_LARGE.into_response()
            }
        }
    }
}
