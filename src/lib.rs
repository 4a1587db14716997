//! Dispatch gateway library
//!
//! Decides per request whether to reverse-proxy to a static origin, relay a
//! single backend as Server-Sent-Events, or merge several backends into one
//! JSON response.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod pipeline;
pub mod routing;

// Endpoint kinds
pub mod aggregate;
pub mod sse;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::{Next, Pipeline, Stage};
