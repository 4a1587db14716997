//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed to HttpServer, which compiles routes and endpoints once
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Per-request problems (bad origins, missing SSE backends) are reported in-band, not here

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BackendConfig, EndpointConfig, EndpointKind, GatewayConfig, ListenerConfig,
    ServiceGatewayConfig, SseOptions, StaticContentConfig, StaticRouteConfig, UpstreamConfig,
};
