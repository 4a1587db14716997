//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, layers, endpoint registration)
//!     → request.rs (request ID, client connection metadata)
//!     → static_proxy.rs (static origin or gateway)
//!     → [aggregate / sse endpoints]
//!     → upstream.rs (shared client, backend URLs, forwarded headers)
//!     → response.rs (JSON rendering)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod static_proxy;
pub mod upstream;

pub use request::{ClientConn, X_REQUEST_ID};
pub use server::HttpServer;
pub use static_proxy::StaticContentRouter;
