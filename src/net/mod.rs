//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → plain: tokio TcpListener, handed to axum::serve
//!     → TLS:   tls.rs (certificate loading) → axum-server rustls acceptor
//!     → Hand off to HTTP layer (TLS flag recorded per request)
//!
//! Outbound connection (origin, backend)
//!     → tls.rs (system roots + optional CA bundle) → hyper-rustls connector
//! ```

pub mod tls;

pub use tls::{load_client_tls, load_tls_config};
