//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Request leaving the gateway for an origin or backend:
//!     → headers.rs (bulk copy, X-Forwarded-*, X-Real-IP, hop-by-hop stripping)
//!     → hyper client
//! ```
//!
//! # Design Decisions
//! - Pure functions over header maps; safe for unrestricted concurrent use
//! - Invalid input degrades to "skip this header", never an error

pub mod headers;

pub use headers::{client_ip, propagate, strip_hop_by_hop};
