//! Multi-backend aggregation.
//!
//! # Data Flow
//! ```text
//! Request
//!     → fanout.rs (concurrent backend calls, one PartialResponse each)
//!     → combiner.rs (merge data, reconcile completeness and status)
//!     → http::response (render JSON + X-Gateway-Completed)
//! ```

pub mod combiner;
pub mod fanout;

pub use combiner::{combine, AggregateResponse, PartialResponse};
pub use fanout::{AggregateEndpoint, BackendExecutor, BackendRequest, HttpExecutor};
