//! Server-Sent-Events transport for single-backend endpoints.
//!
//! # Data Flow
//! ```text
//! handler.rs (session state machine)
//!     ├── keepalive.rs (ticker task, cancelled with the session)
//!     └── relay loop
//!             both write through event.rs (EventWriter, one lock)
//!                 → response body
//! ```

pub mod event;
pub mod handler;
pub mod keepalive;

pub use event::{EventWriter, StreamClosed};
pub use handler::{sse_handler, SessionOutcome, SseEndpoint, SseSettings};
