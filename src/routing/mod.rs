//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → router.rs (reserved gateway patterns, then static routes in order)
//!     → matcher.rs (evaluate wildcard patterns)
//!     → Return: Dispatch::Gateway or Dispatch::Static(target)
//!
//! Route Compilation (at startup):
//!     StaticContentConfig
//!     → Compile patterns (exact strings or anchored regexes)
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: same input always matches same route
//! - First match wins (table order)

pub mod matcher;
pub mod router;

pub use matcher::{exists_in_set, matches, PathPattern};
pub use router::{Dispatch, ProxyTarget, RouteTable};
