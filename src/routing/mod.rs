//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → matcher.rs (path match policy, optional suffix rewrite)
//!     → router.rs (literal route lookup)
//!     → Return: handler response or 404 NoMatch
//!
//! Route Compilation (at startup):
//!     RouteTable::route(...)
//!     → Freeze as immutable Router + PathMatcher
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (literal set lookup)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use matcher::{path_match_middleware, PathMatchPolicy, PathMatcher};
pub use router::RouteTable;
