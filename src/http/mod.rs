//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → lifecycle::request_context (request ID, task-local context)
//!     → filter chain (remote IP, XSS)
//!     → routing (path match policy, route lookup)
//!     → negotiation (media type from `mediaType`)
//!     → handlers.rs
//!     → serialization (JSON/XML body)
//!     → Send to client
//! ```

pub mod form;
pub mod handlers;
pub mod server;

pub use server::{HttpServer, PipelineService};
