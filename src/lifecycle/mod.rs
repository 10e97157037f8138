//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build pipeline → Initialize listeners → Bind
//!
//! Per request (request_context.rs):
//!     Assign request ID → Scope RequestContext → Handler → Record metrics
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     Signal received → Stop accepting → Drain → Destroy listeners (reverse)
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then pipeline, then listener
//! - Listener teardown failures are logged, never propagated

pub mod listener;
pub mod request_context;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use listener::{ContextListener, ListenerError, ListenerRegistry, LoggingContextListener};
pub use request_context::{RequestContext, X_REQUEST_ID};
pub use shutdown::Shutdown;
pub use startup::StartupError;
