//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → PipelineConfig (validated, immutable)
//!     → handed once to HttpServer::new at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no runtime re-registration
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Any validation error is fatal before the listener binds

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    FilterKind, FilterRegistrationConfig, ListenerConfig, NegotiationConfig, ObservabilityConfig,
    PathMatchConfig, PipelineConfig, RemoteIpConfig, SerializationConfig, XssConfig, XssMode,
};
pub use validation::{validate_config, ValidationError};
