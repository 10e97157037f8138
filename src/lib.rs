//! Web request pipeline library.
//!
//! Filters, content negotiation, path matching and response serialization
//! for an Axum application, assembled once at startup from a TOML config.

pub mod config;
pub mod filter;
pub mod http;
pub mod lifecycle;
pub mod negotiation;
pub mod observability;
pub mod routing;
pub mod serialization;

pub use config::schema::PipelineConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
