//! Route table.
//!
//! # Responsibilities
//! - Register literal handler paths
//! - Produce the Axum router and the matching PathMatcher together
//! - Answer unmatched requests with an explicit 404
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Only literal paths; the path matcher decides suffix handling
//! - Explicit NoMatch rather than silent default

use axum::{
    http::{StatusCode, Uri},
    response::IntoResponse,
    routing::MethodRouter,
    Router,
};

use crate::observability::metrics;
use crate::routing::matcher::{PathMatchPolicy, PathMatcher};

/// Builder pairing an Axum router with its literal path set.
#[derive(Default)]
pub struct RouteTable {
    router: Router,
    paths: Vec<String>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, path: &str, handler: MethodRouter) -> Self {
        self.router = self.router.route(path, handler);
        self.paths.push(path.to_string());
        self
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Freeze the table into a router (with 404 fallback) and its matcher.
    pub fn build(self, policy: PathMatchPolicy) -> (Router, PathMatcher) {
        let matcher = PathMatcher::new(policy, self.paths);
        (self.router.fallback(no_route), matcher)
    }
}

async fn no_route(uri: Uri) -> impl IntoResponse {
    tracing::warn!(path = %uri.path(), "No route matched");
    metrics::record_unmatched();
    (StatusCode::NOT_FOUND, "No matching route found")
}
