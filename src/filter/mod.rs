//! Request filter chain.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → FilterChain (registration order, scoped by UrlPattern)
//!         → remote_ip.rs (resolve client behind trusted proxies)
//!         → xss.rs (reject or escape script payloads)
//!     → path matching, negotiation, handler
//!     ← responses unwind through the filters in reverse order
//! ```
//!
//! # Design Decisions
//! - Chain is assembled once at startup and shared via Arc
//! - Filter names are unique; a collision is a startup error
//! - A filter short-circuits by returning its own response instead of
//!   calling `next`
//! - A `FilterError` is fatal for the request and becomes a 500

pub mod remote_ip;
pub mod xss;

use std::fmt;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::config::{FilterKind, PipelineConfig};
use crate::observability::metrics;

pub use remote_ip::{RemoteAddr, RemoteIpFilter};
pub use xss::XssFilter;

/// Errors raised while building the chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("filter name '{0}' is already registered")]
    DuplicateName(String),

    #[error("invalid url pattern '{0}'")]
    InvalidPattern(String),

    #[error("filter '{name}' could not be built: {reason}")]
    Build { name: String, reason: String },
}

/// Fatal error signalled by a filter while processing a request.
#[derive(Debug, Error)]
#[error("filter '{filter}' failed: {message}")]
pub struct FilterError {
    pub filter: String,
    pub message: String,
}

impl FilterError {
    pub fn new(filter: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            message: message.into(),
        }
    }
}

/// A request filter.
///
/// Implementations inspect or rewrite the request and either hand it to
/// `next` or answer it themselves.
pub trait Filter: Send + Sync + fmt::Debug {
    fn process<'a>(
        &'a self,
        request: Request<Body>,
        next: FilterNext<'a>,
    ) -> BoxFuture<'a, Result<Response, FilterError>>;
}

/// Servlet-style URL scope for a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlPattern {
    /// `/*`
    All,
    /// `/prefix/*`, matches `/prefix` and everything below it.
    Prefix(String),
    /// `*.ext`
    Extension(String),
    /// Any other absolute path, matched literally.
    Exact(String),
}

impl UrlPattern {
    pub fn parse(pattern: &str) -> Result<Self, ChainError> {
        let invalid = || ChainError::InvalidPattern(pattern.to_string());

        if pattern == "/*" {
            return Ok(Self::All);
        }
        if let Some(ext) = pattern.strip_prefix("*.") {
            if ext.is_empty() || ext.contains(['/', '*', '.']) {
                return Err(invalid());
            }
            return Ok(Self::Extension(ext.to_string()));
        }
        if !pattern.starts_with('/') {
            return Err(invalid());
        }
        if let Some(prefix) = pattern.strip_suffix("/*") {
            if prefix.contains('*') {
                return Err(invalid());
            }
            return Ok(Self::Prefix(prefix.to_string()));
        }
        if pattern.contains('*') {
            return Err(invalid());
        }
        Ok(Self::Exact(pattern.to_string()))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::All => true,
            Self::Prefix(prefix) => {
                path == prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            Self::Extension(ext) => path
                .rsplit('/')
                .next()
                .and_then(|segment| segment.rsplit_once('.'))
                .is_some_and(|(_, e)| e == ext),
            Self::Exact(exact) => path == exact,
        }
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "/*"),
            Self::Prefix(p) => write!(f, "{}/*", p),
            Self::Extension(e) => write!(f, "*.{}", e),
            Self::Exact(p) => write!(f, "{}", p),
        }
    }
}

/// A filter together with its name and scope.
#[derive(Debug)]
pub struct FilterRegistration {
    name: String,
    patterns: Vec<UrlPattern>,
    filter: Arc<dyn Filter>,
}

impl FilterRegistration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn patterns(&self) -> &[UrlPattern] {
        &self.patterns
    }

    fn applies_to(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }
}

/// Ordered, immutable list of filters applied to every request.
#[derive(Debug, Default)]
pub struct FilterChain {
    registrations: Vec<FilterRegistration>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a filter under a unique name for one or more URL patterns.
    pub fn register_filter<F, I, P>(
        &mut self,
        filter: F,
        name: impl Into<String>,
        url_patterns: I,
    ) -> Result<(), ChainError>
    where
        F: Filter + 'static,
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let name = name.into();
        if self.registrations.iter().any(|r| r.name == name) {
            return Err(ChainError::DuplicateName(name));
        }

        let patterns = url_patterns
            .into_iter()
            .map(|p| UrlPattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(
            filter = %name,
            patterns = ?patterns.iter().map(ToString::to_string).collect::<Vec<_>>(),
            position = self.registrations.len(),
            "Filter registered"
        );

        self.registrations.push(FilterRegistration {
            name,
            patterns,
            filter: Arc::new(filter),
        });
        Ok(())
    }

    /// Build the chain described by the `filters` config section.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ChainError> {
        let mut chain = Self::new();
        for registration in config.filters.iter() {
            match registration.kind {
                FilterKind::RemoteIp => {
                    let filter = RemoteIpFilter::from_config(&config.remote_ip).map_err(|e| {
                        ChainError::Build {
                            name: registration.name.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                    chain.register_filter(filter, &registration.name, &registration.url_patterns)?;
                }
                FilterKind::Xss => {
                    let filter = XssFilter::new(&registration.name, config.xss.clone());
                    chain.register_filter(filter, &registration.name, &registration.url_patterns)?;
                }
            }
        }
        Ok(chain)
    }

    pub fn registrations(&self) -> &[FilterRegistration] {
        &self.registrations
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Run the request through every applicable filter, then `next`.
    pub async fn execute(&self, request: Request<Body>, next: Next) -> Response {
        let path = request.uri().path().to_string();
        let chain = FilterNext {
            remaining: &self.registrations,
            path: &path,
            inner: next,
        };

        match chain.run(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(filter = %e.filter, error = %e.message, path = %path, "Filter failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal filter error").into_response()
            }
        }
    }
}

/// The rest of the chain, handed to each filter.
pub struct FilterNext<'a> {
    remaining: &'a [FilterRegistration],
    path: &'a str,
    inner: Next,
}

impl<'a> FilterNext<'a> {
    /// Pass the request to the next applicable filter, or the handler.
    pub fn run(self, request: Request<Body>) -> BoxFuture<'a, Result<Response, FilterError>> {
        let Self {
            mut remaining,
            path,
            inner,
        } = self;

        while let Some((first, rest)) = remaining.split_first() {
            if first.applies_to(path) {
                tracing::trace!(filter = %first.name, path = %path, "Entering filter");
                let next = FilterNext {
                    remaining: rest,
                    path,
                    inner,
                };
                return first.filter.process(request, next);
            }
            remaining = rest;
        }

        Box::pin(async move { Ok(inner.run(request).await) })
    }
}

/// Middleware entry point for the filter chain.
pub async fn filter_chain_middleware(
    State(chain): State<Arc<FilterChain>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    chain.execute(request, next).await
}

/// Record a short-circuit taken by a filter.
pub(crate) fn record_rejection(filter: &str, status: StatusCode) {
    metrics::record_filter_rejection(filter, status.as_u16());
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::get, Router};
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Debug)]
    struct Recording {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Filter for Recording {
        fn process<'a>(
            &'a self,
            request: Request<Body>,
            next: FilterNext<'a>,
        ) -> BoxFuture<'a, Result<Response, FilterError>> {
            Box::pin(async move {
                self.log.lock().unwrap().push(format!("{}:in", self.label));
                let response = next.run(request).await;
                self.log.lock().unwrap().push(format!("{}:out", self.label));
                response
            })
        }
    }

    #[derive(Debug)]
    struct Blocking;

    impl Filter for Blocking {
        fn process<'a>(
            &'a self,
            _request: Request<Body>,
            _next: FilterNext<'a>,
        ) -> BoxFuture<'a, Result<Response, FilterError>> {
            Box::pin(async { Ok((StatusCode::FORBIDDEN, "blocked").into_response()) })
        }
    }

    #[derive(Debug)]
    struct Failing;

    impl Filter for Failing {
        fn process<'a>(
            &'a self,
            _request: Request<Body>,
            _next: FilterNext<'a>,
        ) -> BoxFuture<'a, Result<Response, FilterError>> {
            Box::pin(async { Err(FilterError::new("failing", "boom")) })
        }
    }

    fn app(chain: FilterChain, log: Arc<Mutex<Vec<String>>>) -> Router {
        Router::new()
            .route(
                "/{*path}",
                get(move || {
                    let log = log.clone();
                    async move {
                        log.lock().unwrap().push("handler".to_string());
                        "ok"
                    }
                }),
            )
            .layer(middleware::from_fn_with_state(Arc::new(chain), filter_chain_middleware))
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn url_pattern_parsing() {
        assert_eq!(UrlPattern::parse("/*").unwrap(), UrlPattern::All);
        assert_eq!(UrlPattern::parse("/api/*").unwrap(), UrlPattern::Prefix("/api".into()));
        assert_eq!(UrlPattern::parse("*.do").unwrap(), UrlPattern::Extension("do".into()));
        assert_eq!(UrlPattern::parse("/login").unwrap(), UrlPattern::Exact("/login".into()));
        assert!(UrlPattern::parse("api").is_err());
        assert!(UrlPattern::parse("/a/*/b").is_err());
        assert!(UrlPattern::parse("*.").is_err());
    }

    #[test]
    fn url_pattern_matching() {
        let prefix = UrlPattern::parse("/api/*").unwrap();
        assert!(prefix.matches("/api"));
        assert!(prefix.matches("/api/users"));
        assert!(!prefix.matches("/apiary"));

        let ext = UrlPattern::parse("*.do").unwrap();
        assert!(ext.matches("/save.do"));
        assert!(!ext.matches("/save.do/more"));
        assert!(!ext.matches("/save"));

        assert!(UrlPattern::All.matches("/anything"));
    }

    #[test]
    fn duplicate_names_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = FilterChain::new();
        chain
            .register_filter(Recording { label: "a", log: log.clone() }, "dup", ["/*"])
            .unwrap();
        let err = chain
            .register_filter(Recording { label: "b", log }, "dup", ["/*"])
            .unwrap_err();
        assert_eq!(err, ChainError::DuplicateName("dup".into()));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn default_config_builds_two_filters() {
        let chain = FilterChain::from_config(&PipelineConfig::default()).unwrap();
        let names: Vec<_> = chain.registrations().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["RemoteIpFilter", "XSSFilter"]);
    }

    #[tokio::test]
    async fn filters_run_in_order_and_unwind_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = FilterChain::new();
        chain
            .register_filter(Recording { label: "first", log: log.clone() }, "first", ["/*"])
            .unwrap();
        chain
            .register_filter(Recording { label: "second", log: log.clone() }, "second", ["/*"])
            .unwrap();

        let response = app(chain, log.clone()).oneshot(get_req("/x")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:in", "second:in", "handler", "second:out", "first:out"]
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = FilterChain::new();
        chain.register_filter(Blocking, "block", ["/*"]).unwrap();
        chain
            .register_filter(Recording { label: "after", log: log.clone() }, "after", ["/*"])
            .unwrap();

        let response = app(chain, log.clone()).oneshot(get_req("/x")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_scope_filters_are_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = FilterChain::new();
        chain.register_filter(Blocking, "admin-only", ["/admin/*"]).unwrap();

        let response = app(chain, log.clone()).oneshot(get_req("/public")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*log.lock().unwrap(), vec!["handler"]);
    }

    #[tokio::test]
    async fn filter_error_is_internal_server_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = FilterChain::new();
        chain.register_filter(Failing, "failing", ["/*"]).unwrap();

        let response = app(chain, log.clone()).oneshot(get_req("/x")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(log.lock().unwrap().is_empty());
    }
}
