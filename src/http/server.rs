//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Assemble the pipeline from a validated configuration
//! - Wire up middleware in order (trace, request ID, request context,
//!   filter chain, path matching, negotiation)
//! - Bind server to listener with peer address info
//! - Run context listener teardown after shutdown

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::Extension,
    http::Request,
    middleware,
    response::Response,
    ServiceExt,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::{util::BoxCloneSyncService, ServiceBuilder};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{validate_config, ConfigError, PipelineConfig};
use crate::filter::{filter_chain_middleware, FilterChain};
use crate::http::handlers::{self, ServerInfo};
use crate::lifecycle::request_context::{request_context_middleware, MakeRequestUuid};
use crate::lifecycle::{ListenerRegistry, LoggingContextListener, StartupError};
use crate::negotiation::{negotiation_middleware, NegotiationPolicy, NegotiationState};
use crate::routing::{path_match_middleware, PathMatchPolicy};
use crate::serialization::{ResponseSerializer, Timestamp};

/// The fully assembled request pipeline.
pub type PipelineService = BoxCloneSyncService<Request<Body>, Response, Infallible>;

/// HTTP server for the pipeline.
pub struct HttpServer {
    service: PipelineService,
    config: PipelineConfig,
    listeners: ListenerRegistry,
}

impl HttpServer {
    /// Create a server with the default context listeners.
    pub fn new(config: PipelineConfig) -> Result<Self, StartupError> {
        let mut listeners = ListenerRegistry::new();
        listeners.register(LoggingContextListener);
        Self::with_listeners(config, listeners)
    }

    /// Create a server with an explicit set of context listeners.
    pub fn with_listeners(
        config: PipelineConfig,
        listeners: ListenerRegistry,
    ) -> Result<Self, StartupError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let chain = Arc::new(FilterChain::from_config(&config)?);
        let serializer = Arc::new(ResponseSerializer::from_config(&config.serialization)?);
        let negotiation = NegotiationState {
            policy: Arc::new(NegotiationPolicy::from_config(&config.negotiation)),
            serializer,
            max_form_size: config.negotiation.max_form_size,
        };

        listeners.initialize_all()?;

        tracing::info!(
            filters = chain.len(),
            parameter = negotiation.policy.parameter_name(),
            default_media_type = %negotiation.policy.default_media_type(),
            suffix_pattern_match = config.path_match.use_suffix_pattern_match,
            date_format = negotiation.serializer.date_format().pattern(),
            "Pipeline assembled"
        );

        let service = Self::build_service(&config, chain, negotiation);
        Ok(Self {
            service,
            config,
            listeners,
        })
    }

    /// Build the middleware stack around the route table.
    #[allow(deprecated)]
    fn build_service(
        config: &PipelineConfig,
        chain: Arc<FilterChain>,
        negotiation: NegotiationState,
    ) -> PipelineService {
        let table = handlers::routes();
        tracing::debug!(routes = ?table.paths(), "Routes registered");
        let (router, matcher) = table.build(PathMatchPolicy::from(&config.path_match));

        let info = Arc::new(ServerInfo {
            started_at: Timestamp::now(),
        });

        let router = router
            .layer(middleware::from_fn_with_state(negotiation, negotiation_middleware))
            .layer(Extension(info))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        // Path rewriting has to wrap the router to affect dispatch, so the
        // whole stack is assembled outside of it.
        let service = ServiceBuilder::new()
            .map_response(|response: Response<_>| response.map(Body::new))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(middleware::from_fn(request_context_middleware))
            .layer(middleware::from_fn_with_state(chain, filter_chain_middleware))
            .layer(middleware::from_fn_with_state(Arc::new(matcher), path_match_middleware))
            .service(router);

        BoxCloneSyncService::new(service)
    }

    /// The assembled pipeline, for serving or direct invocation.
    pub fn service(&self) -> PipelineService {
        self.service.clone()
    }

    /// Run the server until `shutdown` fires, then tear down listeners.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .service
            .clone()
            .into_make_service_with_connect_info::<SocketAddr>();

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await;

        let failures = self.listeners.destroy_all();
        tracing::info!(listener_failures = failures, "HTTP server stopped");
        result
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}
