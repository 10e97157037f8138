//! Per-request context.
//!
//! Every request gets a [`RequestContext`] stored in its extensions and
//! installed as a task-local for the duration of the request, so code deep
//! below a handler can reach the current request without it being passed
//! down explicitly.

use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{request::Parts, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::observability::metrics;
use crate::serialization::Timestamp;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// What is known about the request currently being processed.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub path: String,
    pub received_at: Timestamp,
}

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// The context of the request running on this task, if any.
pub fn current() -> Option<RequestContext> {
    CURRENT.try_with(Clone::clone).ok()
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<RequestContext>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "Request context not available",
        ))
    }
}

/// Middleware that creates the context and scopes it around the request.
pub async fn request_context_middleware(mut request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let context = RequestContext {
        request_id,
        method: request.method().clone(),
        path: request.uri().path().to_string(),
        received_at: Timestamp::now(),
    };
    request.extensions_mut().insert(context.clone());

    let method = context.method.clone();
    let response = CURRENT.scope(context, next.run(request)).await;

    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn context_visible_inside_handler_only() {
        assert!(current().is_none());

        let app = Router::new()
            .route(
                "/ctx",
                get(|| async {
                    let ctx = current().expect("context in scope");
                    format!("{} {}", ctx.method, ctx.path)
                }),
            )
            .layer(middleware::from_fn(request_context_middleware));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/ctx")
                    .header(X_REQUEST_ID, "abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"GET /ctx");
        assert!(current().is_none());
    }

    #[test]
    fn request_ids_are_uuids() {
        let request = Request::builder().body(()).unwrap();
        let id = MakeRequestUuid.make_request_id(&request).unwrap();
        let value = id.header_value().to_str().unwrap();
        assert!(Uuid::parse_str(value).is_ok());
    }
}
