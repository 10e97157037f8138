//! Parameter-driven content negotiation.
//!
//! # Responsibilities
//! - Pick the response media type from the `mediaType` query or form parameter
//! - Fall back to the default for absent or unknown values
//! - Expose the decision and the serializer to handlers
//!
//! # Design Decisions
//! - The Accept header and URL suffixes never influence the decision, so the
//!   produced type cannot disagree with a client's Accept header (no 406)
//! - Unknown values are not an error
//! - Exactly one media type per request

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::config::NegotiationConfig;
use crate::http::form;
use crate::serialization::ResponseSerializer;

/// Output representations the pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[serde(alias = "application/json")]
    Json,
    #[serde(alias = "application/xml")]
    Xml,
}

impl MediaType {
    pub fn essence(&self) -> &'static str {
        match self {
            MediaType::Json => "application/json",
            MediaType::Xml => "application/xml",
        }
    }

    /// `Content-Type` header value, charset included.
    pub fn content_type(&self) -> HeaderValue {
        match self {
            MediaType::Json => HeaderValue::from_static("application/json;charset=UTF-8"),
            MediaType::Xml => HeaderValue::from_static("application/xml;charset=UTF-8"),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.essence())
    }
}

/// Maps the discriminator parameter to a media type.
#[derive(Debug, Clone)]
pub struct NegotiationPolicy {
    parameter_name: String,
    media_types: BTreeMap<String, MediaType>,
    default: MediaType,
}

impl NegotiationPolicy {
    pub fn from_config(config: &NegotiationConfig) -> Self {
        if config.favor_path_extension {
            tracing::warn!("Path extension negotiation is not supported, ignoring favor_path_extension");
        }
        if !config.ignore_accept_header {
            tracing::warn!("Accept header negotiation is not supported, ignoring ignore_accept_header");
        }

        Self {
            parameter_name: config.parameter_name.clone(),
            media_types: config
                .media_types
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), *v))
                .collect(),
            default: config.default_media_type,
        }
    }

    pub fn parameter_name(&self) -> &str {
        &self.parameter_name
    }

    pub fn default_media_type(&self) -> MediaType {
        self.default
    }

    /// The recognized media type named in urlencoded `pairs`, if any.
    pub fn lookup(&self, pairs: &[u8]) -> Option<MediaType> {
        form_urlencoded::parse(pairs)
            .find(|(k, _)| k == self.parameter_name.as_str())
            .and_then(|(_, v)| self.media_types.get(&v.trim().to_ascii_lowercase()).copied())
    }

    /// Resolve the media type for a raw query string.
    pub fn resolve(&self, query: Option<&str>) -> MediaType {
        self.resolve_with_form(query, None)
    }

    /// Resolve from the query string first, then from a form body.
    pub fn resolve_with_form(&self, query: Option<&str>, form: Option<&[u8]>) -> MediaType {
        query
            .and_then(|q| self.lookup(q.as_bytes()))
            .or_else(|| form.and_then(|f| self.lookup(f)))
            .unwrap_or(self.default)
    }
}

impl Default for NegotiationPolicy {
    fn default() -> Self {
        Self::from_config(&NegotiationConfig::default())
    }
}

/// State shared by the negotiation middleware.
#[derive(Clone)]
pub struct NegotiationState {
    pub policy: Arc<NegotiationPolicy>,
    pub serializer: Arc<ResponseSerializer>,
    /// Cap on a form body buffered to find the parameter.
    pub max_form_size: usize,
}

/// Negotiation result handed to handlers.
#[derive(Clone)]
pub struct Negotiated {
    pub media_type: MediaType,
    serializer: Arc<ResponseSerializer>,
}

impl Negotiated {
    pub fn new(media_type: MediaType, serializer: Arc<ResponseSerializer>) -> Self {
        Self {
            media_type,
            serializer,
        }
    }

    /// Serialize `value` in the negotiated representation.
    pub fn render<T: Serialize>(&self, value: &T) -> Response {
        self.render_with_status(StatusCode::OK, value)
    }

    pub fn render_with_status<T: Serialize>(&self, status: StatusCode, value: &T) -> Response {
        self.serializer.respond(status, value, self.media_type)
    }
}

impl<S> FromRequestParts<S> for Negotiated
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Negotiated>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "Content negotiation not configured",
        ))
    }
}

/// Middleware that records the negotiated media type on the request.
///
/// The query string wins; a urlencoded body is only buffered when the query
/// does not name a recognized type.
pub async fn negotiation_middleware(
    State(state): State<NegotiationState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let from_query = request
        .uri()
        .query()
        .and_then(|q| state.policy.lookup(q.as_bytes()));

    let media_type = match from_query {
        Some(media_type) => media_type,
        None if form::is_form(request.headers()) => {
            let (parts, body) = request.into_parts();
            let bytes = match form::read_bounded(&parts.headers, body, state.max_form_size).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(error = %e, "Form body unavailable for negotiation");
                    return e.into_response();
                }
            };
            let media_type = state.policy.resolve_with_form(None, Some(&bytes[..]));
            request = Request::from_parts(parts, Body::from(bytes));
            media_type
        }
        None => state.policy.default_media_type(),
    };
    tracing::trace!(media_type = %media_type, "Negotiated response type");

    request
        .extensions_mut()
        .insert(Negotiated::new(media_type, state.serializer.clone()));
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_values_map_to_types() {
        let policy = NegotiationPolicy::default();
        assert_eq!(policy.resolve(Some("mediaType=json")), MediaType::Json);
        assert_eq!(policy.resolve(Some("mediaType=xml")), MediaType::Xml);
        assert_eq!(policy.resolve(Some("a=1&mediaType=XML")), MediaType::Xml);
    }

    #[test]
    fn absent_or_unknown_falls_back_to_json() {
        let policy = NegotiationPolicy::default();
        assert_eq!(policy.resolve(None), MediaType::Json);
        assert_eq!(policy.resolve(Some("")), MediaType::Json);
        assert_eq!(policy.resolve(Some("mediaType=yaml")), MediaType::Json);
        assert_eq!(policy.resolve(Some("mediatype=xml")), MediaType::Json);
    }

    #[test]
    fn form_body_consulted_after_query() {
        let policy = NegotiationPolicy::default();
        assert_eq!(
            policy.resolve_with_form(None, Some("mediaType=xml".as_bytes())),
            MediaType::Xml
        );
        assert_eq!(
            policy.resolve_with_form(Some("mediaType=json"), Some("mediaType=xml".as_bytes())),
            MediaType::Json
        );
        assert_eq!(
            policy.resolve_with_form(Some("page=2"), Some("a=1&mediaType=XML".as_bytes())),
            MediaType::Xml
        );
        assert_eq!(policy.resolve_with_form(None, Some("a=1".as_bytes())), MediaType::Json);
    }

    #[test]
    fn custom_default_and_parameter() {
        let mut config = NegotiationConfig::default();
        config.parameter_name = "format".into();
        config.default_media_type = MediaType::Xml;
        let policy = NegotiationPolicy::from_config(&config);

        assert_eq!(policy.resolve(None), MediaType::Xml);
        assert_eq!(policy.resolve(Some("mediaType=json")), MediaType::Xml);
        assert_eq!(policy.resolve(Some("format=json")), MediaType::Json);
    }

    #[test]
    fn media_type_deserializes_from_short_and_full_names() {
        let short: MediaType = serde_json::from_str("\"xml\"").unwrap();
        let full: MediaType = serde_json::from_str("\"application/json\"").unwrap();
        assert_eq!(short, MediaType::Xml);
        assert_eq!(full, MediaType::Json);
        assert_eq!(MediaType::Xml.to_string(), "application/xml");
    }
}
