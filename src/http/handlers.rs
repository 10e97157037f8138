//! Built-in diagnostic endpoints.
//!
//! `/status` reports liveness; `/echo` reflects what the pipeline made of the
//! request (resolved client, sanitized parameters, negotiated type).

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::Extension,
    http::{header, HeaderMap, Uri},
    response::Response,
    routing::get,
};
use serde::Serialize;
use url::form_urlencoded;

use crate::filter::RemoteAddr;
use crate::lifecycle::RequestContext;
use crate::negotiation::Negotiated;
use crate::routing::RouteTable;
use crate::serialization::Timestamp;

/// Process-wide facts captured at startup.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub started_at: Timestamp,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub started_at: Timestamp,
    pub now: Timestamp,
}

#[derive(Debug, Serialize)]
pub struct EchoResponse {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub client_ip: Option<String>,
    pub peer_ip: Option<String>,
    pub scheme: Option<String>,
    pub proxies: Vec<String>,
    pub media_type: &'static str,
    pub params: BTreeMap<String, String>,
    pub form: BTreeMap<String, String>,
    pub received_at: Timestamp,
}

/// Route table for the built-in endpoints.
pub fn routes() -> RouteTable {
    RouteTable::new()
        .route("/status", get(status))
        .route("/echo", get(echo).post(echo))
}

async fn status(negotiated: Negotiated, Extension(info): Extension<Arc<ServerInfo>>) -> Response {
    negotiated.render(&SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        started_at: info.started_at,
        now: Timestamp::now(),
    })
}

async fn echo(
    negotiated: Negotiated,
    context: RequestContext,
    remote: Option<Extension<RemoteAddr>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = uri
        .query()
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    let form = if is_form {
        form_urlencoded::parse(&body).into_owned().collect()
    } else {
        BTreeMap::new()
    };

    let remote = remote.map(|Extension(r)| r);

    negotiated.render(&EchoResponse {
        request_id: context.request_id,
        method: context.method.to_string(),
        path: context.path,
        client_ip: remote.as_ref().map(|r| r.ip.to_string()),
        peer_ip: remote.as_ref().map(|r| r.peer.to_string()),
        scheme: remote.as_ref().map(|r| r.scheme.to_string()),
        proxies: remote
            .as_ref()
            .map(|r| r.proxies.iter().map(ToString::to_string).collect())
            .unwrap_or_default(),
        media_type: negotiated.media_type.essence(),
        params,
        form,
        received_at: context.received_at,
    })
}
