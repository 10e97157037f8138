//! Bounded reading of urlencoded form bodies.
//!
//! Both the XSS filter and content negotiation look at form parameters
//! before the handler does, so the body is buffered once, capped, and put
//! back on the request.

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use thiserror::Error;

/// Why a form body could not be buffered.
#[derive(Debug, Error)]
pub enum FormBodyError {
    #[error("body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("body could not be read: {0}")]
    Unreadable(String),
}

impl FormBodyError {
    pub fn status(&self) -> StatusCode {
        match self {
            FormBodyError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            FormBodyError::Unreadable(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for FormBodyError {
    fn into_response(self) -> Response {
        let message = match self {
            FormBodyError::TooLarge { .. } => "Request body too large",
            FormBodyError::Unreadable(_) => "Request body could not be read",
        };
        (self.status(), message).into_response()
    }
}

/// True for `application/x-www-form-urlencoded` requests.
pub fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| {
            ct.trim()
                .to_ascii_lowercase()
                .starts_with("application/x-www-form-urlencoded")
        })
}

/// Buffer `body`, failing once more than `limit` bytes arrive.
///
/// A declared `Content-Length` over the limit fails before anything is read.
pub async fn read_bounded(
    headers: &HeaderMap,
    body: Body,
    limit: usize,
) -> Result<Bytes, FormBodyError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(FormBodyError::TooLarge { limit });
    }

    let mut stream = body.into_data_stream();
    let mut buf = Vec::with_capacity(declared.unwrap_or(0));
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FormBodyError::Unreadable(e.to_string()))?;
        if buf.len() + chunk.len() > limit {
            return Err(FormBodyError::TooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}
