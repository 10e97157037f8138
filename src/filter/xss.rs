//! Cross-site scripting filter.
//!
//! Inspects every query parameter and, for urlencoded forms, every body
//! parameter before the request reaches a handler. Offending requests are
//! rejected with 400 or, in escape mode, rewritten with HTML-escaped values.

use std::borrow::Cow;
use std::str::FromStr;

use axum::{
    body::{Body, Bytes},
    http::{header, uri::PathAndQuery, HeaderValue, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;
use url::form_urlencoded;

use crate::config::{XssConfig, XssMode};
use crate::filter::{record_rejection, Filter, FilterError, FilterNext};
use crate::http::form;

/// Substrings that mark script injection once whitespace is removed.
const PATTERNS: &[&str] = &[
    "<script",
    "</script",
    "javascript:",
    "vbscript:",
    "data:text/html",
    "<iframe",
    "<object",
    "<embed",
    "<svg",
    "expression(",
    "eval(",
];

const SCRIPT_SCHEMES: &[&str] = &["javascript:", "vbscript:", "data:text/html"];

/// Returns true if the input carries a recognizable script payload.
pub fn contains_xss(input: &str) -> bool {
    let compact: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .flat_map(char::to_lowercase)
        .collect();

    if PATTERNS.iter().any(|p| find_at_boundary(&compact, p)) {
        return true;
    }

    // Inline handlers need a tag or an attribute break-out to execute.
    compact.contains(['<', '"', '\'']) && has_event_handler(&input.to_lowercase())
}

/// `needle` occurs in `haystack` not glued to a preceding word character.
fn find_at_boundary(haystack: &str, needle: &str) -> bool {
    let starts_alpha = needle.starts_with(|c: char| c.is_ascii_alphabetic());
    haystack.match_indices(needle).any(|(i, _)| {
        !starts_alpha
            || haystack[..i]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_ascii_alphanumeric())
    })
}

/// Detects inline handlers such as `onerror=` or `onload =`.
fn has_event_handler(lower: &str) -> bool {
    let bytes = lower.as_bytes();
    for (i, _) in lower.match_indices("on") {
        if i > 0 && bytes[i - 1].is_ascii_alphanumeric() {
            continue;
        }
        let mut j = i + 2;
        let letters_start = j;
        while j < bytes.len() && bytes[j].is_ascii_alphabetic() {
            j += 1;
        }
        if j == letters_start {
            continue;
        }
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if j < bytes.len() && bytes[j] == b'=' {
            return true;
        }
    }
    false
}

/// HTML-escape a value and neutralize script URL schemes.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '(' => out.push_str("&#40;"),
            ')' => out.push_str("&#41;"),
            _ => out.push(c),
        }
    }

    for scheme in SCRIPT_SCHEMES {
        while let Some(pos) = out.to_ascii_lowercase().find(scheme) {
            out.replace_range(pos..pos + scheme.len(), "");
        }
    }
    out
}

/// Outcome of inspecting one channel of parameters.
enum Inspection {
    Clean,
    Dirty(String),
}

fn inspect(encoded: &[u8], mode: XssMode) -> Inspection {
    let pairs: Vec<(Cow<'_, str>, Cow<'_, str>)> = form_urlencoded::parse(encoded).collect();
    if !pairs.iter().any(|(k, v)| contains_xss(k) || contains_xss(v)) {
        return Inspection::Clean;
    }
    match mode {
        XssMode::Reject => Inspection::Dirty(String::new()),
        XssMode::Escape => {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (k, v) in &pairs {
                serializer.append_pair(&sanitize(k), &sanitize(v));
            }
            Inspection::Dirty(serializer.finish())
        }
    }
}

/// Rejects or escapes script payloads in query and form parameters.
#[derive(Debug, Clone)]
pub struct XssFilter {
    name: String,
    config: XssConfig,
}

impl XssFilter {
    pub fn new(name: impl Into<String>, config: XssConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    fn reject(&self, channel: &str, path: &str) -> Response {
        tracing::warn!(filter = %self.name, channel, path = %path, "Rejected request with script payload");
        record_rejection(&self.name, StatusCode::BAD_REQUEST);
        (
            StatusCode::BAD_REQUEST,
            "Request rejected: potentially malicious content",
        )
            .into_response()
    }

    fn rewrite_query(&self, request: &mut Request<Body>, query: &str) -> Result<(), FilterError> {
        let path_and_query = if query.is_empty() {
            request.uri().path().to_string()
        } else {
            format!("{}?{}", request.uri().path(), query)
        };
        let mut parts = request.uri().clone().into_parts();
        parts.path_and_query = Some(
            PathAndQuery::from_str(&path_and_query)
                .map_err(|e| FilterError::new(&self.name, e.to_string()))?,
        );
        *request.uri_mut() =
            Uri::from_parts(parts).map_err(|e| FilterError::new(&self.name, e.to_string()))?;
        Ok(())
    }
}

impl Filter for XssFilter {
    fn process<'a>(
        &'a self,
        mut request: Request<Body>,
        next: FilterNext<'a>,
    ) -> BoxFuture<'a, Result<Response, FilterError>> {
        Box::pin(async move {
            let path = request.uri().path().to_string();

            if let Some(query) = request.uri().query().map(str::to_string) {
                if let Inspection::Dirty(escaped) = inspect(query.as_bytes(), self.config.mode) {
                    if self.config.mode == XssMode::Reject {
                        return Ok(self.reject("query", &path));
                    }
                    tracing::info!(filter = %self.name, path = %path, "Escaped query parameters");
                    self.rewrite_query(&mut request, &escaped)?;
                }
            }

            if form::is_form(request.headers()) {
                let (mut parts, body) = request.into_parts();
                let limit = self.config.max_body_size;
                let bytes = match form::read_bounded(&parts.headers, body, limit).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(filter = %self.name, error = %e, "Form body rejected");
                        record_rejection(&self.name, e.status());
                        return Ok(e.into_response());
                    }
                };

                let bytes = match inspect(&bytes, self.config.mode) {
                    Inspection::Clean => bytes,
                    Inspection::Dirty(_) if self.config.mode == XssMode::Reject => {
                        return Ok(self.reject("form", &path));
                    }
                    Inspection::Dirty(escaped) => {
                        tracing::info!(filter = %self.name, path = %path, "Escaped form parameters");
                        parts
                            .headers
                            .insert(header::CONTENT_LENGTH, HeaderValue::from(escaped.len()));
                        Bytes::from(escaped)
                    }
                };
                request = Request::from_parts(parts, Body::from(bytes));
            }

            next.run(request).await
        })
    }
}
