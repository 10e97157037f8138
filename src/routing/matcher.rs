//! Path matching policy.
//!
//! # Responsibilities
//! - Decide whether `/resource.ext` may match the route `/resource`
//! - Rewrite the request path before dispatch when suffix matching applies
//!
//! # Design Decisions
//! - Suffix matching is off by default: the full literal path, dot suffix
//!   included, must equal a registered route
//! - Path matching is case-sensitive
//! - A literal route always wins over a stripped suffix

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{uri::PathAndQuery, Request, Uri},
    middleware::Next,
    response::Response,
};

use crate::config::PathMatchConfig;

/// Whether a trailing `.suffix` is stripped for route matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathMatchPolicy {
    pub use_suffix_pattern_match: bool,
}

impl From<&PathMatchConfig> for PathMatchPolicy {
    fn from(config: &PathMatchConfig) -> Self {
        Self {
            use_suffix_pattern_match: config.use_suffix_pattern_match,
        }
    }
}

/// Resolves request paths against the registered literal routes.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    policy: PathMatchPolicy,
    routes: HashSet<String>,
}

impl PathMatcher {
    pub fn new<I, P>(policy: PathMatchPolicy, routes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            policy,
            routes: routes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn policy(&self) -> PathMatchPolicy {
        self.policy
    }

    /// The route a request path dispatches to, or `None` for no match.
    pub fn resolve<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.routes.contains(path) {
            return Some(path);
        }
        if !self.policy.use_suffix_pattern_match {
            return None;
        }

        let stripped = strip_suffix(path)?;
        self.routes.contains(stripped).then_some(stripped)
    }
}

/// `/a/b.ext` → `/a/b`. `None` when the last segment has no suffix.
fn strip_suffix(path: &str) -> Option<&str> {
    let segment_start = path.rfind('/').map_or(0, |i| i + 1);
    let dot = path[segment_start..].rfind('.')?;
    if dot == 0 {
        return None;
    }
    Some(&path[..segment_start + dot])
}

/// Middleware that rewrites suffixed paths onto their base route.
///
/// Must wrap the router rather than sit inside it, since it changes the URI
/// used for dispatch.
pub async fn path_match_middleware(
    State(matcher): State<Arc<PathMatcher>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if matcher.policy().use_suffix_pattern_match {
        let path = request.uri().path();
        let rewritten = matcher
            .resolve(path)
            .filter(|resolved| *resolved != path)
            .map(str::to_string);

        if let Some(resolved) = rewritten {
            let target = match request.uri().query() {
                Some(q) => format!("{}?{}", resolved, q),
                None => resolved,
            };
            let mut parts = request.uri().clone().into_parts();
            if let Ok(pq) = target.parse::<PathAndQuery>() {
                parts.path_and_query = Some(pq);
                if let Ok(uri) = Uri::from_parts(parts) {
                    tracing::debug!(from = %request.uri().path(), to = %uri.path(), "Suffix stripped for route match");
                    *request.uri_mut() = uri;
                }
            }
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(suffix: bool) -> PathMatcher {
        PathMatcher::new(
            PathMatchPolicy {
                use_suffix_pattern_match: suffix,
            },
            ["/resource", "/files/report.pdf"],
        )
    }

    #[test]
    fn disabled_policy_requires_literal_match() {
        let m = matcher(false);
        assert_eq!(m.resolve("/resource"), Some("/resource"));
        assert_eq!(m.resolve("/resource.abc"), None);
        assert_eq!(m.resolve("/Resource"), None);
        assert_eq!(m.resolve("/files/report.pdf"), Some("/files/report.pdf"));
    }

    #[test]
    fn enabled_policy_strips_suffix() {
        let m = matcher(true);
        assert_eq!(m.resolve("/resource.abc"), Some("/resource"));
        assert_eq!(m.resolve("/resource.tar.gz"), None);
        assert_eq!(m.resolve("/files/report.pdf"), Some("/files/report.pdf"));
        assert_eq!(m.resolve("/other.json"), None);
    }

    #[test]
    fn suffix_only_taken_from_last_segment() {
        assert_eq!(strip_suffix("/a.b/c"), None);
        assert_eq!(strip_suffix("/a/.hidden"), None);
        assert_eq!(strip_suffix("/a/b.c"), Some("/a/b"));
        assert_eq!(strip_suffix("/a/b.c.d"), Some("/a/b.c"));
    }
}
