//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the pipeline.
//! All types derive Serde traits for deserialization from config files, and
//! every default reproduces the stock application setup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::negotiation::MediaType;

/// Root configuration for the request pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Filter registrations, in chain order.
    pub filters: FiltersConfig,

    /// Remote-IP resolution settings.
    pub remote_ip: RemoteIpConfig,

    /// XSS filter settings.
    pub xss: XssConfig,

    /// Content negotiation rules.
    pub negotiation: NegotiationConfig,

    /// URL path matching rules.
    pub path_match: PathMatchConfig,

    /// Response body encoding.
    pub serialization: SerializationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Ordered list of filter registrations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct FiltersConfig(pub Vec<FilterRegistrationConfig>);

impl Default for FiltersConfig {
    fn default() -> Self {
        Self(vec![
            FilterRegistrationConfig {
                name: "RemoteIpFilter".to_string(),
                kind: FilterKind::RemoteIp,
                url_patterns: vec!["/*".to_string()],
            },
            FilterRegistrationConfig {
                name: "XSSFilter".to_string(),
                kind: FilterKind::Xss,
                url_patterns: vec!["/*".to_string()],
            },
        ])
    }
}

impl std::ops::Deref for FiltersConfig {
    type Target = [FilterRegistrationConfig];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A single filter registration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterRegistrationConfig {
    /// Unique name within the chain.
    pub name: String,

    /// Which built-in filter to instantiate.
    pub kind: FilterKind,

    /// URL scopes the filter applies to.
    #[serde(default = "default_url_patterns")]
    pub url_patterns: Vec<String>,
}

fn default_url_patterns() -> Vec<String> {
    vec!["/*".to_string()]
}

/// Built-in filter implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    RemoteIp,
    Xss,
}

/// Remote-IP filter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteIpConfig {
    /// Header carrying the forwarded-for chain.
    pub remote_ip_header: String,

    /// Header carrying the original request scheme.
    pub protocol_header: String,

    /// Value of `protocol_header` that marks an HTTPS request.
    pub protocol_header_https_value: String,

    /// Proxies that are skipped entirely when walking the chain (CIDR).
    pub internal_proxies: Vec<String>,

    /// Proxies that are trusted and reported in the proxy chain (CIDR).
    pub trusted_proxies: Vec<String>,
}

impl Default for RemoteIpConfig {
    fn default() -> Self {
        Self {
            remote_ip_header: "x-forwarded-for".to_string(),
            protocol_header: "x-forwarded-proto".to_string(),
            protocol_header_https_value: "https".to_string(),
            internal_proxies: vec![
                "10.0.0.0/8".to_string(),
                "192.168.0.0/16".to_string(),
                "169.254.0.0/16".to_string(),
                "127.0.0.0/8".to_string(),
                "172.16.0.0/12".to_string(),
                "100.64.0.0/10".to_string(),
                "::1/128".to_string(),
            ],
            trusted_proxies: Vec::new(),
        }
    }
}

/// What the XSS filter does with an offending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum XssMode {
    /// Answer 400 and halt the chain.
    #[default]
    Reject,
    /// HTML-escape offending values and continue.
    Escape,
}

/// XSS filter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct XssConfig {
    pub mode: XssMode,

    /// Maximum form body inspected, in bytes.
    pub max_body_size: usize,
}

impl Default for XssConfig {
    fn default() -> Self {
        Self {
            mode: XssMode::Reject,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Content negotiation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Query/form parameter that selects the output type.
    pub parameter_name: String,

    /// Recognized parameter values.
    pub media_types: BTreeMap<String, MediaType>,

    /// Used when the parameter is absent or unrecognized.
    pub default_media_type: MediaType,

    /// Whether a URL suffix may select the output type.
    pub favor_path_extension: bool,

    /// Whether the Accept header is ignored.
    pub ignore_accept_header: bool,

    /// Largest form body buffered to find the parameter, in bytes.
    pub max_form_size: usize,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        let mut media_types = BTreeMap::new();
        media_types.insert("json".to_string(), MediaType::Json);
        media_types.insert("xml".to_string(), MediaType::Xml);
        Self {
            parameter_name: "mediaType".to_string(),
            media_types,
            default_media_type: MediaType::Json,
            favor_path_extension: false,
            ignore_accept_header: true,
            max_form_size: 2 * 1024 * 1024,
        }
    }
}

/// Path matching configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PathMatchConfig {
    /// Strip a trailing `.suffix` when the literal path has no route.
    pub use_suffix_pattern_match: bool,
}

/// Response serialization configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SerializationConfig {
    /// Date pattern, Java `SimpleDateFormat` letters.
    pub date_format: String,

    /// Output charset. Only UTF-8 is supported.
    pub charset: String,

    /// Indent output.
    pub pretty_print: bool,

    /// Indent unit used when pretty printing.
    pub indent: String,

    /// Cycle bookkeeping. Must stay off.
    pub circular_reference_detect: bool,
}

impl Default for SerializationConfig {
    fn default() -> Self {
        Self {
            date_format: "yyyy-MM-dd HH:mm:ss.SSS".to_string(),
            charset: "UTF-8".to_string(),
            pretty_print: true,
            indent: "\t".to_string(),
            circular_reference_detect: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
