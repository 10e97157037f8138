//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject duplicate filter names and malformed URL patterns
//! - Reject malformed proxy ranges and date patterns
//! - Reject settings the pipeline cannot honor
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PipelineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::PipelineConfig;
use crate::filter::remote_ip::IpRange;
use crate::filter::UrlPattern;
use crate::negotiation::MediaType;
use crate::serialization::DateFormat;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("request timeout must be greater than zero")]
    ZeroTimeout,

    #[error("duplicate filter name '{0}'")]
    DuplicateFilterName(String),

    #[error("filter '{filter}' has invalid url pattern '{pattern}'")]
    UrlPattern { filter: String, pattern: String },

    #[error("filter '{0}' has no url patterns")]
    NoUrlPatterns(String),

    #[error("invalid proxy range '{0}'")]
    ProxyRange(String),

    #[error("invalid date format '{pattern}': {reason}")]
    DateFormat { pattern: String, reason: String },

    #[error("unsupported charset '{0}', only UTF-8 is supported")]
    Charset(String),

    #[error("negotiation parameter name must not be empty")]
    EmptyParameterName,

    #[error("default media type {0} has no parameter value mapped to it")]
    UnmappedDefaultMediaType(MediaType),

    #[error("circular reference detection is not supported")]
    CircularReferenceDetect,

    #[error("metrics address '{0}' is not a socket address")]
    MetricsAddress(String),
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &PipelineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    let mut seen = HashSet::new();
    for filter in config.filters.iter() {
        if !seen.insert(filter.name.as_str()) {
            errors.push(ValidationError::DuplicateFilterName(filter.name.clone()));
        }
        if filter.url_patterns.is_empty() {
            errors.push(ValidationError::NoUrlPatterns(filter.name.clone()));
        }
        for pattern in &filter.url_patterns {
            if UrlPattern::parse(pattern).is_err() {
                errors.push(ValidationError::UrlPattern {
                    filter: filter.name.clone(),
                    pattern: pattern.clone(),
                });
            }
        }
    }

    let ranges = config
        .remote_ip
        .internal_proxies
        .iter()
        .chain(config.remote_ip.trusted_proxies.iter());
    for range in ranges {
        if range.parse::<IpRange>().is_err() {
            errors.push(ValidationError::ProxyRange(range.clone()));
        }
    }

    if let Err(e) = DateFormat::parse(&config.serialization.date_format) {
        errors.push(ValidationError::DateFormat {
            pattern: config.serialization.date_format.clone(),
            reason: e.to_string(),
        });
    }

    if !is_utf8(&config.serialization.charset) {
        errors.push(ValidationError::Charset(config.serialization.charset.clone()));
    }

    if config.serialization.circular_reference_detect {
        errors.push(ValidationError::CircularReferenceDetect);
    }

    if config.negotiation.parameter_name.trim().is_empty() {
        errors.push(ValidationError::EmptyParameterName);
    }

    let default = config.negotiation.default_media_type;
    if !config.negotiation.media_types.values().any(|t| *t == default) {
        errors.push(ValidationError::UnmappedDefaultMediaType(default));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_utf8(charset: &str) -> bool {
    matches!(charset.to_ascii_lowercase().as_str(), "utf-8" | "utf8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{FilterKind, FilterRegistrationConfig};

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&PipelineConfig::default()), Ok(()));
    }

    #[test]
    fn duplicate_filter_names_rejected() {
        let mut config = PipelineConfig::default();
        config.filters.0.push(FilterRegistrationConfig {
            name: "XSSFilter".into(),
            kind: FilterKind::Xss,
            url_patterns: vec!["/*".into()],
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::DuplicateFilterName("XSSFilter".into())]);
    }

    #[test]
    fn collects_every_error() {
        let mut config = PipelineConfig::default();
        config.serialization.date_format = "yyyy-MM-dd 'unterminated".into();
        config.serialization.charset = "ISO-8859-1".into();
        config.remote_ip.trusted_proxies.push("10.0.0.0/99".into());
        config.timeouts.request_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ZeroTimeout));
        assert!(errors.contains(&ValidationError::ProxyRange("10.0.0.0/99".into())));
        assert!(errors.contains(&ValidationError::Charset("ISO-8859-1".into())));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DateFormat { .. })));
    }

    #[test]
    fn charset_spelling_is_lenient() {
        let mut config = PipelineConfig::default();
        config.serialization.charset = "utf8".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn circular_reference_detection_rejected() {
        let mut config = PipelineConfig::default();
        config.serialization.circular_reference_detect = true;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::CircularReferenceDetect])
        );
    }

    #[test]
    fn malformed_url_pattern_rejected() {
        let mut config = PipelineConfig::default();
        config.filters.0[0].url_patterns = vec!["api/*".into()];
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(&errors[0], ValidationError::UrlPattern { filter, .. } if filter == "RemoteIpFilter"));
    }

    #[test]
    fn default_media_type_must_be_reachable() {
        let mut config = PipelineConfig::default();
        config.negotiation.media_types.remove("xml");
        config.negotiation.default_media_type = MediaType::Xml;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::UnmappedDefaultMediaType(MediaType::Xml)])
        );
    }
}
