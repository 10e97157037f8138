//! Response body serialization.
//!
//! # Data Flow
//! ```text
//! handler value (impl Serialize)
//!     → date.rs (Timestamp fields rendered with the configured pattern)
//!     → JSON: serde_json, pretty printed, UTF-8
//!     → XML:  serde_json::Value → xml.rs
//!     → Response with negotiated Content-Type
//! ```
//!
//! # Design Decisions
//! - One immutable serializer built at startup; no per-request overrides
//! - No cycle detection: serde's `rc` feature stays off, so serializable
//!   graphs are trees
//! - Encoding failures become 500 with no partial body

pub mod date;
pub mod xml;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::ser::PrettyFormatter;
use thiserror::Error;

use crate::config::SerializationConfig;
use crate::negotiation::MediaType;
use crate::observability::metrics;

pub use date::{DateFormat, DateFormatError, Timestamp, DEFAULT_DATE_FORMAT};

/// Errors raised while encoding or decoding bodies.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("invalid date format: {0}")]
    DateFormat(#[from] DateFormatError),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encodes handler output with the configured conventions.
#[derive(Debug, Clone)]
pub struct ResponseSerializer {
    date_format: Arc<DateFormat>,
    pretty_print: bool,
    indent: String,
}

impl ResponseSerializer {
    pub fn from_config(config: &SerializationConfig) -> Result<Self, SerializeError> {
        Ok(Self {
            date_format: Arc::new(DateFormat::parse(&config.date_format)?),
            pretty_print: config.pretty_print,
            indent: config.indent.clone(),
        })
    }

    pub fn date_format(&self) -> &DateFormat {
        &self.date_format
    }

    /// Encode `value` as UTF-8 bytes in the given representation.
    pub fn encode<T: Serialize + ?Sized>(
        &self,
        value: &T,
        media_type: MediaType,
    ) -> Result<Vec<u8>, SerializeError> {
        let _scope = self.date_format.scope();

        match media_type {
            MediaType::Json => {
                let mut buf = Vec::with_capacity(128);
                if self.pretty_print {
                    let formatter = PrettyFormatter::with_indent(self.indent.as_bytes());
                    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
                    value.serialize(&mut serializer)?;
                } else {
                    serde_json::to_writer(&mut buf, value)?;
                }
                Ok(buf)
            }
            MediaType::Xml => {
                let tree = serde_json::to_value(value)?;
                let indent = self.pretty_print.then_some(self.indent.as_str());
                Ok(xml::to_xml(&tree, indent).into_bytes())
            }
        }
    }

    /// Decode a JSON body using the same date pattern.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializeError> {
        let _scope = self.date_format.scope();
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Build a complete response, or a 500 if encoding fails.
    pub fn respond<T: Serialize + ?Sized>(
        &self,
        status: StatusCode,
        value: &T,
        media_type: MediaType,
    ) -> Response {
        match self.encode(value, media_type) {
            Ok(body) => {
                let mut response = Response::new(Body::from(body));
                *response.status_mut() = status;
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, media_type.content_type());
                response
            }
            Err(e) => {
                tracing::error!(media_type = %media_type, error = %e, "Response serialization failed");
                metrics::record_serialization_failure(media_type.essence());
                (StatusCode::INTERNAL_SERVER_ERROR, "Response serialization failed").into_response()
            }
        }
    }
}

impl Default for ResponseSerializer {
    fn default() -> Self {
        Self {
            date_format: Arc::new(DateFormat::default()),
            pretty_print: true,
            indent: "\t".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{ser, Deserialize, Serializer};
    use std::collections::BTreeMap;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Event {
        name: String,
        at: Timestamp,
    }

    fn event() -> Event {
        Event {
            name: "deploy".into(),
            at: Timestamp("2024-03-01T10:15:30.250".parse().unwrap()),
        }
    }

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(ser::Error::custom("not encodable"))
        }
    }

    #[test]
    fn json_is_pretty_and_dates_use_pattern() {
        let serializer = ResponseSerializer::default();
        let body = serializer.encode(&event(), MediaType::Json).unwrap();
        let text = String::from_utf8(body).unwrap();
        assert_eq!(
            text,
            "{\n\t\"name\": \"deploy\",\n\t\"at\": \"2024-03-01 10:15:30.250\"\n}"
        );
    }

    #[test]
    fn date_round_trip_is_pattern_exact() {
        let serializer = ResponseSerializer::default();
        let body = serializer.encode(&event(), MediaType::Json).unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(raw["at"], "2024-03-01 10:15:30.250");

        let decoded: Event = serializer.decode(&body).unwrap();
        assert_eq!(decoded, event());
    }

    #[test]
    fn compact_output_when_pretty_print_disabled() {
        let mut config = SerializationConfig::default();
        config.pretty_print = false;
        let serializer = ResponseSerializer::from_config(&config).unwrap();
        let body = serializer.encode(&event(), MediaType::Json).unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            r#"{"name":"deploy","at":"2024-03-01 10:15:30.250"}"#
        );
    }

    #[test]
    fn xml_uses_same_date_pattern() {
        let serializer = ResponseSerializer::default();
        let body = serializer.encode(&event(), MediaType::Xml).unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("<at>2024-03-01 10:15:30.250</at>"));
        assert!(text.contains("\t<name>deploy</name>\n"));
    }

    #[test]
    fn configured_pattern_applies() {
        let mut config = SerializationConfig::default();
        config.date_format = "dd/MM/yyyy HH:mm".into();
        let serializer = ResponseSerializer::from_config(&config).unwrap();

        let mut map = BTreeMap::new();
        map.insert("at", event().at);
        let body = serializer.encode(&map, MediaType::Json).unwrap();
        assert!(String::from_utf8(body).unwrap().contains("\"01/03/2024 10:15\""));
    }

    #[test]
    fn encoding_failure_is_500() {
        let serializer = ResponseSerializer::default();
        assert!(serializer.encode(&Unencodable, MediaType::Json).is_err());

        let response = serializer.respond(StatusCode::OK, &Unencodable, MediaType::Json);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn content_type_carries_charset() {
        let serializer = ResponseSerializer::default();
        let response = serializer.respond(StatusCode::CREATED, &event(), MediaType::Xml);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/xml;charset=UTF-8"
        );
    }

    #[test]
    fn malformed_pattern_rejected() {
        let mut config = SerializationConfig::default();
        config.date_format = "yyyy-QQ".into();
        assert!(matches!(
            ResponseSerializer::from_config(&config),
            Err(SerializeError::DateFormat(_))
        ));
    }
}
