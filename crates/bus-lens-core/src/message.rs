//! Message types and their HTTP header encoding.
//!
//! The REST runtime API carries message metadata entirely in headers:
//! broker-level fields travel as a JSON `BrokerProperties` header and each
//! custom property becomes its own header, with a `{name}-Type` companion
//! naming the EDM type for anything that is not a string. Dead-lettered
//! messages come back in the same shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{ServiceBusError, ValidationError};

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

/// Content type sent when a message does not name one
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Header carrying broker-level metadata as JSON
pub const BROKER_PROPERTIES_HEADER: &str = "BrokerProperties";

/// Headers the client sets itself; a custom property may not take their name
pub const RESERVED_PROPERTY_HEADERS: [&str; 3] =
    ["Authorization", "Content-Type", BROKER_PROPERTIES_HEADER];

/// Declared wire type of a custom message property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    #[default]
    String,
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Guid,
    DateTime,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Guid => "guid",
            Self::DateTime => "datetime",
        }
    }

    /// OData EDM tag sent in the `{name}-Type` header
    pub fn edm_type(&self) -> &'static str {
        match self {
            Self::String => "Edm.String",
            Self::Int => "Edm.Int32",
            Self::Long => "Edm.Int64",
            Self::Float => "Edm.Single",
            Self::Double => "Edm.Double",
            Self::Boolean => "Edm.Boolean",
            Self::Guid => "Edm.Guid",
            Self::DateTime => "Edm.DateTime",
        }
    }

    /// Whether a `{name}-Type` companion header is sent
    pub fn needs_type_header(&self) -> bool {
        !matches!(self, Self::String)
    }

    /// Header form of `value`.
    ///
    /// Values are not checked against the declared type; the broker decides
    /// what it accepts. Non-string values lose surrounding whitespace.
    pub fn format_value(&self, value: &str) -> String {
        match self {
            Self::String => value.to_string(),
            _ => value.trim().to_string(),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(Self::String),
            "int" => Ok(Self::Int),
            "long" => Ok(Self::Long),
            "float" => Ok(Self::Float),
            "double" => Ok(Self::Double),
            "boolean" | "bool" => Ok(Self::Boolean),
            "guid" | "uuid" => Ok(Self::Guid),
            "datetime" => Ok(Self::DateTime),
            other => Err(ValidationError::InvalidFormat {
                field: "property_type".to_string(),
                message: format!("unknown property type '{}'", other),
            }),
        }
    }
}

/// Custom application property of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageProperty {
    pub key: String,
    pub value: String,
    #[serde(rename = "type", default)]
    pub property_type: PropertyType,
}

impl MessageProperty {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        property_type: PropertyType,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            property_type,
        }
    }

    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, value, PropertyType::String)
    }

    /// Header name for this property
    pub fn header_name(&self) -> String {
        sanitize_header_name(&self.key)
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` with `-`
pub fn sanitize_header_name(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// A message to send to a queue or topic
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub body: String,
    #[serde(default)]
    pub properties: Vec<MessageProperty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl OutboundMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_property(mut self, property: MessageProperty) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_properties(mut self, properties: impl IntoIterator<Item = MessageProperty>) -> Self {
        self.properties.extend(properties);
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Content type to send, falling back to `application/json`
    pub fn effective_content_type(&self) -> &str {
        self.content_type
            .as_deref()
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    /// JSON for the `BrokerProperties` header, or `None` when no broker field is set
    pub fn broker_properties(&self) -> Option<String> {
        let mut props = Map::new();
        let fields = [
            ("Label", &self.subject),
            ("CorrelationId", &self.correlation_id),
            ("MessageId", &self.message_id),
        ];
        for (name, value) in fields {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                props.insert(name.to_string(), Value::String(v.to_string()));
            }
        }

        if props.is_empty() {
            None
        } else {
            Some(Value::Object(props).to_string())
        }
    }

    /// Custom property headers, each followed by its `-Type` companion where needed.
    ///
    /// Fails on an empty key or on a key that would replace one of the
    /// [`RESERVED_PROPERTY_HEADERS`].
    pub fn property_headers(&self) -> Result<Vec<(String, String)>, ValidationError> {
        let mut headers = Vec::with_capacity(self.properties.len() * 2);

        for property in &self.properties {
            if property.key.trim().is_empty() {
                return Err(ValidationError::Required {
                    field: "property key".to_string(),
                });
            }
            let name = property.header_name();
            let value = property.property_type.format_value(&property.value);
            headers.push((
                ensure_not_reserved(&property.key, name.clone())?,
                value,
            ));

            if property.property_type.needs_type_header() {
                headers.push((
                    ensure_not_reserved(&property.key, format!("{}-Type", name))?,
                    property.property_type.edm_type().to_string(),
                ));
            }
        }

        Ok(headers)
    }
}

/// A message read from a dead-letter queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterMessage {
    pub sequence_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enqueued_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_letter_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_letter_error_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_token: Option<String>,
    pub body: String,
    #[serde(default)]
    pub properties: Vec<MessageProperty>,
}

impl DeadLetterMessage {
    /// Build a fresh outbound message carrying this message's payload and metadata
    pub fn to_outbound(&self) -> OutboundMessage {
        OutboundMessage {
            body: self.body.clone(),
            properties: self.properties.clone(),
            subject: self.subject.clone(),
            content_type: self.content_type.clone(),
            correlation_id: self.correlation_id.clone(),
            message_id: self.message_id.clone(),
        }
    }
}

/// Reject a custom property header that would replace one the client sets
fn ensure_not_reserved(key: &str, header: String) -> Result<String, ValidationError> {
    if RESERVED_PROPERTY_HEADERS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(&header))
    {
        return Err(ValidationError::InvalidFormat {
            field: key.to_string(),
            message: format!("'{}' is a reserved header name", header),
        });
    }
    Ok(header)
}

/// Whether a response header is transport or broker metadata rather than a custom property
fn is_reserved_header(name: &str) -> bool {
    const PREFIXES: [&str; 3] = ["broker", "content", "authorization"];
    const LITERALS: [&str; 3] = ["date", "server", "transfer-encoding"];

    PREFIXES.iter().any(|p| name.starts_with(p)) || LITERALS.contains(&name)
}

/// Text form of a JSON field; numbers and booleans are stringified
fn json_string(props: &Map<String, Value>, name: &str) -> Option<String> {
    match props.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Decode a peeked dead-letter message from its response headers and body.
///
/// Header names are compared case-insensitively and reported lower-cased.
pub fn decode_dead_letter<'a, I>(headers: I, body: String) -> Result<DeadLetterMessage, ServiceBusError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let headers: Vec<(String, &str)> = headers
        .into_iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect();
    let header = |name: &str| {
        headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.to_string())
    };

    let raw = header("brokerproperties").ok_or_else(|| ServiceBusError::Parse {
        message: "missing BrokerProperties header".to_string(),
    })?;
    let props: Map<String, Value> = serde_json::from_str(&raw).map_err(|e| ServiceBusError::Parse {
        message: format!("invalid BrokerProperties header: {}", e),
    })?;

    let sequence_number =
        json_string(&props, "SequenceNumber").ok_or_else(|| ServiceBusError::Parse {
            message: "BrokerProperties has no SequenceNumber".to_string(),
        })?;

    let properties = headers
        .iter()
        .filter(|(name, _)| !is_reserved_header(name))
        .map(|(name, value)| MessageProperty::string(name.clone(), *value))
        .collect();

    Ok(DeadLetterMessage {
        sequence_number,
        message_id: json_string(&props, "MessageId"),
        subject: json_string(&props, "Label"),
        correlation_id: json_string(&props, "CorrelationId"),
        content_type: header("content-type"),
        enqueued_time: json_string(&props, "EnqueuedTimeUtc"),
        dead_letter_reason: json_string(&props, "DeadLetterReason")
            .or_else(|| header("deadletterreason")),
        dead_letter_error_description: json_string(&props, "DeadLetterErrorDescription")
            .or_else(|| header("deadlettererrordescription")),
        lock_token: json_string(&props, "LockToken"),
        body,
        properties,
    })
}
