//! Connection string parsing.
//!
//! Service Bus connection strings look like
//! `Endpoint=sb://ns.servicebus.windows.net/;SharedAccessKeyName=name;SharedAccessKey=key`.
//! Segments may appear in any order and keys are usually base64, so each
//! segment is split on its first `=` only.

use crate::error::ValidationError;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[cfg(test)]
#[path = "connection_string_tests.rs"]
mod tests;

const ENDPOINT: &str = "Endpoint";
const KEY_NAME: &str = "SharedAccessKeyName";
const KEY_VALUE: &str = "SharedAccessKey";

/// Credentials for one Service Bus namespace
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    endpoint: String,
    key_name: String,
    key_value: String,
}

impl Credentials {
    pub fn new(
        endpoint: impl Into<String>,
        key_name: impl Into<String>,
        key_value: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            key_name: key_name.into(),
            key_value: key_value.into(),
        }
    }

    /// Endpoint exactly as given, `sb://` or `https://` form
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    pub fn key_value(&self) -> &str {
        &self.key_value
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint)
            .field("key_name", &self.key_name)
            .field("key_value", &"<redacted>")
            .finish()
    }
}

impl FromStr for Credentials {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = split_segments(s);

        let mut take = |key: &str| {
            parts.remove(key).ok_or_else(|| ValidationError::Required {
                field: key.to_string(),
            })
        };

        let endpoint = take(ENDPOINT)?;
        let key_name = take(KEY_NAME)?;
        let key_value = take(KEY_VALUE)?;

        Ok(Self {
            endpoint,
            key_name,
            key_value,
        })
    }
}

/// Parse a connection string, returning `None` if a required field is missing
pub fn parse_connection_string(raw: &str) -> Option<Credentials> {
    raw.parse().ok()
}

/// Split `key=value;key=value` into trimmed pairs, dropping empty keys and values
fn split_segments(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter_map(|segment| {
            let (key, value) = segment.split_once('=')?;
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
