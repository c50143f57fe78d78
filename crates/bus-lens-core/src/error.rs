//! Error types for Service Bus client operations.

use thiserror::Error;

/// Comprehensive error type for all Service Bus client operations
#[derive(Debug, Error)]
pub enum ServiceBusError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("HTTP {status} {status_text}: {body}")]
    Http {
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("Failed to parse response: {message}")]
    Parse { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ServiceBusError {
    /// Build an HTTP error from a status code and the response body
    pub fn http(status: reqwest::StatusCode, body: impl Into<String>) -> Self {
        Self::Http {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            body: body.into(),
        }
    }

    /// Map a reqwest failure to a transport error
    pub fn transport(error: reqwest::Error) -> Self {
        let message = if error.is_timeout() {
            format!("Request timeout: {}", error)
        } else if error.is_connect() {
            format!("Connection failed: {}", error)
        } else {
            format!("HTTP request failed: {}", error)
        };
        Self::Transport { message }
    }

    /// Check if error is transient, i.e. a user-triggered retry might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Transport { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Parse { .. } => false,
            Self::Configuration { .. } => false,
        }
    }

    /// Check if error should be offered for retry
    pub fn should_retry(&self) -> bool {
        self.is_transient()
    }

    /// HTTP status code carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Validation errors, raised before anything goes over the wire
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
