//! Client configuration.

use std::time::Duration;

use crate::cache::DEFAULT_LIST_CACHE_TTL_SECONDS;
use crate::error::ServiceBusError;
use crate::sas::DEFAULT_TOKEN_TTL_MINUTES;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Management and runtime API version sent with every request
pub const DEFAULT_API_VERSION: &str = "2021-05";

/// Configuration for [`ServiceBusClient`](crate::client::ServiceBusClient).
///
/// # Examples
///
/// ```
/// use bus_lens_core::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::default()
///     .with_request_timeout(Duration::from_secs(10))
///     .with_relay_url("http://localhost:3001/proxy");
/// assert_eq!(config.api_version, "2021-05");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// `api-version` query parameter
    pub api_version: String,
    /// Optional pass-through relay; requests go to `{relay}?url={target}`
    pub relay_url: Option<String>,
    /// Transport timeout for every request
    pub request_timeout: Duration,
    /// Lifetime of each minted SAS token
    pub token_ttl_minutes: i64,
    /// How long queue and topic listings are served from cache
    pub list_cache_ttl: Duration,
    /// Server-side wait for the dead-letter peek
    pub dead_letter_peek_timeout_seconds: u32,
    /// `maxMessageCount` requested by the dead-letter peek
    pub dead_letter_max_message_count: u32,
    /// User agent string for API requests
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            relay_url: None,
            request_timeout: Duration::from_secs(30),
            token_ttl_minutes: DEFAULT_TOKEN_TTL_MINUTES,
            list_cache_ttl: Duration::from_secs(DEFAULT_LIST_CACHE_TTL_SECONDS as u64),
            dead_letter_peek_timeout_seconds: 5,
            dead_letter_max_message_count: 100,
            user_agent: format!("bus-lens/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Create a new builder for client configuration.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Set the API version.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Route requests through a relay.
    pub fn with_relay_url(mut self, relay_url: impl Into<String>) -> Self {
        self.relay_url = Some(relay_url.into());
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the SAS token lifetime.
    pub fn with_token_ttl_minutes(mut self, minutes: i64) -> Self {
        self.token_ttl_minutes = minutes;
        self
    }

    /// Set the listing cache lifetime.
    pub fn with_list_cache_ttl(mut self, ttl: Duration) -> Self {
        self.list_cache_ttl = ttl;
        self
    }

    /// Set the user agent string.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Reject settings the client cannot work with
    pub fn validate(&self) -> Result<(), ServiceBusError> {
        if self.api_version.trim().is_empty() {
            return Err(configuration("api_version must not be empty"));
        }
        if self.token_ttl_minutes <= 0 {
            return Err(configuration("token_ttl_minutes must be greater than zero"));
        }
        if self.dead_letter_max_message_count == 0 {
            return Err(configuration(
                "dead_letter_max_message_count must be greater than zero",
            ));
        }
        if let Some(relay) = &self.relay_url {
            let url = reqwest::Url::parse(relay)
                .map_err(|e| configuration(&format!("invalid relay_url '{}': {}", relay, e)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(configuration("relay_url must use http or https"));
            }
        }
        Ok(())
    }

    /// Listing cache lifetime as a chrono duration
    pub(crate) fn list_cache_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.list_cache_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_LIST_CACHE_TTL_SECONDS))
    }
}

fn configuration(message: &str) -> ServiceBusError {
    ServiceBusError::Configuration {
        message: message.to_string(),
    }
}

/// Builder for constructing `ClientConfig` instances.
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new configuration builder with defaults.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.config.api_version = api_version.into();
        self
    }

    /// Set or clear the relay URL.
    pub fn relay_url(mut self, relay_url: Option<String>) -> Self {
        self.config.relay_url = relay_url;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn token_ttl_minutes(mut self, minutes: i64) -> Self {
        self.config.token_ttl_minutes = minutes;
        self
    }

    pub fn list_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.list_cache_ttl = ttl;
        self
    }

    pub fn dead_letter_peek_timeout_seconds(mut self, seconds: u32) -> Self {
        self.config.dead_letter_peek_timeout_seconds = seconds;
        self
    }

    pub fn dead_letter_max_message_count(mut self, count: u32) -> Self {
        self.config.dead_letter_max_message_count = count;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Build the final configuration, checking it first.
    pub fn build(self) -> Result<ClientConfig, ServiceBusError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
