//! Service Bus REST client.
//!
//! Every operation becomes one HTTP request against
//! `{endpoint}/{path}?api-version=...`, authorised with a SAS token minted for
//! the exact resource path. Listings come back as Atom feeds; dead-lettered
//! messages come back as headers plus a body.
//!
//! # Examples
//!
//! ```no_run
//! use bus_lens_core::{ClientConfig, Destination, OutboundMessage, ServiceBusClient};
//!
//! # async fn example() -> Result<(), bus_lens_core::ServiceBusError> {
//! let client = ServiceBusClient::from_connection_string(
//!     "Endpoint=sb://ns.servicebus.windows.net/;SharedAccessKeyName=k;SharedAccessKey=v",
//!     ClientConfig::default(),
//! )?;
//!
//! let queues = client.list_queues(false).await?;
//! for queue in queues.iter() {
//!     println!("{} ({:?} dead-lettered)", queue.name, queue.dead_letter_message_count);
//! }
//!
//! client
//!     .send_message(&Destination::queue("orders"), &OutboundMessage::new("{}"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::atom;
use crate::cache::ListCache;
use crate::config::ClientConfig;
use crate::connection_string::Credentials;
use crate::entity::{validate_entity_name, Destination, Queue, Subscription, Topic};
use crate::error::{ServiceBusError, ValidationError};
use crate::message::{decode_dead_letter, DeadLetterMessage, OutboundMessage, BROKER_PROPERTIES_HEADER};
use crate::sas::{encode_uri_component, SasTokenSigner};

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

const QUEUES_PATH: &str = "$Resources/Queues";
const TOPICS_PATH: &str = "$Resources/Topics";
const FEED_CONTENT_TYPE: &str = "application/atom+xml;type=feed;charset=utf-8";

/// Dead-letter queue of a queue or of a topic subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeadLetterSource {
    Queue { queue: String },
    Subscription { topic: String, subscription: String },
}

impl DeadLetterSource {
    pub fn queue(queue: impl Into<String>) -> Self {
        Self::Queue {
            queue: queue.into(),
        }
    }

    pub fn subscription(topic: impl Into<String>, subscription: impl Into<String>) -> Self {
        Self::Subscription {
            topic: topic.into(),
            subscription: subscription.into(),
        }
    }

    /// Path of the `$DeadLetterQueue` resource, also the signed resource
    pub fn resource_path(&self) -> String {
        match self {
            Self::Queue { queue } => format!("{}/$DeadLetterQueue", queue),
            Self::Subscription {
                topic,
                subscription,
            } => format!("{}/Subscriptions/{}/$DeadLetterQueue", topic, subscription),
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Queue { queue } => validate_entity_name("queue", queue),
            Self::Subscription {
                topic,
                subscription,
            } => {
                validate_entity_name("topic", topic)?;
                validate_entity_name("subscription", subscription)
            }
        }
    }
}

impl fmt::Display for DeadLetterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue { queue } => write!(f, "queue '{}'", queue),
            Self::Subscription {
                topic,
                subscription,
            } => write!(f, "subscription '{}/{}'", topic, subscription),
        }
    }
}

/// Replace `sb://` with `https://` and drop one trailing slash
pub fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    let endpoint = match endpoint.strip_prefix("sb://") {
        Some(rest) => format!("https://{}", rest),
        None => endpoint.to_string(),
    };
    match endpoint.strip_suffix('/') {
        Some(stripped) => stripped.to_string(),
        None => endpoint,
    }
}

/// Client for one Service Bus namespace.
///
/// Owns its listing caches, so two clients built from different connection
/// strings never see each other's data.
pub struct ServiceBusClient {
    http: reqwest::Client,
    endpoint: String,
    signer: SasTokenSigner,
    config: ClientConfig,
    queue_cache: ListCache<Queue>,
    topic_cache: ListCache<Topic>,
}

impl ServiceBusClient {
    /// Create a client for the namespace named by `credentials`
    pub fn new(credentials: &Credentials, config: ClientConfig) -> Result<Self, ServiceBusError> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ServiceBusError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let signer = SasTokenSigner::new(credentials.key_name(), credentials.key_value())
            .with_ttl_minutes(config.token_ttl_minutes);
        let cache_ttl = config.list_cache_ttl_chrono();

        Ok(Self {
            http,
            endpoint: normalize_endpoint(credentials.endpoint()),
            signer,
            queue_cache: ListCache::new(cache_ttl),
            topic_cache: ListCache::new(cache_ttl),
            config,
        })
    }

    /// Parse `connection_string` and create a client for it
    pub fn from_connection_string(
        connection_string: &str,
        config: ClientConfig,
    ) -> Result<Self, ServiceBusError> {
        let credentials: Credentials = connection_string.parse()?;
        Self::new(&credentials, config)
    }

    /// Normalised `https://` endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ========================================================================
    // Request plumbing
    // ========================================================================

    /// `{endpoint}/{path}?api-version=...` plus any extra query pairs
    fn target_url(&self, path: &str, extra_query: &[(&str, String)]) -> String {
        let mut url = format!(
            "{}/{}?api-version={}",
            self.endpoint, path, self.config.api_version
        );
        for (key, value) in extra_query {
            url.push_str(&format!("&{}={}", key, encode_uri_component(value)));
        }
        url
    }

    /// Wrap `target` in the relay URL when one is configured
    fn request_url(&self, target: String) -> String {
        match &self.config.relay_url {
            Some(relay) => {
                let separator = if relay.contains('?') { '&' } else { '?' };
                format!("{}{}url={}", relay, separator, encode_uri_component(&target))
            }
            None => target,
        }
    }

    /// Start an authorised request.
    ///
    /// `signed_path` scopes the token to a resource; `None` signs the whole
    /// namespace.
    fn request(
        &self,
        method: Method,
        path: &str,
        extra_query: &[(&str, String)],
        signed_path: Option<&str>,
    ) -> RequestBuilder {
        let token = match signed_path {
            Some(resource) => self.signer.sign_resource(&self.endpoint, resource),
            None => self.signer.sign(&self.endpoint),
        };
        let url = self.request_url(self.target_url(path, extra_query));

        debug!(method = %method, path = path, "Sending Service Bus request");

        self.http
            .request(method, url)
            .header(AUTHORIZATION, token.into_string())
    }

    /// Send the request and turn any non-2xx status into an HTTP error
    async fn execute(&self, request: RequestBuilder) -> Result<Response, ServiceBusError> {
        let response = request.send().await.map_err(ServiceBusError::transport)?;
        let status = response.status();

        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Service Bus request failed");
            Err(ServiceBusError::http(status, body))
        }
    }

    /// GET an Atom feed and return its text
    async fn get_feed(&self, path: &str, signed_path: Option<&str>) -> Result<String, ServiceBusError> {
        let request = self
            .request(Method::GET, path, &[], signed_path)
            .header(CONTENT_TYPE, FEED_CONTENT_TYPE);
        let response = self.execute(request).await?;
        response.text().await.map_err(ServiceBusError::transport)
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Whether the namespace answers an authorised request with 2xx
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn test_connection(&self) -> bool {
        let request = self
            .request(Method::GET, QUEUES_PATH, &[], None)
            .header(CONTENT_TYPE, FEED_CONTENT_TYPE);

        match self.execute(request).await {
            Ok(_) => {
                info!("Connection test succeeded");
                true
            }
            Err(e) => {
                warn!(error = %e, "Connection test failed");
                false
            }
        }
    }

    /// List queues, served from cache while fresh unless `force_refresh`
    pub async fn list_queues(&self, force_refresh: bool) -> Result<Arc<Vec<Queue>>, ServiceBusError> {
        self.queue_cache
            .get_or_fetch(force_refresh, || async {
                let xml = self.get_feed(QUEUES_PATH, None).await?;
                let queues = or_empty(atom::parse_queues(&xml), "queues");
                info!(count = queues.len(), "Fetched queues");
                Ok::<_, ServiceBusError>(queues)
            })
            .await
    }

    /// List topics, served from cache while fresh unless `force_refresh`.
    ///
    /// Subscriptions are not populated; use [`list_subscriptions`](Self::list_subscriptions).
    pub async fn list_topics(&self, force_refresh: bool) -> Result<Arc<Vec<Topic>>, ServiceBusError> {
        self.topic_cache
            .get_or_fetch(force_refresh, || async {
                let xml = self.get_feed(TOPICS_PATH, None).await?;
                let topics = or_empty(atom::parse_topics(&xml), "topics");
                info!(count = topics.len(), "Fetched topics");
                Ok::<_, ServiceBusError>(topics)
            })
            .await
    }

    /// List the subscriptions of `topic`; always fetched live
    pub async fn list_subscriptions(&self, topic: &str) -> Result<Vec<Subscription>, ServiceBusError> {
        validate_entity_name("topic", topic)?;

        let path = format!("{}/Subscriptions", topic);
        let xml = self.get_feed(&path, Some(&path)).await?;
        Ok(or_empty(atom::parse_subscriptions(&xml), "subscriptions"))
    }

    /// Label of the first correlation filter among the subscription's rules.
    ///
    /// Any failure yields `None`.
    pub async fn get_subscription_correlation_filter(
        &self,
        topic: &str,
        subscription: &str,
    ) -> Option<String> {
        let result = async {
            validate_entity_name("topic", topic)?;
            validate_entity_name("subscription", subscription)?;

            let path = format!("{}/Subscriptions/{}/Rules", topic, subscription);
            let xml = self.get_feed(&path, Some(&path)).await?;
            atom::parse_rule_correlation_label(&xml)
        }
        .await;

        match result {
            Ok(label) => label,
            Err(e) => {
                debug!(topic, subscription, error = %e, "No correlation filter available");
                None
            }
        }
    }

    /// Send `message` to a queue or topic
    #[instrument(skip(self, destination, message), fields(destination = %destination))]
    pub async fn send_message(
        &self,
        destination: &Destination,
        message: &OutboundMessage,
    ) -> Result<(), ServiceBusError> {
        validate_entity_name("destination", &destination.name)?;
        let headers = send_headers(message)?;

        let path = format!("{}/messages", destination.name);
        let request = self
            .request(Method::POST, &path, &[], Some(&path))
            .headers(headers)
            .body(message.body.clone());

        self.execute(request).await?;
        info!("Message sent");
        Ok(())
    }

    /// Resend a dead-lettered message as a new message; the original stays in place
    pub async fn resend_dead_letter_message(
        &self,
        destination: &Destination,
        message: &DeadLetterMessage,
    ) -> Result<(), ServiceBusError> {
        self.send_message(destination, &message.to_outbound()).await
    }

    /// Peek-lock the head of a dead-letter queue.
    ///
    /// Requests up to `dead_letter_max_message_count` messages but decodes the
    /// single message the REST endpoint returns. An empty queue (204) or an
    /// undecodable response yields an empty list.
    #[instrument(skip(self, source), fields(source = %source))]
    pub async fn fetch_dead_letters(
        &self,
        source: &DeadLetterSource,
    ) -> Result<Vec<DeadLetterMessage>, ServiceBusError> {
        source.validate()?;

        let resource = source.resource_path();
        let path = format!("{}/messages/head", resource);
        let query = [(
            "timeout",
            self.config.dead_letter_peek_timeout_seconds.to_string(),
        )];
        let request = self
            .request(Method::POST, &path, &query, Some(&resource))
            .json(&serde_json::json!({
                "maxMessageCount": self.config.dead_letter_max_message_count
            }));

        let response = self.execute(request).await?;
        if response.status() == StatusCode::NO_CONTENT {
            debug!("Dead-letter queue is empty");
            return Ok(Vec::new());
        }

        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(ServiceBusError::transport)?;

        match decode_dead_letter(
            headers.iter().map(|(n, v)| (n.as_str(), v.as_str())),
            body,
        ) {
            Ok(message) => Ok(vec![message]),
            Err(e) => {
                warn!(error = %e, "Failed to decode dead-letter message");
                Ok(Vec::new())
            }
        }
    }

    /// Peek the dead-letter queue of a topic subscription
    pub async fn fetch_dead_letter_messages(
        &self,
        topic: &str,
        subscription: &str,
    ) -> Result<Vec<DeadLetterMessage>, ServiceBusError> {
        self.fetch_dead_letters(&DeadLetterSource::subscription(topic, subscription))
            .await
    }

    /// Peek the dead-letter queue of a queue
    pub async fn fetch_queue_dead_letter_messages(
        &self,
        queue: &str,
    ) -> Result<Vec<DeadLetterMessage>, ServiceBusError> {
        self.fetch_dead_letters(&DeadLetterSource::queue(queue)).await
    }

    /// Delete a locked dead-letter message
    #[instrument(skip(self, source, lock_token), fields(source = %source))]
    pub async fn delete_dead_letter(
        &self,
        source: &DeadLetterSource,
        sequence_number: &str,
        lock_token: &str,
    ) -> Result<(), ServiceBusError> {
        source.validate()?;
        validate_entity_name("sequence_number", sequence_number)?;
        validate_entity_name("lock_token", lock_token)?;

        let resource = source.resource_path();
        let path = format!("{}/messages/{}/{}", resource, sequence_number, lock_token);
        let request = self.request(Method::DELETE, &path, &[], Some(&resource));

        self.execute(request).await?;
        info!("Dead-letter message deleted");
        Ok(())
    }

    /// Delete a locked message from a subscription's dead-letter queue
    pub async fn delete_dead_letter_message(
        &self,
        topic: &str,
        subscription: &str,
        sequence_number: &str,
        lock_token: &str,
    ) -> Result<(), ServiceBusError> {
        self.delete_dead_letter(
            &DeadLetterSource::subscription(topic, subscription),
            sequence_number,
            lock_token,
        )
        .await
    }

    /// Delete a locked message from a queue's dead-letter queue
    pub async fn delete_queue_dead_letter_message(
        &self,
        queue: &str,
        sequence_number: &str,
        lock_token: &str,
    ) -> Result<(), ServiceBusError> {
        self.delete_dead_letter(&DeadLetterSource::queue(queue), sequence_number, lock_token)
            .await
    }

    /// Drop cached queue and topic listings
    pub async fn invalidate_caches(&self) {
        self.queue_cache.invalidate().await;
        self.topic_cache.invalidate().await;
    }
}

impl fmt::Debug for ServiceBusClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBusClient")
            .field("endpoint", &self.endpoint)
            .field("signer", &self.signer)
            .field("config", &self.config)
            .finish()
    }
}

/// Content type, `BrokerProperties` and custom property headers for a send
fn send_headers(message: &OutboundMessage) -> Result<HeaderMap, ServiceBusError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        header_value("content_type", message.effective_content_type())?,
    );

    if let Some(broker) = message.broker_properties() {
        headers.insert(
            HeaderName::from_static("brokerproperties"),
            header_value(BROKER_PROPERTIES_HEADER, &broker)?,
        );
    }

    for (name, value) in message.property_headers()? {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| ValidationError::InvalidFormat {
                field: name.clone(),
                message: format!("invalid header name: {}", e),
            })?;
        headers.append(header_name, header_value(&name, &value)?);
    }

    Ok(headers)
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue, ValidationError> {
    HeaderValue::from_str(value).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        message: "value cannot be sent as an HTTP header".to_string(),
    })
}

/// Degrade a parse failure to an empty listing
fn or_empty<T>(result: Result<Vec<T>, ServiceBusError>, what: &str) -> Vec<T> {
    result.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to parse {} feed, returning empty list", what);
        Vec::new()
    })
}
