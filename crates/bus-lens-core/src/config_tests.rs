//! Tests for client configuration.

use super::*;

#[test]
fn test_defaults() {
    let config = ClientConfig::default();

    assert_eq!(config.api_version, "2021-05");
    assert_eq!(config.relay_url, None);
    assert_eq!(config.request_timeout, Duration::from_secs(30));
    assert_eq!(config.token_ttl_minutes, 60);
    assert_eq!(config.list_cache_ttl, Duration::from_secs(300));
    assert_eq!(config.dead_letter_peek_timeout_seconds, 5);
    assert_eq!(config.dead_letter_max_message_count, 100);
    assert!(config.user_agent.starts_with("bus-lens/"));
    assert!(config.validate().is_ok());
}

#[test]
fn test_with_methods_override_fields() {
    let config = ClientConfig::default()
        .with_relay_url("http://localhost:3001/proxy")
        .with_token_ttl_minutes(5)
        .with_list_cache_ttl(Duration::from_secs(1));

    assert_eq!(config.relay_url.as_deref(), Some("http://localhost:3001/proxy"));
    assert_eq!(config.token_ttl_minutes, 5);
    assert_eq!(config.list_cache_ttl_chrono(), chrono::Duration::seconds(1));
}

#[test]
fn test_builder_validates() {
    let result = ClientConfig::builder().token_ttl_minutes(0).build();

    assert!(matches!(result, Err(ServiceBusError::Configuration { .. })));
}

#[test]
fn test_builder_rejects_non_http_relay() {
    let result = ClientConfig::builder()
        .relay_url(Some("ftp://relay".to_string()))
        .build();

    assert!(result.is_err());
}

#[test]
fn test_builder_rejects_unparseable_relay() {
    let result = ClientConfig::builder()
        .relay_url(Some("not a url".to_string()))
        .build();

    assert!(result.is_err());
}

#[test]
fn test_builder_accepts_full_configuration() {
    let config = ClientConfig::builder()
        .api_version("2017-04")
        .relay_url(Some("https://relay.example.com/".to_string()))
        .request_timeout(Duration::from_secs(5))
        .dead_letter_peek_timeout_seconds(2)
        .dead_letter_max_message_count(10)
        .user_agent("test")
        .build()
        .unwrap();

    assert_eq!(config.api_version, "2017-04");
    assert_eq!(config.dead_letter_peek_timeout_seconds, 2);
    assert_eq!(config.dead_letter_max_message_count, 10);
    assert_eq!(config.user_agent, "test");
}
