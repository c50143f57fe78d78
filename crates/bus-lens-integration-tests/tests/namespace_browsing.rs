//! Integration tests for browsing a namespace
//!
//! These tests verify:
//! - Queue, topic and subscription feeds decode into entities with counters
//! - Listings are cached per client until refreshed or invalidated
//! - Correlation filters are looked up per subscription and degrade to none

mod common;

use bus_lens_core::ClientConfig;
use common::*;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_browse_queues_topics_and_subscriptions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/$Resources/Queues"))
        .and(query_param("api-version", "2021-05"))
        .respond_with(ResponseTemplate::new(200).set_body_string(QUEUES_FEED))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/$Resources/Topics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TOPICS_FEED))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/events/Subscriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SUBSCRIPTIONS_FEED))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/events/Subscriptions/billing/Rules"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RULES_FEED))
        .mount(&server)
        .await;
    let client = client_for(&server);

    let queues = client.list_queues(false).await.unwrap();
    let topics = client.list_topics(false).await.unwrap();
    let subscriptions = client.list_subscriptions(&topics[0].name).await.unwrap();
    let filter = client
        .get_subscription_correlation_filter("events", &subscriptions[0].name)
        .await;

    assert_eq!(queues.len(), 2);
    assert_eq!(queues[0].name, "orders");
    assert_eq!(queues[0].message_count, Some(12));
    assert_eq!(queues[0].dead_letter_message_count, Some(2));
    assert_eq!(queues[1].message_count, None);

    let names: Vec<_> = topics.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["events", "audit"]);

    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].message_count, Some(3));
    assert_eq!(subscriptions[0].dead_letter_message_count, Some(1));
    assert_eq!(filter.as_deref(), Some("invoice-created"));
}

#[tokio::test]
async fn test_listing_cache_lifecycle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/$Resources/Topics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TOPICS_FEED))
        .expect(3)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let first = client.list_topics(false).await.unwrap();
    let cached = client.list_topics(false).await.unwrap();
    assert!(Arc::ptr_eq(&first, &cached));

    let refreshed = client.list_topics(true).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &refreshed));

    client.invalidate_caches().await;
    let after_invalidate = client.list_topics(false).await.unwrap();
    assert_eq!(*after_invalidate, *first);
}

#[tokio::test]
async fn test_expired_listing_is_refetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/$Resources/Queues"))
        .respond_with(ResponseTemplate::new(200).set_body_string(QUEUES_FEED))
        .expect(2)
        .mount(&server)
        .await;
    let config = ClientConfig::default().with_list_cache_ttl(Duration::from_millis(50));
    let client = client_with(&server, config);

    client.list_queues(false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    client.list_queues(false).await.unwrap();
}

#[tokio::test]
async fn test_subscriptions_are_never_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events/Subscriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SUBSCRIPTIONS_FEED))
        .expect(2)
        .mount(&server)
        .await;
    let client = client_for(&server);

    client.list_subscriptions("events").await.unwrap();
    client.list_subscriptions("events").await.unwrap();
}

#[tokio::test]
async fn test_unauthorized_listing_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("InvalidSignature"))
        .mount(&server)
        .await;
    let client = client_for(&server);

    let error = client.list_queues(false).await.unwrap_err();

    assert_eq!(error.status(), Some(401));
    assert!(!error.is_transient());
    assert!(!client.test_connection().await);
}

#[tokio::test]
async fn test_missing_rules_mean_no_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events/Subscriptions/billing/Rules"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let client = client_for(&server);

    let filter = client
        .get_subscription_correlation_filter("events", "billing")
        .await;

    assert_eq!(filter, None);
}
