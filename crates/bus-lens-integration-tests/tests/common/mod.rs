//! Common test utilities for bus-lens integration tests
//!
//! This module provides:
//! - Atom feed and dead-letter fixtures shaped like real namespace responses
//! - A client wired to a wiremock namespace
//! - Helpers for inspecting recorded requests

use bus_lens_core::{ClientConfig, Credentials, ServiceBusClient};
use wiremock::{MockServer, Request};

pub const KEY_NAME: &str = "RootManageSharedAccessKey";
pub const KEY_VALUE: &str = "bXktc2VjcmV0LWtleQ==";

/// Queue feed with one fully described queue and one bare entry
#[allow(dead_code)]
pub const QUEUES_FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="text">Queues</title>
  <entry>
    <title type="text">orders</title>
    <content type="application/xml">
      <QueueDescription xmlns="http://schemas.microsoft.com/netservices/2010/10/servicebus/connect">
        <MessageCount>12</MessageCount>
        <CountDetails>
          <d2p1:ActiveMessageCount xmlns:d2p1="http://schemas.microsoft.com/netservices/2011/06/servicebus">10</d2p1:ActiveMessageCount>
          <d2p1:DeadLetterMessageCount xmlns:d2p1="http://schemas.microsoft.com/netservices/2011/06/servicebus">2</d2p1:DeadLetterMessageCount>
        </CountDetails>
      </QueueDescription>
    </content>
  </entry>
  <entry>
    <title type="text">invoices</title>
  </entry>
</feed>"#;

#[allow(dead_code)]
pub const TOPICS_FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry><title type="text">events</title></entry>
  <entry><title type="text">audit</title></entry>
</feed>"#;

#[allow(dead_code)]
pub const SUBSCRIPTIONS_FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <title type="text">billing</title>
    <content type="application/xml">
      <SubscriptionDescription xmlns="http://schemas.microsoft.com/netservices/2010/10/servicebus/connect">
        <MessageCount>3</MessageCount>
        <CountDetails>
          <d2p1:DeadLetterMessageCount xmlns:d2p1="http://schemas.microsoft.com/netservices/2011/06/servicebus">1</d2p1:DeadLetterMessageCount>
        </CountDetails>
      </SubscriptionDescription>
    </content>
  </entry>
</feed>"#;

#[allow(dead_code)]
pub const RULES_FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <title type="text">$Default</title>
    <content type="application/xml">
      <RuleDescription xmlns="http://schemas.microsoft.com/netservices/2010/10/servicebus/connect">
        <Filter xmlns:i="http://www.w3.org/2001/XMLSchema-instance" i:type="CorrelationFilter">
          <Label>invoice-created</Label>
        </Filter>
      </RuleDescription>
    </content>
  </entry>
</feed>"#;

/// BrokerProperties header of a peek-locked dead letter
#[allow(dead_code)]
pub const DEAD_LETTER_BROKER_PROPERTIES: &str = r#"{"SequenceNumber":42,"LockToken":"7d6b1c5e-0000-4000-8000-000000000001","MessageId":"m-1","Label":"invoice-created","CorrelationId":"c-9","EnqueuedTimeUtc":"Tue, 14 Oct 2025 10:00:00 GMT","DeadLetterReason":"MaxDeliveryCountExceeded","DeadLetterErrorDescription":"Message could not be consumed after 10 delivery attempts."}"#;

/// Client for `server` with default configuration
#[allow(dead_code)]
pub fn client_for(server: &MockServer) -> ServiceBusClient {
    client_with(server, ClientConfig::default())
}

#[allow(dead_code)]
pub fn client_with(server: &MockServer, config: ClientConfig) -> ServiceBusClient {
    let credentials = Credentials::new(server.uri(), KEY_NAME, KEY_VALUE);
    ServiceBusClient::new(&credentials, config).expect("valid test client")
}

#[allow(dead_code)]
pub fn connection_string_for(server: &MockServer) -> String {
    format!(
        "Endpoint={};SharedAccessKeyName={};SharedAccessKey={}",
        server.uri(),
        KEY_NAME,
        KEY_VALUE
    )
}

/// Value of a request header, if present and ASCII
#[allow(dead_code)]
pub fn header_value(request: &Request, name: &str) -> Option<String> {
    request
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Key/value pairs of a `SharedAccessSignature ...` authorization header
#[allow(dead_code)]
pub fn sas_fields(request: &Request) -> Vec<(String, String)> {
    let header = header_value(request, "authorization").expect("authorization header");
    let fields = header
        .strip_prefix("SharedAccessSignature ")
        .expect("SAS scheme");
    fields
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[allow(dead_code)]
pub fn sas_field(request: &Request, key: &str) -> String {
    sas_fields(request)
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
        .unwrap_or_else(|| panic!("SAS field '{}' missing", key))
}
