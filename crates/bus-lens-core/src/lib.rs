//! # Bus Lens Core
//!
//! Client library for inspecting and operating an Azure Service Bus namespace
//! over its REST API.
//!
//! This library provides:
//! - Shared Access Signature (SAS) token generation
//! - Connection string parsing into structured credentials
//! - A protocol adapter that signs requests and parses Atom feeds and
//!   header-encoded dead-letter messages into typed entities
//! - A short-lived per-connection cache for entity listings
//!
//! ## Module Organization
//!
//! - [error] - Error types for all client operations
//! - [sas] - SAS token signing
//! - [connection_string] - Connection string parsing
//! - [cache] - TTL cache for list endpoints
//! - [atom] - Atom/XML feed parsing
//! - [entity] - Queue, topic and subscription types
//! - [message] - Outbound and dead-letter message types
//! - [config] - Client configuration
//! - [client] - The Service Bus REST client

// Module declarations
pub mod atom;
pub mod cache;
pub mod client;
pub mod config;
pub mod connection_string;
pub mod entity;
pub mod error;
pub mod message;
pub mod sas;

// Re-export commonly used types at crate root for convenience
pub use cache::ListCache;
pub use client::{DeadLetterSource, ServiceBusClient};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use connection_string::{parse_connection_string, Credentials};
pub use entity::{Destination, EntityKind, Queue, Subscription, Topic};
pub use error::{ServiceBusError, ValidationError};
pub use message::{DeadLetterMessage, MessageProperty, OutboundMessage, PropertyType};
pub use sas::{generate_sas_token, SasToken, SasTokenSigner};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
