//! Shared Access Signature (SAS) token generation.
//!
//! Service Bus validates every request against a token of the form
//!
//! ```text
//! SharedAccessSignature sr={uri}&sig={signature}&se={expiry}&skn={key name}
//! ```
//!
//! where `signature` is the base64 HMAC-SHA256 of `"{encoded uri}\n{expiry}"`
//! keyed with the shared access key. The `sr` value must name the exact
//! resource being accessed, so resource-scoped requests have to be signed
//! against `endpoint/resource_path` rather than the bare namespace.
//!
//! ## References
//!
//! - [Service Bus SAS authentication](https://learn.microsoft.com/azure/service-bus-messaging/service-bus-sas)

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::Sha256;
use std::fmt;

#[cfg(test)]
#[path = "sas_tests.rs"]
mod tests;

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime in minutes
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 60;

/// Characters left unescaped by JavaScript's `encodeURIComponent`.
///
/// The signature is computed over the encoded form, so this set must match
/// what the service expects byte for byte.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode a string the way `encodeURIComponent` does
pub fn encode_uri_component(input: &str) -> String {
    utf8_percent_encode(input, URI_COMPONENT).to_string()
}

/// A signed SAS token and the instant it stops being valid
#[derive(Clone, PartialEq, Eq)]
pub struct SasToken {
    token: String,
    expires_at_millis: i64,
}

impl SasToken {
    /// Full `SharedAccessSignature ...` header value
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Expiry as milliseconds since the Unix epoch
    pub fn expires_at_millis(&self) -> i64 {
        self.expires_at_millis
    }

    /// Check whether the token has expired at the current time
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }

    /// Check whether the token has expired at `now_millis`
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        now_millis >= self.expires_at_millis
    }

    pub fn into_string(self) -> String {
        self.token
    }
}

impl fmt::Debug for SasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SasToken")
            .field("token", &"<redacted>")
            .field("expires_at_millis", &self.expires_at_millis)
            .finish()
    }
}

/// Signs resource URIs with a shared access key
///
/// Tokens are minted fresh for every call; nothing is cached, so client and
/// service clocks must agree to within the token lifetime.
#[derive(Clone)]
pub struct SasTokenSigner {
    key_name: String,
    key_value: String,
    ttl_minutes: i64,
}

impl SasTokenSigner {
    /// Create a signer with the default 60 minute token lifetime
    pub fn new(key_name: impl Into<String>, key_value: impl Into<String>) -> Self {
        Self {
            key_name: key_name.into(),
            key_value: key_value.into(),
            ttl_minutes: DEFAULT_TOKEN_TTL_MINUTES,
        }
    }

    /// Override the token lifetime
    pub fn with_ttl_minutes(mut self, ttl_minutes: i64) -> Self {
        self.ttl_minutes = ttl_minutes;
        self
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    pub fn ttl_minutes(&self) -> i64 {
        self.ttl_minutes
    }

    /// Namespace-level token for `endpoint`
    pub fn sign(&self, endpoint: &str) -> SasToken {
        self.sign_at(endpoint, Utc::now())
    }

    /// Resource-scoped token for `endpoint/resource_path`.
    ///
    /// `resource_path` must not carry a query string; the service compares
    /// `sr` against the path only.
    pub fn sign_resource(&self, endpoint: &str, resource_path: &str) -> SasToken {
        self.sign_resource_at(endpoint, resource_path, Utc::now())
    }

    /// Namespace-level token computed as of `now`
    pub fn sign_at(&self, endpoint: &str, now: DateTime<Utc>) -> SasToken {
        self.sign_uri(&strip_endpoint(endpoint), now)
    }

    /// Resource-scoped token computed as of `now`
    pub fn sign_resource_at(
        &self,
        endpoint: &str,
        resource_path: &str,
        now: DateTime<Utc>,
    ) -> SasToken {
        let uri = format!("{}/{}", strip_endpoint(endpoint), resource_path);
        self.sign_uri(&uri, now)
    }

    fn sign_uri(&self, uri: &str, now: DateTime<Utc>) -> SasToken {
        let expiry = now.timestamp() + self.ttl_minutes * 60;
        let encoded_uri = encode_uri_component(uri);

        let string_to_sign = format!("{}\n{}", encoded_uri, expiry);
        let signature = encode_uri_component(&self.hmac_base64(string_to_sign.as_bytes()));

        let token = format!(
            "SharedAccessSignature sr={}&sig={}&se={}&skn={}",
            encoded_uri, signature, expiry, self.key_name
        );

        SasToken {
            token,
            expires_at_millis: expiry * 1000,
        }
    }

    /// Compute base64(HMAC-SHA256) keyed with the raw key bytes
    fn hmac_base64(&self, data: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.key_value.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(data);
        general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }
}

impl fmt::Debug for SasTokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SasTokenSigner")
            .field("key_name", &self.key_name)
            .field("key_value", &"<redacted>")
            .field("ttl_minutes", &self.ttl_minutes)
            .finish()
    }
}

/// Generate a token for `resource_uri` valid for `ttl_minutes` from now
pub fn generate_sas_token(
    resource_uri: &str,
    key_name: &str,
    key_value: &str,
    ttl_minutes: i64,
) -> SasToken {
    SasTokenSigner::new(key_name, key_value)
        .with_ttl_minutes(ttl_minutes)
        .sign(resource_uri)
}

/// Drop the `sb://` scheme and a single trailing slash
fn strip_endpoint(endpoint: &str) -> &str {
    let uri = endpoint.strip_prefix("sb://").unwrap_or(endpoint);
    uri.strip_suffix('/').unwrap_or(uri)
}
