//! OAuth token sets and in-flight authorization state.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::server::McpServerRequest;

/// Token endpoint and public client that issued a [`TokenSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenServerMeta {
    pub token_endpoint: String,
    pub client_id: String,
}

/// Tokens held for one (tenant, server) pair.
///
/// Refresh replaces the whole set; it is never patched in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub token_server: TokenServerMeta,
}

impl TokenSet {
    /// True while `expires_at` lies beyond `now + window`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.expires_at > now + window
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .field("token_server", &self.token_server)
            .finish()
    }
}

/// RFC 9728 protected-resource metadata (the fields we consume).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub authorization_servers: Vec<String>,
}

/// RFC 8414 authorization-server metadata (the fields we consume).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthServerMetadata {
    #[serde(default)]
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub registration_endpoint: Option<String>,
    #[serde(default)]
    pub code_challenge_methods_supported: Option<Vec<String>>,
}

impl AuthServerMetadata {
    /// Whether `method` is advertised, compared case-insensitively.
    pub fn supports_challenge_method(&self, method: &str) -> bool {
        self.code_challenge_methods_supported
            .iter()
            .flatten()
            .any(|m| m.eq_ignore_ascii_case(method))
    }
}

/// State of one in-flight authorization, keyed by the OAuth `state` value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthFlowMetaInfo {
    pub code_verifier: String,
    /// Resource (MCP server URL) being authorized.
    pub resource_url: String,
    pub auth_server: AuthServerMetadata,
    /// Request that started the flow.
    pub request: McpServerRequest,
    pub redirect_uri: String,
    /// Client id obtained through dynamic registration.
    pub client_id: String,
    /// Tenant that started the flow; callbacks arrive without one.
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl fmt::Debug for AuthFlowMetaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthFlowMetaInfo")
            .field("code_verifier", &"<redacted>")
            .field("resource_url", &self.resource_url)
            .field("auth_server", &self.auth_server)
            .field("request", &self.request)
            .field("redirect_uri", &self.redirect_uri)
            .field("client_id", &self.client_id)
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_in_secs: i64) -> TokenSet {
        TokenSet {
            access_token: "a".to_string(),
            refresh_token: Some("r".to_string()),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
            token_server: TokenServerMeta {
                token_endpoint: "https://as/token".to_string(),
                client_id: "c".to_string(),
            },
        }
    }

    #[test]
    fn test_freshness_window() {
        let window = Duration::seconds(300);
        assert!(token(3600).is_fresh_at(Utc::now(), window));
        assert!(!token(120).is_fresh_at(Utc::now(), window));
    }

    #[test]
    fn test_pkce_method_case_insensitive() {
        let meta = AuthServerMetadata {
            code_challenge_methods_supported: Some(vec!["plain".into(), "s256".into()]),
            ..Default::default()
        };
        assert!(meta.supports_challenge_method("S256"));
        assert!(!AuthServerMetadata::default().supports_challenge_method("S256"));
    }

    #[test]
    fn test_token_debug_hides_secrets() {
        let rendered = format!("{:?}", token(10));
        assert!(!rendered.contains("\"a\""));
        assert!(rendered.contains("<redacted>"));
    }
}
