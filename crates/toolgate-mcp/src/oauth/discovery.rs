//! Authorization-server discovery for a protected MCP resource.
//!
//! RFC 9728 protected-resource metadata is looked up path-scoped first and
//! at the root second; the first advertised authorization server is then
//! resolved through RFC 8414 metadata.

use serde_json::Value;
use toolgate_core::{AuthServerMetadata, ProtectedResourceMetadata};
use url::Url;

use super::OAuthError;
use super::http::OAuthHttp;

const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";
const AUTHORIZATION_SERVER_PATH: &str = "/.well-known/oauth-authorization-server";

/// `(scheme://host[:port], path without surrounding slashes)`.
fn split_origin(raw: &str) -> Result<(String, String), OAuthError> {
    let url = Url::parse(raw).map_err(|e| OAuthError::InvalidUrl(format!("{raw}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| OAuthError::InvalidUrl(format!("{raw}: missing host")))?;
    let origin = match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    };
    Ok((origin, url.path().trim_matches('/').to_string()))
}

pub fn protected_resource_candidates(resource_url: &str) -> Result<Vec<String>, OAuthError> {
    let (origin, path) = split_origin(resource_url)?;
    let mut candidates = Vec::with_capacity(2);
    if !path.is_empty() {
        candidates.push(format!("{origin}{PROTECTED_RESOURCE_PATH}/{path}"));
    }
    candidates.push(format!("{origin}{PROTECTED_RESOURCE_PATH}"));
    Ok(candidates)
}

pub fn authorization_server_url(issuer: &str) -> Result<String, OAuthError> {
    let (origin, path) = split_origin(issuer)?;
    Ok(if path.is_empty() {
        format!("{origin}{AUTHORIZATION_SERVER_PATH}")
    } else {
        format!("{origin}{AUTHORIZATION_SERVER_PATH}/{path}")
    })
}

async fn fetch_first<T: serde::de::DeserializeOwned>(
    http: &dyn OAuthHttp,
    candidates: &[String],
) -> Option<T> {
    for url in candidates {
        match http.get_json(url).await.map(serde_json::from_value::<T>) {
            Ok(Ok(found)) => {
                tracing::info!(url = %url, "Discovered OAuth metadata");
                return Some(found);
            }
            Ok(Err(e)) => tracing::debug!(url = %url, error = %e, "Malformed OAuth metadata"),
            Err(e) => tracing::debug!(url = %url, error = %e, "OAuth metadata not available"),
        }
    }
    None
}

/// Resolve the authorization server for `resource_url`, requiring S256.
pub async fn discover(
    http: &dyn OAuthHttp,
    resource_url: &str,
) -> Result<AuthServerMetadata, OAuthError> {
    let candidates = protected_resource_candidates(resource_url)?;
    let resource: ProtectedResourceMetadata = fetch_first(http, &candidates)
        .await
        .ok_or_else(|| {
            OAuthError::Discovery(format!(
                "Unable to discover protected resource metadata for {resource_url}"
            ))
        })?;

    let issuer = resource.authorization_servers.first().ok_or_else(|| {
        OAuthError::Discovery(
            "Protected resource metadata did not advertise any authorization_servers".to_string(),
        )
    })?;

    let metadata_url = authorization_server_url(issuer)?;
    let mut metadata: AuthServerMetadata =
        fetch_first(http, std::slice::from_ref(&metadata_url))
            .await
            .ok_or_else(|| {
                OAuthError::Discovery(format!(
                    "Unable to discover OAuth AS metadata for issuer={issuer}"
                ))
            })?;

    if !metadata.supports_challenge_method("S256") {
        return Err(OAuthError::PkceUnsupported);
    }
    if metadata.issuer.trim().is_empty() {
        metadata.issuer.clone_from(issuer);
    }
    Ok(metadata)
}

/// Read `client_id` out of a registration response.
pub fn client_id_from(response: &Value) -> Result<String, OAuthError> {
    response
        .get("client_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| OAuthError::InvalidResponse("registration response has no client_id".into()))
}
