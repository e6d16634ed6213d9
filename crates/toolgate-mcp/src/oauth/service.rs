//! OAuth2 authorization-code flow with PKCE for protected MCP servers.
//!
//! A flow moves through start (discovery, registration, PKCE, persisted
//! state), callback (single-use state, code exchange) and token issue.
//! Issued tokens are refreshed ahead of expiry on later use.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use toolgate_core::{
    AuthFlowMetaInfo, AuthFlowRepository, AuthServerMetadata, AuthTokenRepository,
    McpServerRequest, RequestContext, TokenServerMeta, TokenSet,
};
use url::Url;

use super::OAuthError;
use super::discovery::{client_id_from, discover};
use super::http::OAuthHttp;
use super::pkce::{generate_pkce, random_state};

/// Tokens expiring within this window are refreshed before use.
pub const REFRESH_AHEAD_SECS: i64 = 300;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn parse(value: Value) -> Result<Self, OAuthError> {
        serde_json::from_value(value).map_err(|e| OAuthError::InvalidResponse(e.to_string()))
    }

    fn into_token_set(self, token_server: TokenServerMeta, previous_refresh: Option<String>) -> TokenSet {
        let expires_in = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: Utc::now() + Duration::seconds(expires_in),
            token_server,
        }
    }
}

pub struct OAuthFlowManager {
    http: Arc<dyn OAuthHttp>,
    tokens: Arc<dyn AuthTokenRepository>,
    flows: Arc<dyn AuthFlowRepository>,
}

impl OAuthFlowManager {
    pub fn new(
        http: Arc<dyn OAuthHttp>,
        tokens: Arc<dyn AuthTokenRepository>,
        flows: Arc<dyn AuthFlowRepository>,
    ) -> Self {
        Self {
            http,
            tokens,
            flows,
        }
    }

    /// Start an authorization for `request` and return the URL the user has
    /// to visit.
    pub async fn begin_flow(
        &self,
        ctx: &RequestContext,
        request: &McpServerRequest,
        redirect_uri: &str,
    ) -> Result<String, OAuthError> {
        let resource_url = request.server_url.as_str();
        let auth_server = discover(self.http.as_ref(), resource_url).await?;
        let client_id = self.register_client(&auth_server, redirect_uri).await?;

        let pkce = generate_pkce();
        let state = random_state();
        let location = authorization_url(&auth_server, &client_id, redirect_uri, &pkce.challenge, &state)?;

        let flow = AuthFlowMetaInfo {
            code_verifier: pkce.verifier,
            resource_url: resource_url.to_string(),
            auth_server,
            request: request.clone(),
            redirect_uri: redirect_uri.to_string(),
            client_id,
            tenant_id: ctx.tenant().map(str::to_string),
        };
        self.flows.save(&state, flow).await?;

        tracing::info!(
            server_label = %request.server_label,
            resource = %resource_url,
            "Started OAuth authorization flow"
        );
        Ok(location)
    }

    /// Dynamic client registration as a public client.
    async fn register_client(
        &self,
        auth_server: &AuthServerMetadata,
        redirect_uri: &str,
    ) -> Result<String, OAuthError> {
        let endpoint = auth_server
            .registration_endpoint
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or(OAuthError::NoRegistrationEndpoint)?;

        let body = json!({
            "application_type": "web",
            "redirect_uris": [redirect_uri],
            "grant_types": ["authorization_code", "refresh_token"],
            "token_endpoint_auth_method": "none",
        });
        let response = self.http.post_json(endpoint, &body).await?;
        client_id_from(&response)
    }

    /// Complete a flow: consume `state`, exchange `code` and persist the
    /// issued tokens under the originating tenant.
    ///
    /// Returns the originating request whose only header is the new access
    /// token.
    pub async fn handle_callback(
        &self,
        code: &str,
        state: &str,
    ) -> Result<McpServerRequest, OAuthError> {
        let Some(flow) = self.flows.consume(state).await? else {
            tracing::warn!("OAuth callback with unknown or expired state");
            return Err(OAuthError::InvalidState);
        };

        let token_endpoint = flow.auth_server.token_endpoint.as_str();
        let response = self
            .http
            .post_form(
                token_endpoint,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", flow.redirect_uri.as_str()),
                    ("code_verifier", flow.code_verifier.as_str()),
                    ("client_id", flow.client_id.as_str()),
                ],
            )
            .await?;

        let tokens = TokenResponse::parse(response)?.into_token_set(
            TokenServerMeta {
                token_endpoint: token_endpoint.to_string(),
                client_id: flow.client_id.clone(),
            },
            None,
        );
        let access_token = tokens.access_token.clone();

        let ctx = RequestContext {
            tenant_id: flow.tenant_id.clone(),
            ..RequestContext::anonymous()
        };
        let server_identifier = flow.request.to_server_info().server_identifier();
        self.tokens.put(&ctx, &server_identifier, tokens).await?;

        tracing::info!(
            server_label = %flow.request.server_label,
            "OAuth authorization completed"
        );
        Ok(flow.request.with_access_token(&access_token))
    }

    /// Access token for `request`, refreshed when it expires within
    /// [`REFRESH_AHEAD_SECS`].
    pub async fn ensure_fresh_access_token(
        &self,
        ctx: &RequestContext,
        request: &McpServerRequest,
    ) -> Result<String, OAuthError> {
        let server_identifier = request.to_server_info().server_identifier();
        let current = self
            .tokens
            .get(ctx, &server_identifier)
            .await?
            .ok_or(OAuthError::NoToken)?;

        if current.is_fresh_at(Utc::now(), Duration::seconds(REFRESH_AHEAD_SECS)) {
            return Ok(current.access_token);
        }

        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or(OAuthError::NoRefreshToken)?;
        tracing::debug!(server_label = %request.server_label, "Refreshing OAuth access token");

        let response = self
            .http
            .post_form(
                &current.token_server.token_endpoint,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token.as_str()),
                    ("client_id", current.token_server.client_id.as_str()),
                ],
            )
            .await?;

        let refreshed =
            TokenResponse::parse(response)?.into_token_set(current.token_server, Some(refresh_token));
        let access_token = refreshed.access_token.clone();
        self.tokens.put(ctx, &server_identifier, refreshed).await?;
        Ok(access_token)
    }
}

fn authorization_url(
    auth_server: &AuthServerMetadata,
    client_id: &str,
    redirect_uri: &str,
    challenge: &str,
    state: &str,
) -> Result<String, OAuthError> {
    let mut url = Url::parse(&auth_server.authorization_endpoint).map_err(|e| {
        OAuthError::InvalidUrl(format!("{}: {e}", auth_server.authorization_endpoint))
    })?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", "S256")
        .append_pair("state", state);
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::super::http::testing::FakeOAuthHttp;
    use super::super::pkce::challenge_for;
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use toolgate_core::{ErrorKind, StorageError, ToolError};

    const RESOURCE_META: &str = "https://mcp.example.com/.well-known/oauth-protected-resource";
    const AS_META: &str = "https://auth.example.com/.well-known/oauth-authorization-server";
    const REGISTER: &str = "https://auth.example.com/register";
    const TOKEN: &str = "https://auth.example.com/token";
    const REDIRECT: &str = "https://app.example.com/callback";

    #[derive(Default)]
    struct FakeTokens(Mutex<HashMap<(Option<String>, String), TokenSet>>);

    #[async_trait::async_trait]
    impl AuthTokenRepository for FakeTokens {
        async fn put(&self, ctx: &RequestContext, id: &str, tokens: TokenSet) -> Result<(), StorageError> {
            self.0
                .lock()
                .unwrap()
                .insert((ctx.tenant_id.clone(), id.to_string()), tokens);
            Ok(())
        }

        async fn get(&self, ctx: &RequestContext, id: &str) -> Result<Option<TokenSet>, StorageError> {
            Ok(self
                .0
                .lock()
                .unwrap()
                .get(&(ctx.tenant_id.clone(), id.to_string()))
                .cloned())
        }
    }

    #[derive(Default)]
    struct FakeFlows(Mutex<HashMap<String, AuthFlowMetaInfo>>);

    #[async_trait::async_trait]
    impl AuthFlowRepository for FakeFlows {
        async fn save(&self, state: &str, flow: AuthFlowMetaInfo) -> Result<(), StorageError> {
            self.0.lock().unwrap().insert(state.to_string(), flow);
            Ok(())
        }

        async fn consume(&self, state: &str) -> Result<Option<AuthFlowMetaInfo>, StorageError> {
            Ok(self.0.lock().unwrap().remove(state))
        }
    }

    fn discoverable(registration: bool) -> FakeOAuthHttp {
        let mut as_meta = json!({
            "issuer": "https://auth.example.com",
            "authorization_endpoint": "https://auth.example.com/authorize",
            "token_endpoint": TOKEN,
            "code_challenge_methods_supported": ["S256"],
        });
        if registration {
            as_meta["registration_endpoint"] = json!(REGISTER);
        }
        FakeOAuthHttp::new()
            .with_json(
                RESOURCE_META,
                json!({"authorization_servers": ["https://auth.example.com"]}),
            )
            .with_json(AS_META, as_meta)
            .with_json(REGISTER, json!({"client_id": "client-123"}))
    }

    struct Harness {
        http: Arc<FakeOAuthHttp>,
        tokens: Arc<FakeTokens>,
        flows: Arc<FakeFlows>,
        manager: OAuthFlowManager,
    }

    fn harness(http: FakeOAuthHttp) -> Harness {
        let http = Arc::new(http);
        let tokens = Arc::new(FakeTokens::default());
        let flows = Arc::new(FakeFlows::default());
        let manager = OAuthFlowManager::new(http.clone(), tokens.clone(), flows.clone());
        Harness {
            http,
            tokens,
            flows,
            manager,
        }
    }

    fn request() -> McpServerRequest {
        McpServerRequest::new("gh", "https://mcp.example.com")
    }

    fn query(location: &str) -> HashMap<String, String> {
        Url::parse(location)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    fn stored_token(expires_in_secs: i64, refresh: Option<&str>) -> TokenSet {
        TokenSet {
            access_token: "old-access".to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
            token_server: TokenServerMeta {
                token_endpoint: TOKEN.to_string(),
                client_id: "client-123".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_begin_flow_builds_s256_authorization_url() {
        let h = harness(discoverable(true));
        let ctx = RequestContext::for_tenant("u1");

        let location = h.manager.begin_flow(&ctx, &request(), REDIRECT).await.unwrap();
        assert!(location.starts_with("https://auth.example.com/authorize?response_type=code&"));

        let params = query(&location);
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["client_id"], "client-123");
        assert_eq!(params["redirect_uri"], REDIRECT);

        let flows = h.flows.0.lock().unwrap();
        let flow = flows.get(&params["state"]).expect("state resolvable");
        assert_eq!(params["code_challenge"], challenge_for(&flow.code_verifier));
        assert_eq!(flow.tenant_id.as_deref(), Some("u1"));
        drop(flows);

        let calls = h.http.calls_to(REGISTER);
        let registration = &calls[0].body;
        assert_eq!(registration["token_endpoint_auth_method"], "none");
        assert_eq!(registration["redirect_uris"], json!([REDIRECT]));
    }

    #[tokio::test]
    async fn test_begin_flow_without_registration_endpoint_fails() {
        let h = harness(discoverable(false));
        let err = h
            .manager
            .begin_flow(&RequestContext::anonymous(), &request(), REDIRECT)
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::NoRegistrationEndpoint));
        assert!(h.flows.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_callback_with_unknown_state_never_exchanges() {
        let h = harness(discoverable(true).with_json(TOKEN, json!({"access_token": "t"})));
        let err = h.manager.handle_callback("code", "bogus").await.unwrap_err();
        assert_eq!(err.to_string(), "invalid_state");
        assert!(h.http.calls_to(TOKEN).is_empty());
    }

    #[tokio::test]
    async fn test_callback_exchanges_code_and_restores_tenant() {
        let h = harness(discoverable(true).with_json(
            TOKEN,
            json!({"access_token": "new-access", "refresh_token": "r1", "expires_in": 120}),
        ));
        let location = h
            .manager
            .begin_flow(&RequestContext::for_tenant("u1"), &request(), REDIRECT)
            .await
            .unwrap();
        let state = query(&location)["state"].clone();

        let annotated = h.manager.handle_callback("the-code", &state).await.unwrap();
        assert_eq!(annotated.headers.get("accessToken").map(String::as_str), Some("new-access"));

        let calls = h.http.calls_to(TOKEN);
        let form = &calls[0].body;
        assert_eq!(form["grant_type"], "authorization_code");
        assert_eq!(form["code"], "the-code");
        assert_eq!(form["client_id"], "client-123");
        assert!(form.get("client_secret").is_none());

        let stored = h
            .tokens
            .get(&RequestContext::for_tenant("u1"), "gh_https://mcp.example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("r1"));

        // single use
        let replay = h.manager.handle_callback("the-code", &state).await.unwrap_err();
        assert!(matches!(replay, OAuthError::InvalidState));
    }

    #[tokio::test]
    async fn test_token_endpoint_401_is_unauthorized_kind() {
        let h = harness(discoverable(true).with_status(TOKEN, 401));
        let location = h
            .manager
            .begin_flow(&RequestContext::anonymous(), &request(), REDIRECT)
            .await
            .unwrap();
        let state = query(&location)["state"].clone();

        let err = h.manager.handle_callback("code", &state).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(ToolError::from(err).is_unauthorized());
    }

    #[tokio::test]
    async fn test_fresh_token_never_calls_network() {
        let h = harness(FakeOAuthHttp::new());
        let ctx = RequestContext::for_tenant("u1");
        h.tokens
            .put(&ctx, "gh_https://mcp.example.com", stored_token(3600, Some("r")))
            .await
            .unwrap();

        let token = h.manager.ensure_fresh_access_token(&ctx, &request()).await.unwrap();
        assert_eq!(token, "old-access");
        assert!(h.http.calls().is_empty());
    }

    #[tokio::test]
    async fn test_near_expiry_refreshes_and_carries_refresh_token() {
        let h = harness(FakeOAuthHttp::new().with_json(TOKEN, json!({"access_token": "new-access"})));
        let ctx = RequestContext::for_tenant("u1");
        h.tokens
            .put(&ctx, "gh_https://mcp.example.com", stored_token(299, Some("r0")))
            .await
            .unwrap();

        let token = h.manager.ensure_fresh_access_token(&ctx, &request()).await.unwrap();
        assert_eq!(token, "new-access");

        let calls = h.http.calls_to(TOKEN);
        let form = &calls[0].body;
        assert_eq!(form["grant_type"], "refresh_token");
        assert_eq!(form["refresh_token"], "r0");

        let stored = h
            .tokens
            .get(&ctx, "gh_https://mcp.example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("r0"));
        assert!(stored.expires_at > Utc::now() + Duration::seconds(3500));
    }

    #[tokio::test]
    async fn test_missing_tokens_are_unauthorized() {
        let h = harness(FakeOAuthHttp::new());
        let ctx = RequestContext::for_tenant("u1");

        let err = h.manager.ensure_fresh_access_token(&ctx, &request()).await.unwrap_err();
        assert!(matches!(err, OAuthError::NoToken));

        h.tokens
            .put(&ctx, "gh_https://mcp.example.com", stored_token(10, None))
            .await
            .unwrap();
        let err = h.manager.ensure_fresh_access_token(&ctx, &request()).await.unwrap_err();
        assert!(matches!(err, OAuthError::NoRefreshToken));
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_refresh_401_is_unauthorized_kind() {
        let h = harness(FakeOAuthHttp::new().with_status(TOKEN, 401));
        let ctx = RequestContext::anonymous();
        h.tokens
            .put(&ctx, "gh_https://mcp.example.com", stored_token(0, Some("r0")))
            .await
            .unwrap();
        let err = h.manager.ensure_fresh_access_token(&ctx, &request()).await.unwrap_err();
        assert!(matches!(err, OAuthError::Unauthorized(_)));
    }
}
