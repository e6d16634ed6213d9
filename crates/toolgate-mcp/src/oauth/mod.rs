//! OAuth2 + PKCE support for protected MCP servers.

mod discovery;
mod error;
pub mod http;
mod pkce;
mod service;

pub use discovery::{authorization_server_url, discover, protected_resource_candidates};
pub use error::OAuthError;
pub use http::{OAuthHttp, ReqwestOAuthHttp};
pub use pkce::{PkcePair, VERIFIER_BYTES, challenge_for, generate_pkce, random_state};
pub use service::{OAuthFlowManager, REFRESH_AHEAD_SECS};
