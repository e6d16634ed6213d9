//! MCP server connectivity for toolgate.
//!
//! - [`client`]: stdio and HTTP transports behind the `McpClient` port
//! - [`ConnectionStore`]: bounded, idle-evicting store of live clients
//! - [`McpToolRegistry`]: tool and server records over the storage ports
//! - [`McpConnectionManager`]: connect, discover, execute, shut down
//! - [`oauth`]: authorization-code + PKCE flow and token refresh
//! - [`McpToolsService`]: list-actions and configured-server bootstrap

pub mod client;
mod connection_store;
mod manager;
pub mod oauth;
mod registry;
mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use client::{DefaultMcpClientFactory, HttpMcpClient, StdioMcpClient};
pub use connection_store::ConnectionStore;
pub use manager::{McpConnectionManager, connection_key};
pub use oauth::{OAuthError, OAuthFlowManager, OAuthHttp, ReqwestOAuthHttp};
pub use registry::McpToolRegistry;
pub use service::{
    ListActionsOutcome, ListActionsRequest, McpToolsService, TestToolCall, load_servers_config,
};
