//! Transport adapters for the [`McpClient`](toolgate_core::McpClient) port.

mod http;
mod jsonrpc;
mod stdio;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use toolgate_core::{McpClient, McpClientFactory, McpError, McpServerConfig, ServerInfo};

pub use http::HttpMcpClient;
pub use stdio::StdioMcpClient;

/// Factory producing HTTP clients for remote servers and stdio or HTTP
/// clients for configured servers.
pub struct DefaultMcpClientFactory {
    timeout: Duration,
}

impl DefaultMcpClientFactory {
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl McpClientFactory for DefaultMcpClientFactory {
    async fn connect_remote(&self, server: &ServerInfo) -> Result<Arc<dyn McpClient>, McpError> {
        tracing::debug!(server_id = %server.id, url = %server.url, "Connecting to remote MCP server");
        let client = HttpMcpClient::connect(&server.url, server.headers.clone(), self.timeout).await?;
        Ok(Arc::new(client))
    }

    async fn connect_configured(
        &self,
        name: &str,
        config: &McpServerConfig,
    ) -> Result<Arc<dyn McpClient>, McpError> {
        if let Some(url) = config.url.as_deref() {
            tracing::debug!(server = name, url, "Connecting to configured MCP server over http");
            let client = HttpMcpClient::connect(url, BTreeMap::new(), self.timeout).await?;
            return Ok(Arc::new(client));
        }
        tracing::debug!(server = name, "Spawning configured MCP server");
        let client = StdioMcpClient::spawn(name, config, self.timeout).await?;
        Ok(Arc::new(client))
    }
}
