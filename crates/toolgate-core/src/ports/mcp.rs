//! MCP transport ports.
//!
//! The wire protocol lives behind these traits; the connection manager only
//! sees discovered tools and call results.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::McpError;
use crate::domain::{CallToolResult, McpServerConfig, McpToolDescriptor, ServerInfo};

/// A live connection to one MCP server.
#[async_trait]
pub trait McpClient: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<McpToolDescriptor>, McpError>;

    /// Invoke `name` (server-local name) with per-call `headers`.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        headers: &BTreeMap<String, String>,
    ) -> Result<CallToolResult, McpError>;

    async fn close(&self) -> Result<(), McpError>;
}

/// Builds transport clients.
#[async_trait]
pub trait McpClientFactory: Send + Sync {
    /// Connect to a caller-supplied remote server using its headers.
    async fn connect_remote(&self, server: &ServerInfo) -> Result<Arc<dyn McpClient>, McpError>;

    /// Connect to a platform-hosted server from its launch configuration.
    async fn connect_configured(
        &self,
        name: &str,
        config: &McpServerConfig,
    ) -> Result<Arc<dyn McpClient>, McpError>;
}
