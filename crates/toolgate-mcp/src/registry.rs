//! MCP tool and server registry over the storage ports.

use std::sync::Arc;

use toolgate_core::{
    McpToolDefinition, RequestContext, ServerInfo, ServerInfoStorage, StorageError,
    ToolDefinition, ToolKind, ToolRegistryStorage,
};

/// Catalog of discovered MCP tools and the servers that expose them.
pub struct McpToolRegistry {
    tools: Arc<dyn ToolRegistryStorage>,
    servers: Arc<dyn ServerInfoStorage>,
}

impl McpToolRegistry {
    pub fn new(tools: Arc<dyn ToolRegistryStorage>, servers: Arc<dyn ServerInfoStorage>) -> Self {
        Self { tools, servers }
    }

    /// Upsert a tool under (tenant, name).
    pub async fn add_tool(
        &self,
        ctx: &RequestContext,
        tool: McpToolDefinition,
    ) -> Result<(), StorageError> {
        tracing::debug!(tool = %tool.name, server_id = %tool.server.id, "Adding MCP tool");
        self.tools.add(ctx, ToolDefinition::Mcp(tool)).await
    }

    pub async fn find_by_name(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Option<McpToolDefinition>, StorageError> {
        let found = self.tools.get(ctx, name, ToolKind::Mcp).await?;
        Ok(match found {
            Some(ToolDefinition::Mcp(tool)) => Some(tool),
            _ => None,
        })
    }

    /// Drop a tool and its server's record so the next use rediscovers both.
    pub async fn invalidate_tool(
        &self,
        ctx: &RequestContext,
        tool: &McpToolDefinition,
    ) -> Result<(), StorageError> {
        self.tools.remove(ctx, &tool.name, ToolKind::Mcp).await?;
        self.servers
            .remove(ctx, &tool.server.server_identifier())
            .await?;
        tracing::info!(tool = %tool.name, server_id = %tool.server.id, "Invalidated MCP tool and server");
        Ok(())
    }

    pub async fn add_server(
        &self,
        ctx: &RequestContext,
        server: ServerInfo,
    ) -> Result<(), StorageError> {
        self.servers.add(ctx, server).await
    }

    pub async fn remove_server(
        &self,
        ctx: &RequestContext,
        server_identifier: &str,
    ) -> Result<(), StorageError> {
        self.servers.remove(ctx, server_identifier).await
    }

    pub async fn find_server_by_id(
        &self,
        ctx: &RequestContext,
        server_identifier: &str,
    ) -> Result<Option<ServerInfo>, StorageError> {
        self.servers.get(ctx, server_identifier).await
    }
}
