//! Live MCP connections and remote tool execution.
//!
//! Nothing about a server is persisted here beyond what the registry holds;
//! live clients sit in a bounded [`ConnectionStore`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use toolgate_core::{
    CallToolResult, McpClient, McpClientFactory, McpError, McpServerConfig, McpToolDefinition,
    RequestContext, ServerInfo, ServerRef, ToolError, ToolHosting,
};

use crate::connection_store::ConnectionStore;
use crate::registry::McpToolRegistry;

/// Key of a server's live client: remote servers by identifier, managed
/// servers by name.
pub fn connection_key(hosting: ToolHosting, server: &ServerRef) -> String {
    match hosting {
        ToolHosting::Remote => server.server_identifier(),
        ToolHosting::Managed | ToolHosting::Plug => server.id.clone(),
    }
}

/// Creates, caches and tears down MCP clients and executes tools on them.
pub struct McpConnectionManager {
    factory: Arc<dyn McpClientFactory>,
    registry: Arc<McpToolRegistry>,
    connections: ConnectionStore,
    call_timeout: Duration,
}

impl McpConnectionManager {
    pub fn new(
        factory: Arc<dyn McpClientFactory>,
        registry: Arc<McpToolRegistry>,
        connections: ConnectionStore,
        call_timeout: Duration,
    ) -> Self {
        Self {
            factory,
            registry,
            connections,
            call_timeout,
        }
    }

    pub const fn registry(&self) -> &Arc<McpToolRegistry> {
        &self.registry
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, McpError>
    where
        F: Future<Output = Result<T, McpError>> + Send,
    {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| McpError::Timeout(self.call_timeout))?
    }

    /// Connect to a platform-hosted server and keep its client under `name`.
    pub async fn connect(
        &self,
        name: &str,
        config: &McpServerConfig,
    ) -> Result<Arc<dyn McpClient>, McpError> {
        let client = self.factory.connect_configured(name, config).await?;
        self.connections.insert(name.to_string(), Arc::clone(&client));
        tracing::info!(server = name, "Connected configured MCP server");
        Ok(client)
    }

    /// Discover the tools of a connected server, register each one and
    /// upsert the server record with the discovered names.
    ///
    /// `allowed_tools`, when non-empty, restricts what gets registered.
    pub async fn list_tools(
        &self,
        ctx: &RequestContext,
        server: &ServerInfo,
        hosting: ToolHosting,
        allowed_tools: &[String],
    ) -> Result<Vec<McpToolDefinition>, ToolError> {
        let key = connection_key(hosting, &ServerRef::from(server));
        let client = self.connections.get(&key).ok_or_else(|| {
            ToolError::Transport(format!("MCP server {} is not connected", server.id))
        })?;

        let descriptors = self.bounded(client.list_tools()).await?;
        let mut tools = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if !allowed_tools.is_empty() && !allowed_tools.contains(&descriptor.name) {
                continue;
            }
            let tool = McpToolDefinition::discovered(
                server,
                hosting,
                &descriptor.name,
                descriptor.description,
                descriptor
                    .input_schema
                    .unwrap_or_else(|| serde_json::json!({"type": "object"})),
            );
            self.registry.add_tool(ctx, tool.clone()).await?;
            tools.push(tool);
        }

        let record = server
            .clone()
            .with_tools(tools.iter().map(|t| t.name.clone()).collect());
        self.registry.add_server(ctx, record).await?;
        tracing::info!(server_id = %server.id, tools = tools.len(), "Discovered MCP tools");
        Ok(tools)
    }

    /// Connect to a caller-supplied remote server and discover its tools.
    pub async fn init_remote(
        &self,
        ctx: &RequestContext,
        server: ServerInfo,
        allowed_tools: &[String],
    ) -> Result<Vec<McpToolDefinition>, ToolError> {
        let client = self.factory.connect_remote(&server).await?;
        self.connections
            .insert(server.server_identifier(), client);
        self.list_tools(ctx, &server, ToolHosting::Remote, allowed_tools)
            .await
    }

    /// Connect to a configured server and register its tools as managed.
    pub async fn init_configured(
        &self,
        ctx: &RequestContext,
        name: &str,
        config: &McpServerConfig,
    ) -> Result<Vec<McpToolDefinition>, ToolError> {
        self.connect(name, config).await?;
        self.list_tools(ctx, &ServerInfo::unaddressed(name), ToolHosting::Managed, &[])
            .await
    }

    /// Execute `tool` with the server's current headers.
    ///
    /// A missing remote client is re-established (with rediscovery) first.
    /// Authorization failures are returned as-is; invalidation is the
    /// caller's decision.
    pub async fn execute_tool(
        &self,
        ctx: &RequestContext,
        tool: &McpToolDefinition,
        arguments: Value,
    ) -> Result<CallToolResult, ToolError> {
        let key = connection_key(tool.hosting, &tool.server);
        let server = self
            .registry
            .find_server_by_id(ctx, &tool.server.server_identifier())
            .await?;

        let client = match self.connections.get(&key) {
            Some(client) => client,
            None => self.reconnect(ctx, tool, server.clone(), &key).await?,
        };

        let headers = server.map(|s| s.headers).unwrap_or_default();
        let name = tool.server_local_name();
        tracing::debug!(tool = name, server_id = %tool.server.id, "Executing MCP tool");
        let result = self
            .bounded(client.call_tool(name, arguments, &headers))
            .await?;
        Ok(result)
    }

    async fn reconnect(
        &self,
        ctx: &RequestContext,
        tool: &McpToolDefinition,
        server: Option<ServerInfo>,
        key: &str,
    ) -> Result<Arc<dyn McpClient>, ToolError> {
        if tool.hosting != ToolHosting::Remote {
            return Err(ToolError::Transport(format!(
                "MCP server {} is not connected",
                tool.server.id
            )));
        }
        tracing::info!(server_id = %tool.server.id, "No live client, reconnecting to MCP server");
        let server =
            server.unwrap_or_else(|| ServerInfo::new(&tool.server.id, &tool.server.url));
        // keep the restriction the server was first registered with
        let allowed: Vec<String> = server
            .tools
            .iter()
            .map(|name| server.unqualified_tool_name(name).to_string())
            .collect();
        self.init_remote(ctx, server, &allowed).await?;
        self.connections.get(key).ok_or_else(|| {
            ToolError::Transport(format!(
                "MCP server {} did not stay connected after rediscovery",
                tool.server.id
            ))
        })
    }

    /// Close every live client. Failures are logged, never propagated.
    pub async fn shutdown(&self) {
        let clients = self.connections.drain();
        tracing::info!(count = clients.len(), "Shutting down MCP clients");
        for (server, client) in clients {
            if let Err(e) = client.close().await {
                tracing::warn!(server = %server, error = %e, "Failed to close MCP client");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeMcpClient, FakeMcpClientFactory, FakeResponse};
    use std::collections::BTreeMap;
    use toolgate_core::{ErrorKind, Keyspace};
    use toolgate_store::{LocalServerStorage, LocalToolStorage};

    fn manager(factory: &Arc<FakeMcpClientFactory>) -> McpConnectionManager {
        let keyspace = Keyspace::new("test", "toolgate");
        let registry = Arc::new(McpToolRegistry::new(
            Arc::new(LocalToolStorage::new(
                keyspace.clone(),
                100,
                Duration::from_secs(600),
            )),
            Arc::new(LocalServerStorage::new(keyspace, 100, Duration::from_secs(540))),
        ));
        McpConnectionManager::new(
            Arc::clone(factory) as Arc<dyn McpClientFactory>,
            registry,
            ConnectionStore::new(10, Duration::from_secs(60)),
            Duration::from_secs(5),
        )
    }

    fn github() -> ServerInfo {
        ServerInfo::new("gh", "https://mcp.github.test").with_headers(BTreeMap::from([(
            "Authorization".to_string(),
            "Bearer t0".to_string(),
        )]))
    }

    #[tokio::test]
    async fn test_init_remote_registers_qualified_tools() {
        let factory = Arc::new(FakeMcpClientFactory::new());
        factory.register("gh", Arc::new(FakeMcpClient::with_tools(&["search", "issues"])));
        let manager = manager(&factory);
        let ctx = RequestContext::for_tenant("u1");

        let tools = manager.init_remote(&ctx, github(), &[]).await.unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["gh_search", "gh_issues"]);

        let found = manager.registry().find_by_name(&ctx, "gh_search").await.unwrap();
        assert!(found.is_some());
        let server = manager
            .registry()
            .find_server_by_id(&ctx, "gh_https://mcp.github.test")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(server.tools, vec!["gh_search", "gh_issues"]);

        // other tenants see nothing
        let other = RequestContext::for_tenant("u2");
        assert!(manager.registry().find_by_name(&other, "gh_search").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_allowed_tools_filter_discovery() {
        let factory = Arc::new(FakeMcpClientFactory::new());
        factory.register("gh", Arc::new(FakeMcpClient::with_tools(&["search", "issues"])));
        let manager = manager(&factory);

        let tools = manager
            .init_remote(&RequestContext::anonymous(), github(), &["issues".to_string()])
            .await
            .unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].server_local_name(), "issues");
    }

    #[tokio::test]
    async fn test_execute_uses_local_name_and_registry_headers() {
        let factory = Arc::new(FakeMcpClientFactory::new());
        let client = Arc::new(FakeMcpClient::with_tools(&["search"]));
        client.respond("search", FakeResponse::text("3 results"));
        factory.register("gh", Arc::clone(&client));
        let manager = manager(&factory);
        let ctx = RequestContext::anonymous();

        let tools = manager.init_remote(&ctx, github(), &[]).await.unwrap();
        let result = manager
            .execute_tool(&ctx, &tools[0], serde_json::json!({"q": "rust"}))
            .await
            .unwrap();
        assert_eq!(result.text(), "3 results");

        let calls = client.calls();
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].headers["Authorization"], "Bearer t0");
    }

    #[tokio::test]
    async fn test_missing_client_reconnects_and_rediscovers() {
        let factory = Arc::new(FakeMcpClientFactory::new());
        let client = Arc::new(FakeMcpClient::with_tools(&["search"]));
        factory.register("gh", Arc::clone(&client));
        let manager = manager(&factory);
        let ctx = RequestContext::anonymous();

        let tools = manager.init_remote(&ctx, github(), &[]).await.unwrap();
        manager.connections.remove(&connection_key(ToolHosting::Remote, &tools[0].server));

        let result = manager
            .execute_tool(&ctx, &tools[0], serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(result.text(), "ok:search");
        assert_eq!(factory.connects(), 2);
        // rediscovery reuses the recorded headers
        assert_eq!(factory.seen_headers()[1]["Authorization"], "Bearer t0");
    }

    #[tokio::test]
    async fn test_rediscovery_keeps_allowed_tools() {
        let factory = Arc::new(FakeMcpClientFactory::new());
        factory.register("gh", Arc::new(FakeMcpClient::with_tools(&["search", "issues"])));
        let manager = manager(&factory);
        let ctx = RequestContext::for_tenant("u1");

        let tools = manager
            .init_remote(&ctx, github(), &["issues".to_string()])
            .await
            .unwrap();
        manager.connections.remove(&connection_key(ToolHosting::Remote, &tools[0].server));

        manager
            .execute_tool(&ctx, &tools[0], serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(factory.connects(), 2);
        assert!(manager.registry().find_by_name(&ctx, "gh_search").await.unwrap().is_none());
        let server = manager
            .registry()
            .find_server_by_id(&ctx, "gh_https://mcp.github.test")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(server.tools, vec!["gh_issues"]);
    }

    #[tokio::test]
    async fn test_failed_rediscovery_is_transport_error() {
        let factory = Arc::new(FakeMcpClientFactory::new());
        factory.register("gh", Arc::new(FakeMcpClient::with_tools(&["search"])));
        let manager = manager(&factory);
        let ctx = RequestContext::anonymous();

        let tools = manager.init_remote(&ctx, github(), &[]).await.unwrap();
        manager.connections.remove(&connection_key(ToolHosting::Remote, &tools[0].server));
        factory.unregister("gh");

        let err = manager
            .execute_tool(&ctx, &tools[0], serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_managed_tool_without_client_fails() {
        let factory = Arc::new(FakeMcpClientFactory::new());
        factory.register("fs", Arc::new(FakeMcpClient::with_tools(&["read_file"])));
        let manager = manager(&factory);
        let ctx = RequestContext::anonymous();

        let tools = manager
            .init_configured(&ctx, "fs", &McpServerConfig::default())
            .await
            .unwrap();
        assert_eq!(tools[0].name, "read_file");
        manager.connections.remove("fs");

        let err = manager
            .execute_tool(&ctx, &tools[0], serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Transport(_)));
        assert_eq!(factory.connects(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_call_is_returned_unchanged() {
        let factory = Arc::new(FakeMcpClientFactory::new());
        let client = Arc::new(FakeMcpClient::with_tools(&["search"]));
        client.respond("search", FakeResponse::Unauthorized);
        factory.register("gh", client);
        let manager = manager(&factory);
        let ctx = RequestContext::anonymous();

        let tools = manager.init_remote(&ctx, github(), &[]).await.unwrap();
        let err = manager
            .execute_tool(&ctx, &tools[0], serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        // still registered; invalidation is up to the caller
        assert!(manager.registry().find_by_name(&ctx, "gh_search").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_removes_tool_and_server() {
        let factory = Arc::new(FakeMcpClientFactory::new());
        factory.register("gh", Arc::new(FakeMcpClient::with_tools(&["search"])));
        let manager = manager(&factory);
        let ctx = RequestContext::for_tenant("u1");

        let tools = manager.init_remote(&ctx, github(), &[]).await.unwrap();
        manager.registry().invalidate_tool(&ctx, &tools[0]).await.unwrap();

        assert!(manager.registry().find_by_name(&ctx, "gh_search").await.unwrap().is_none());
        assert!(
            manager
                .registry()
                .find_server_by_id(&ctx, "gh_https://mcp.github.test")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_shutdown_swallows_close_failures() {
        let factory = Arc::new(FakeMcpClientFactory::new());
        let failing = Arc::new(FakeMcpClient::with_tools(&["a"]).failing_close());
        let healthy = Arc::new(FakeMcpClient::with_tools(&["b"]));
        factory.register("one", Arc::clone(&failing));
        factory.register("two", Arc::clone(&healthy));
        let manager = manager(&factory);

        manager.connect("one", &McpServerConfig::default()).await.unwrap();
        manager.connect("two", &McpServerConfig::default()).await.unwrap();
        manager.shutdown().await;

        assert_eq!(failing.closes(), 1);
        assert_eq!(healthy.closes(), 1);
        assert!(manager.connections.get("one").is_none());
    }
}
