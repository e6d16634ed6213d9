//! Caller-facing MCP operations: listing a server's actions (with the
//! OAuth detour when needed) and bootstrapping configured servers.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolgate_core::{
    ErrorKind, FunctionTool, McpError, McpServerRequest, McpServersConfig, McpToolDefinition,
    RequestContext, ToolError,
};

use crate::manager::McpConnectionManager;
use crate::oauth::OAuthFlowManager;

/// A tool call made right after discovery to prove the server works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestToolCall {
    /// Tool name as the server knows it.
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListActionsRequest {
    pub server: McpServerRequest,
    /// Server requires OAuth.
    #[serde(default)]
    pub oauth: bool,
    #[serde(default)]
    pub test_tools: Vec<TestToolCall>,
}

impl ListActionsRequest {
    pub fn new(server: McpServerRequest) -> Self {
        Self {
            server,
            oauth: false,
            test_tools: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_oauth(mut self) -> Self {
        self.oauth = true;
        self
    }

    #[must_use]
    pub fn with_test_tool(mut self, name: impl Into<String>, arguments: Value) -> Self {
        self.test_tools.push(TestToolCall {
            name: name.into(),
            arguments,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListActionsOutcome {
    /// Discovered tools, named as the server knows them.
    Tools(Vec<FunctionTool>),
    /// The caller has to authorize first by visiting `location`.
    AuthorizationRequired { location: String },
}

pub struct McpToolsService {
    manager: Arc<McpConnectionManager>,
    oauth: Arc<OAuthFlowManager>,
    default_redirect_uri: Option<String>,
}

impl McpToolsService {
    pub fn new(
        manager: Arc<McpConnectionManager>,
        oauth: Arc<OAuthFlowManager>,
        default_redirect_uri: Option<String>,
    ) -> Self {
        Self {
            manager,
            oauth,
            default_redirect_uri,
        }
    }

    pub const fn manager(&self) -> &Arc<McpConnectionManager> {
        &self.manager
    }

    pub const fn oauth(&self) -> &Arc<OAuthFlowManager> {
        &self.oauth
    }

    /// Redirect target for a new flow: the caller's, else the configured one.
    pub fn redirect_uri_for<'a>(&'a self, ctx: &'a RequestContext) -> Option<&'a str> {
        ctx.redirect_uri
            .as_deref()
            .or(self.default_redirect_uri.as_deref())
            .filter(|uri| !uri.is_empty())
    }

    /// Discover the tools of the requested server.
    pub async fn list_actions(
        &self,
        ctx: &RequestContext,
        request: ListActionsRequest,
    ) -> Result<ListActionsOutcome, ToolError> {
        let server_request = if request.oauth {
            match self
                .oauth
                .ensure_fresh_access_token(ctx, &request.server)
                .await
            {
                Ok(token) => request.server.with_bearer_token(&token),
                Err(e) if e.kind() == ErrorKind::Unauthorized => {
                    tracing::info!(
                        server_label = %request.server.server_label,
                        reason = %e,
                        "MCP server needs authorization"
                    );
                    let redirect_uri = self.redirect_uri_for(ctx).ok_or_else(|| {
                        ToolError::Validation(
                            "a redirect URI is required to authorize this MCP server".to_string(),
                        )
                    })?;
                    let location = self
                        .oauth
                        .begin_flow(ctx, &request.server, redirect_uri)
                        .await?;
                    return Ok(ListActionsOutcome::AuthorizationRequired { location });
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            request.server.clone()
        };

        let server = server_request.to_server_info();
        let tools = self
            .manager
            .init_remote(ctx, server.clone(), &server_request.allowed_tools)
            .await?;

        for call in &request.test_tools {
            if let Err(e) = self.run_test_tool(ctx, &server.qualified_tool_name(&call.name), call).await {
                tracing::warn!(server_id = %server.id, tool = %call.name, error = %e, "Test tool failed");
                self.manager
                    .registry()
                    .remove_server(ctx, &server.server_identifier())
                    .await?;
                return Err(e);
            }
        }

        Ok(ListActionsOutcome::Tools(
            tools.iter().map(unqualified_function_tool).collect(),
        ))
    }

    async fn run_test_tool(
        &self,
        ctx: &RequestContext,
        qualified_name: &str,
        call: &TestToolCall,
    ) -> Result<(), ToolError> {
        let tool = self
            .manager
            .registry()
            .find_by_name(ctx, qualified_name)
            .await?
            .ok_or_else(|| ToolError::NotFound(format!("Tool {} not found", call.name)))?;
        let result = self
            .manager
            .execute_tool(ctx, &tool, call.arguments.clone())
            .await?;
        if result.is_error {
            return Err(ToolError::Transport(format!(
                "Test call to {} failed: {}",
                call.name,
                result.text()
            )));
        }
        Ok(())
    }

    /// Connect every configured server and register its tools.
    ///
    /// Servers that fail are logged and skipped. Returns how many connected.
    pub async fn load_configured_servers(
        &self,
        ctx: &RequestContext,
        config: &McpServersConfig,
    ) -> usize {
        let mut connected = 0;
        for (name, server) in &config.mcp_servers {
            match self.manager.init_configured(ctx, name, server).await {
                Ok(tools) => {
                    tracing::info!(server = %name, tools = tools.len(), "Loaded configured MCP server");
                    connected += 1;
                }
                Err(e) => {
                    tracing::error!(server = %name, error = %e, "Failed to load configured MCP server");
                }
            }
        }
        connected
    }
}

fn unqualified_function_tool(tool: &McpToolDefinition) -> FunctionTool {
    FunctionTool {
        name: tool.server_local_name().to_string(),
        description: Some(tool.description.clone()).filter(|d| !d.is_empty()),
        parameters: tool.parameters.clone(),
        strict: false,
    }
}

/// Read a `{"mcpServers": {...}}` file.
pub async fn load_servers_config(path: &Path) -> Result<McpServersConfig, McpError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| McpError::InvalidConfig(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| McpError::InvalidConfig(format!("{}: {e}", path.display())))
}
