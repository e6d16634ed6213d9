//! Tool dispatcher: resolves a name to a definition and runs it on the
//! backend that owns its kind.
//!
//! Resolution order is native, then MCP, then the pluggable adapter chain.
//! The first match wins; same-named tools are never merged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolgate_core::{
    FunctionTool, McpServerRequest, McpToolDefinition, NativeToolDefinition, PluggedToolRequest,
    RequestContext, ToolDefinition, ToolError, ToolHosting,
};
use toolgate_mcp::McpToolsService;

use crate::chain::{AdapterChain, ClaimedTool};
use crate::client_side::derive_client_side_tool;
use crate::native::NativeToolRegistry;
use crate::plugged::PluggedToolsRegistry;

/// Result of one tool execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    /// The tool ran but reported a failure in `content`.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }
}

enum Resolved {
    Native(NativeToolDefinition),
    Mcp(McpToolDefinition),
    Plugged(ClaimedTool),
}

pub struct ToolService {
    native: Arc<NativeToolRegistry>,
    mcp: Arc<McpToolsService>,
    chain: Arc<AdapterChain>,
    plugged: Arc<PluggedToolsRegistry>,
}

impl ToolService {
    pub fn new(
        native: Arc<NativeToolRegistry>,
        mcp: Arc<McpToolsService>,
        chain: Arc<AdapterChain>,
        plugged: Arc<PluggedToolsRegistry>,
    ) -> Self {
        Self {
            native,
            mcp,
            chain,
            plugged,
        }
    }

    pub const fn mcp(&self) -> &Arc<McpToolsService> {
        &self.mcp
    }

    async fn resolve(&self, ctx: &RequestContext, name: &str) -> Result<Option<Resolved>, ToolError> {
        if let Some(tool) = self.native.find_by_name(name) {
            return Ok(Some(Resolved::Native(tool)));
        }
        if let Some(tool) = self.mcp.manager().registry().find_by_name(ctx, name).await? {
            return Ok(Some(Resolved::Mcp(tool)));
        }
        Ok(self.chain.claim(ctx, name).await?.map(Resolved::Plugged))
    }

    pub async fn find_tool(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Option<ToolDefinition>, ToolError> {
        Ok(self.resolve(ctx, name).await?.map(|resolved| match resolved {
            Resolved::Native(tool) => ToolDefinition::Native(tool),
            Resolved::Mcp(tool) => ToolDefinition::Mcp(tool),
            Resolved::Plugged(claimed) => ToolDefinition::Pluggable(claimed.tool),
        }))
    }

    /// The tool in the shape handed to the model, if it is known.
    pub async fn get_function_tool(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Option<FunctionTool>, ToolError> {
        Ok(self
            .find_tool(ctx, name)
            .await?
            .map(|tool| tool.to_function_tool()))
    }

    /// Execute `name` with JSON-encoded `arguments`.
    ///
    /// An unauthorized MCP call invalidates the tool and its server first.
    /// Interactive callers then get [`ToolError::AuthorizationRequired`]
    /// pointing at a fresh authorization URL; others get
    /// [`ToolError::Unauthorized`].
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        name: &str,
        arguments: &str,
    ) -> Result<ToolOutput, ToolError> {
        let resolved = self
            .resolve(ctx, name)
            .await?
            .ok_or_else(|| ToolError::NotFound(format!("Tool {name} not found")))?;

        let output = match resolved {
            Resolved::Native(_) => {
                let arguments = parse_arguments(name, arguments)?;
                ToolOutput::text(self.native.execute(ctx, name, &arguments).await?)
            }
            Resolved::Mcp(tool) => self.execute_mcp(ctx, &tool, arguments).await?,
            Resolved::Plugged(claimed) => {
                let request = PluggedToolRequest {
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                    loop_id: ctx.loop_id.clone(),
                };
                let content = claimed.execute(ctx, request).await?;
                ToolOutput::text(content.unwrap_or_default())
            }
        };
        tracing::debug!(tool = name, is_error = output.is_error, "Tool executed");
        Ok(output)
    }

    async fn execute_mcp(
        &self,
        ctx: &RequestContext,
        tool: &McpToolDefinition,
        arguments: &str,
    ) -> Result<ToolOutput, ToolError> {
        let arguments = parse_arguments(&tool.name, arguments)?;
        let manager = self.mcp.manager();
        match manager.execute_tool(ctx, tool, arguments).await {
            Ok(result) => Ok(ToolOutput {
                content: result.text(),
                is_error: result.is_error,
            }),
            Err(e) if e.is_unauthorized() => {
                manager.registry().invalidate_tool(ctx, tool).await?;
                tracing::warn!(tool = %tool.name, server_id = %tool.server.id, "MCP tool unauthorized");
                Err(self.reauthorize(ctx, tool, e).await)
            }
            Err(e) => Err(e),
        }
    }

    /// Redirect for interactive callers of remote servers, else `error`.
    async fn reauthorize(
        &self,
        ctx: &RequestContext,
        tool: &McpToolDefinition,
        error: ToolError,
    ) -> ToolError {
        if !ctx.accepts_redirects || tool.hosting != ToolHosting::Remote {
            return error;
        }
        let Some(redirect_uri) = self.mcp.redirect_uri_for(ctx) else {
            return error;
        };
        let request = McpServerRequest::new(&tool.server.id, &tool.server.url);
        match self.mcp.oauth().begin_flow(ctx, &request, redirect_uri).await {
            Ok(location) => ToolError::AuthorizationRequired { location },
            Err(flow_error) => {
                tracing::warn!(server_id = %tool.server.id, error = %flow_error, "Could not restart OAuth flow");
                error
            }
        }
    }

    /// Register `function` as a client-side tool of the current tenant when
    /// it declares client-side execution.
    ///
    /// Returns the cleaned function tool, or `None` when the function is not
    /// client-side or there is no tenant.
    pub async fn derive_pluggable_tool(
        &self,
        ctx: &RequestContext,
        function: &FunctionTool,
    ) -> Result<Option<FunctionTool>, ToolError> {
        if ctx.tenant().is_none() || function.description.is_none() {
            return Ok(None);
        }
        let task_queue = PluggedToolsRegistry::tool_key(ctx, &function.name)?;
        let Some(tool) = derive_client_side_tool(function, task_queue)? else {
            return Ok(None);
        };
        let definition = ToolDefinition::Pluggable(tool.clone());
        self.plugged.add(ctx, tool).await?;
        Ok(Some(definition.to_function_tool()))
    }
}

fn parse_arguments(name: &str, arguments: &str) -> Result<Value, ToolError> {
    if arguments.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(arguments)
        .map_err(|e| ToolError::Validation(format!("Invalid arguments for tool {name}: {e}")))
}
