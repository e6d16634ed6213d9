//! Per-tenant registry of tools executed through pluggable adapters.

use std::sync::Arc;

use toolgate_core::{
    PluggableToolDefinition, RequestContext, ToolDefinition, ToolError, ToolKind,
    ToolRegistryStorage,
};

pub struct PluggedToolsRegistry {
    tools: Arc<dyn ToolRegistryStorage>,
}

impl PluggedToolsRegistry {
    pub fn new(tools: Arc<dyn ToolRegistryStorage>) -> Self {
        Self { tools }
    }

    pub async fn add(
        &self,
        ctx: &RequestContext,
        tool: PluggableToolDefinition,
    ) -> Result<(), ToolError> {
        tracing::debug!(tool = %tool.name, "Registering plugged tool");
        self.tools.add(ctx, ToolDefinition::Pluggable(tool)).await?;
        Ok(())
    }

    pub async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Option<PluggableToolDefinition>, ToolError> {
        Ok(match self.tools.get(ctx, name, ToolKind::Pluggable).await? {
            Some(ToolDefinition::Pluggable(tool)) => Some(tool),
            _ => None,
        })
    }

    pub async fn invalidate(&self, ctx: &RequestContext, name: &str) -> Result<(), ToolError> {
        self.tools.remove(ctx, name, ToolKind::Pluggable).await?;
        Ok(())
    }

    /// `<tenant>.<name>`: id and task queue of a tenant's plugged tool.
    pub fn tool_key(ctx: &RequestContext, name: &str) -> Result<String, ToolError> {
        let tenant = ctx.tenant().ok_or_else(|| {
            ToolError::Validation("unable to find the tenant in the request context".to_string())
        })?;
        Ok(format!("{tenant}.{name}"))
    }
}
