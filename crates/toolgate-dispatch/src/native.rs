//! In-process tools.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use toolgate_core::{NativeTool, NativeToolDefinition, RequestContext, ToolError};

/// Registry of native tools, keyed by name.
///
/// Native tools are process-wide: they are the same for every tenant.
#[derive(Default)]
pub struct NativeToolRegistry {
    tools: HashMap<String, Arc<dyn NativeTool>>,
}

impl NativeToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ThinkTool));
        registry
    }

    /// Add `tool`, replacing any tool registered under the same name.
    pub fn register(&mut self, tool: Arc<dyn NativeTool>) {
        let name = tool.definition().name;
        self.tools.insert(name, tool);
    }

    pub fn find_by_name(&self, name: &str) -> Option<NativeToolDefinition> {
        self.tools.get(name).map(|tool| tool.definition())
    }

    pub fn definitions(&self) -> Vec<NativeToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    pub async fn execute(
        &self,
        ctx: &RequestContext,
        name: &str,
        arguments: &Value,
    ) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(format!("Native tool {name} not found")))?;
        tool.execute(ctx, arguments).await
    }
}

/// Scratchpad tool: records a thought and changes nothing.
pub struct ThinkTool;

impl ThinkTool {
    pub const NAME: &'static str = "think";
    pub const RESPONSE: &'static str = "Your thought has been logged.";
}

#[async_trait]
impl NativeTool for ThinkTool {
    fn definition(&self) -> NativeToolDefinition {
        NativeToolDefinition::new(
            Self::NAME,
            "Use the tool to think about something. It will not obtain new information or \
             change the database, but just append the thought to the log.",
            json!({
                "type": "object",
                "properties": {
                    "thought": {"type": "string", "description": "A thought to think about"}
                },
                "required": ["thought"],
                "additionalProperties": false
            }),
        )
    }

    async fn execute(&self, _ctx: &RequestContext, arguments: &Value) -> Result<String, ToolError> {
        let thought = arguments.get("thought").and_then(Value::as_str).unwrap_or_default();
        tracing::debug!(chars = thought.len(), "Thought logged");
        Ok(Self::RESPONSE.to_string())
    }
}
