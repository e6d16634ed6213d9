use async_trait::async_trait;
use serde_json::Value;

use super::ToolError;
use crate::context::RequestContext;
use crate::domain::NativeToolDefinition;

/// A tool implemented in-process.
#[async_trait]
pub trait NativeTool: Send + Sync {
    fn definition(&self) -> NativeToolDefinition;

    async fn execute(&self, ctx: &RequestContext, arguments: &Value) -> Result<String, ToolError>;
}
