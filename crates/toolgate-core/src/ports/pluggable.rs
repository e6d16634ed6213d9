//! Pluggable adapter port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ToolError;
use crate::context::RequestContext;
use crate::domain::PluggableToolDefinition;

/// Execution request handed to a pluggable adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluggedToolRequest {
    pub name: String,
    /// JSON-encoded arguments, passed through untouched.
    pub arguments: String,
    #[serde(default)]
    pub loop_id: Option<String>,
}

/// One link of the adapter chain.
///
/// `try_claim` decides ownership of a tool name. It may do lookup work but
/// never executes anything; `execute` is only called on the adapter that
/// claimed the tool.
#[async_trait]
pub trait PluggableToolAdapter: Send + Sync {
    async fn try_claim(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Option<PluggableToolDefinition>, ToolError>;

    async fn execute(
        &self,
        ctx: &RequestContext,
        tool: &PluggableToolDefinition,
        request: PluggedToolRequest,
    ) -> Result<Option<String>, ToolError>;
}
