//! Client-side tools: declared by the caller, executed by the caller's own
//! worker through the workflow engine.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use toolgate_core::{
    ClientSideExecution, FunctionTool, PluggableToolAdapter, PluggableToolDefinition,
    PluggedToolRequest, RequestContext, ToolError,
};

use crate::plugged::PluggedToolsRegistry;
use crate::workflow::WorkflowToolExecutor;

const PROPERTIES: &str = "properties";
const REQUIRED: &str = "required";
const EXECUTION_SPECS: &str = "execution_specs";
const CLIENT_SIDE: &str = "client_side";

pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 1;
pub const DEFAULT_WAIT_TIME_MS: u64 = 1_201_000;

/// `const` of a schema node, else the first of its `enum` values.
fn const_or_first_enum(node: Option<&Value>) -> Option<&Value> {
    let node = node?;
    node.get("const")
        .or_else(|| node.get("enum").and_then(Value::as_array).and_then(|v| v.first()))
}

/// Turn `function` into a client-side tool when its parameters carry an
/// `execution_specs` property of type `client_side`.
///
/// `execution_specs` is removed from the published parameters. `task_queue`
/// becomes both the tool id and its queue. Returns `Ok(None)` for tools that
/// are not client-side.
pub fn derive_client_side_tool(
    function: &FunctionTool,
    task_queue: String,
) -> Result<Option<PluggableToolDefinition>, ToolError> {
    let Some(description) = function.description.as_deref() else {
        return Ok(None);
    };
    let mut parameters = function.parameters.clone();
    let Some(properties) = parameters.get_mut(PROPERTIES).and_then(Value::as_object_mut) else {
        return Ok(None);
    };
    let Some(specs) = properties.get(EXECUTION_SPECS).filter(|s| s.is_object()) else {
        return Ok(None);
    };
    let spec_properties = specs.get(PROPERTIES);

    let kind = const_or_first_enum(spec_properties.and_then(|p| p.get("type")))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ToolError::Validation(format!("unable to find the type from {EXECUTION_SPECS}"))
        })?;
    if kind != CLIENT_SIDE {
        return Ok(None);
    }

    let max_retry_attempts =
        const_or_first_enum(spec_properties.and_then(|p| p.get("maxRetryAttempts")))
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(DEFAULT_MAX_RETRY_ATTEMPTS);
    let wait_time_ms = const_or_first_enum(spec_properties.and_then(|p| p.get("waitTimeInMillis")))
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_WAIT_TIME_MS);

    properties.remove(EXECUTION_SPECS);
    if let Some(required) = parameters.get_mut(REQUIRED).and_then(Value::as_array_mut) {
        required.retain(|r| r.as_str() != Some(EXECUTION_SPECS));
    }

    let mut tool = PluggableToolDefinition::new(&function.name, description, parameters);
    tool.id.clone_from(&task_queue);
    tool.execution = Some(ClientSideExecution {
        task_queue,
        max_retry_attempts,
        wait_time_ms,
    });
    Ok(Some(tool))
}

/// Adapter for tools registered through [`derive_client_side_tool`].
pub struct ClientSideToolAdapter {
    registry: Arc<PluggedToolsRegistry>,
    executor: Arc<WorkflowToolExecutor>,
}

impl ClientSideToolAdapter {
    pub fn new(registry: Arc<PluggedToolsRegistry>, executor: Arc<WorkflowToolExecutor>) -> Self {
        Self { registry, executor }
    }
}

#[async_trait]
impl PluggableToolAdapter for ClientSideToolAdapter {
    /// Claims tools present in the plugged-tools registry. The registry read
    /// refreshes the record's TTL.
    async fn try_claim(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Option<PluggableToolDefinition>, ToolError> {
        Ok(self
            .registry
            .get(ctx, name)
            .await?
            .filter(|tool| tool.execution.is_some()))
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        tool: &PluggableToolDefinition,
        request: PluggedToolRequest,
    ) -> Result<Option<String>, ToolError> {
        let execution = tool.execution.as_ref().ok_or_else(|| {
            ToolError::Validation(format!(
                "Available definition of {} is corrupt. Can't proceed",
                tool.name
            ))
        })?;
        let request = PluggedToolRequest {
            loop_id: request.loop_id.or_else(|| ctx.loop_id.clone()),
            ..request
        };
        self.executor.execute(execution, request).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn weather(specs: Value) -> FunctionTool {
        FunctionTool::new(
            "weather",
            json!({
                "type": "object",
                "properties": {
                    "city": {"type": "string"},
                    "execution_specs": specs
                },
                "required": ["city", "execution_specs"]
            }),
        )
        .with_description("Weather lookup")
    }

    #[test]
    fn test_derive_strips_execution_specs() {
        let function = weather(json!({
            "type": "object",
            "properties": {
                "type": {"const": "client_side"},
                "maxRetryAttempts": {"enum": [3]},
                "waitTimeInMillis": {"const": 5000}
            }
        }));

        let tool = derive_client_side_tool(&function, "u1.weather".to_string())
            .unwrap()
            .unwrap();
        assert_eq!(tool.id, "u1.weather");
        assert_eq!(tool.name, "weather");
        assert_eq!(
            tool.execution,
            Some(ClientSideExecution {
                task_queue: "u1.weather".to_string(),
                max_retry_attempts: 3,
                wait_time_ms: 5000,
            })
        );
        assert!(tool.parameters["properties"].get("execution_specs").is_none());
        assert_eq!(tool.parameters["required"], json!(["city"]));
        assert_eq!(tool.event_meta.as_ref().map(|m| m.infix.as_str()), Some("agc"));
    }

    #[test]
    fn test_derive_defaults() {
        let function = weather(json!({
            "properties": {"type": {"enum": ["client_side", "server_side"]}}
        }));
        let tool = derive_client_side_tool(&function, "u1.weather".to_string())
            .unwrap()
            .unwrap();
        let execution = tool.execution.unwrap();
        assert_eq!(execution.max_retry_attempts, 1);
        assert_eq!(execution.wait_time_ms, 1_201_000);
    }

    #[test]
    fn test_other_types_are_not_client_side() {
        let function = weather(json!({"properties": {"type": {"const": "server_side"}}}));
        assert!(
            derive_client_side_tool(&function, "q".to_string())
                .unwrap()
                .is_none()
        );

        let plain = FunctionTool::new("plain", json!({"type": "object", "properties": {}}))
            .with_description("no specs");
        assert!(derive_client_side_tool(&plain, "q".to_string()).unwrap().is_none());
    }

    #[test]
    fn test_missing_type_is_validation_error() {
        let function = weather(json!({"properties": {}}));
        let err = derive_client_side_tool(&function, "q".to_string()).unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }
}
