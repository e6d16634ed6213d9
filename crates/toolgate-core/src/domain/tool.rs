//! Tool definitions across the three execution kinds.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::function::FunctionTool;
use super::server::ServerInfo;

/// Execution kind of a tool. Part of every registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Statically registered, executed in-process.
    Native,
    /// Exposed by an MCP server.
    Mcp,
    /// Executed by a caller-controlled agent behind an adapter.
    Pluggable,
}

impl ToolKind {
    /// Slug used in cache keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Mcp => "mcp",
            Self::Pluggable => "pluggable",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a tool is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolHosting {
    /// Hosted by the platform (native tools, configured MCP servers).
    Managed,
    /// Hosted by a caller-supplied remote MCP server.
    Remote,
    /// Plugged in through an adapter.
    Plug,
}

/// Progress-reporting tag attached to tool events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolProgressEventMeta {
    pub infix: String,
}

impl ToolProgressEventMeta {
    pub fn new(infix: impl Into<String>) -> Self {
        Self {
            infix: infix.into(),
        }
    }
}

/// A tool implemented inside the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeToolDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_meta: Option<ToolProgressEventMeta>,
}

impl NativeToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            description: description.into(),
            parameters,
            event_meta: None,
        }
    }
}

/// Non-owning reference from an MCP tool to its server.
///
/// The server registry owns [`ServerInfo`]; tools only carry enough to look
/// it up again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerRef {
    /// Server label.
    pub id: String,
    pub url: String,
}

impl ServerRef {
    /// Same identity as [`ServerInfo::server_identifier`].
    pub fn server_identifier(&self) -> String {
        format!("{}_{}", self.id, self.url)
    }

    /// Strip this server's qualification prefix from `name`, if present.
    pub fn unqualified_tool_name<'a>(&self, name: &'a str) -> &'a str {
        name.strip_prefix(&self.id)
            .and_then(|rest| rest.strip_prefix('_'))
            .unwrap_or(name)
    }
}

impl From<&ServerInfo> for ServerRef {
    fn from(info: &ServerInfo) -> Self {
        Self {
            id: info.id.clone(),
            url: info.url.clone(),
        }
    }
}

/// A tool exposed by an MCP server.
///
/// Remote-hosted tools are registered under their qualified name
/// (`<label>_<tool>`) so the same tool name on two servers never collides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolDefinition {
    pub id: String,
    pub hosting: ToolHosting,
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub server: ServerRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_meta: Option<ToolProgressEventMeta>,
}

impl McpToolDefinition {
    /// Build a definition for a tool discovered on `server`.
    ///
    /// The registry name is qualified for [`ToolHosting::Remote`] and left
    /// as-is for managed servers.
    pub fn discovered(
        server: &ServerInfo,
        hosting: ToolHosting,
        tool_name: &str,
        description: Option<String>,
        parameters: Value,
    ) -> Self {
        let name = match hosting {
            ToolHosting::Remote => server.qualified_tool_name(tool_name),
            ToolHosting::Managed | ToolHosting::Plug => tool_name.to_string(),
        };
        Self {
            id: Uuid::new_v4().to_string(),
            hosting,
            name,
            description: description.unwrap_or_default(),
            parameters,
            server: ServerRef::from(server),
            event_meta: None,
        }
    }

    /// Name the owning server knows this tool by.
    pub fn server_local_name(&self) -> &str {
        match self.hosting {
            ToolHosting::Remote => self.server.unqualified_tool_name(&self.name),
            ToolHosting::Managed | ToolHosting::Plug => &self.name,
        }
    }
}

/// Execution parameters for a tool run by a caller-side agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSideExecution {
    /// Queue the caller's worker polls.
    pub task_queue: String,
    pub max_retry_attempts: u32,
    /// Start-to-close budget for one attempt.
    pub wait_time_ms: u64,
}

/// A tool executed through a pluggable adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluggableToolDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ClientSideExecution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_meta: Option<ToolProgressEventMeta>,
}

impl PluggableToolDefinition {
    /// Infix used for progress events of plugged tools.
    pub const EVENT_INFIX: &'static str = "agc";

    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            parameters,
            execution: None,
            event_meta: Some(ToolProgressEventMeta::new(Self::EVENT_INFIX)),
        }
    }
}

/// Closed union over the tool kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolDefinition {
    Native(NativeToolDefinition),
    Mcp(McpToolDefinition),
    Pluggable(PluggableToolDefinition),
}

impl ToolDefinition {
    pub fn id(&self) -> &str {
        match self {
            Self::Native(t) => &t.id,
            Self::Mcp(t) => &t.id,
            Self::Pluggable(t) => &t.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Native(t) => &t.name,
            Self::Mcp(t) => &t.name,
            Self::Pluggable(t) => &t.name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Native(t) => &t.description,
            Self::Mcp(t) => &t.description,
            Self::Pluggable(t) => &t.description,
        }
    }

    pub const fn kind(&self) -> ToolKind {
        match self {
            Self::Native(_) => ToolKind::Native,
            Self::Mcp(_) => ToolKind::Mcp,
            Self::Pluggable(_) => ToolKind::Pluggable,
        }
    }

    pub const fn hosting(&self) -> ToolHosting {
        match self {
            Self::Native(_) => ToolHosting::Managed,
            Self::Mcp(t) => t.hosting,
            Self::Pluggable(_) => ToolHosting::Plug,
        }
    }

    pub fn parameters(&self) -> &Value {
        match self {
            Self::Native(t) => &t.parameters,
            Self::Mcp(t) => &t.parameters,
            Self::Pluggable(t) => &t.parameters,
        }
    }

    pub const fn event_meta(&self) -> Option<&ToolProgressEventMeta> {
        match self {
            Self::Native(t) => t.event_meta.as_ref(),
            Self::Mcp(t) => t.event_meta.as_ref(),
            Self::Pluggable(t) => t.event_meta.as_ref(),
        }
    }

    /// Project into the function-tool shape handed to the model.
    pub fn to_function_tool(&self) -> FunctionTool {
        FunctionTool {
            name: self.name().to_string(),
            description: Some(self.description().to_string()).filter(|d| !d.is_empty()),
            parameters: self.parameters().clone(),
            strict: false,
        }
    }
}
