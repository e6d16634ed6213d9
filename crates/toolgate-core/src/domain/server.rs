//! MCP server records and the transport-facing value types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// URL placeholder for servers that are not reached over the network
/// (self-hosted servers spawned from configuration).
pub const UNADDRESSED_SERVER_URL: &str = "not_required";

pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Header carrying a freshly issued token back to the caller after an
/// OAuth callback.
pub const ACCESS_TOKEN_HEADER: &str = "accessToken";

/// Header names whose values never appear in debug output.
const SENSITIVE_HEADERS: &[&str] = &["authorization", "accesstoken", "x-api-key", "cookie"];

/// A remote MCP server known to the platform.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server label.
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Names of the tools discovered on this server.
    #[serde(default)]
    pub tools: Vec<String>,
}

impl ServerInfo {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            tools: Vec::new(),
        }
    }

    /// A server with no network address.
    pub fn unaddressed(id: impl Into<String>) -> Self {
        Self::new(id, UNADDRESSED_SERVER_URL)
    }

    #[must_use]
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    /// `<label>_<url>`: cache and connection key. A different URL under the
    /// same label is a different server.
    pub fn server_identifier(&self) -> String {
        format!("{}_{}", self.id, self.url)
    }

    /// `<label>_<tool>`.
    pub fn qualified_tool_name(&self, tool: &str) -> String {
        format!("{}_{tool}", self.id)
    }

    /// Inverse of [`Self::qualified_tool_name`]; names without this server's
    /// prefix are returned unchanged.
    pub fn unqualified_tool_name<'a>(&self, name: &'a str) -> &'a str {
        name.strip_prefix(&self.id)
            .and_then(|rest| rest.strip_prefix('_'))
            .unwrap_or(name)
    }
}

impl fmt::Debug for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerInfo")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("headers", &RedactedHeaders(&self.headers))
            .field("tools", &self.tools)
            .finish()
    }
}

struct RedactedHeaders<'a>(&'a BTreeMap<String, String>);

impl fmt::Debug for RedactedHeaders<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(name, value)| {
                let shown = if SENSITIVE_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                    "<redacted>"
                } else {
                    value.as_str()
                };
                (name, shown)
            }))
            .finish()
    }
}

/// A caller's description of a remote MCP server to use.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerRequest {
    pub server_label: String,
    pub server_url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

impl McpServerRequest {
    pub fn new(server_label: impl Into<String>, server_url: impl Into<String>) -> Self {
        Self {
            server_label: server_label.into(),
            server_url: server_url.into(),
            headers: BTreeMap::new(),
            allowed_tools: Vec::new(),
        }
    }

    pub fn to_server_info(&self) -> ServerInfo {
        ServerInfo::new(&self.server_label, &self.server_url).with_headers(self.headers.clone())
    }

    /// Copy of this request authenticating with `Authorization: Bearer <token>`.
    #[must_use]
    pub fn with_bearer_token(&self, token: &str) -> Self {
        let mut request = self.clone();
        request.headers = BTreeMap::from([(
            AUTHORIZATION_HEADER.to_string(),
            format!("Bearer {token}"),
        )]);
        request
    }

    /// Copy of this request whose only header is the issued access token.
    #[must_use]
    pub fn with_access_token(&self, token: &str) -> Self {
        let mut request = self.clone();
        request.headers = BTreeMap::from([(ACCESS_TOKEN_HEADER.to_string(), token.to_string())]);
        request
    }
}

impl fmt::Debug for McpServerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpServerRequest")
            .field("server_label", &self.server_label)
            .field("server_url", &self.server_url)
            .field("headers", &RedactedHeaders(&self.headers))
            .field("allowed_tools", &self.allowed_tools)
            .finish()
    }
}

/// Launch configuration for a platform-hosted MCP server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Streamable-HTTP endpoint, used instead of `command` when set.
    #[serde(default)]
    pub url: Option<String>,
}

/// `{"mcpServers": {"<name>": {...}}}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServersConfig {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
}

/// A tool as listed by an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Option<Value>,
}

/// Result of `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl CallToolResult {
    /// Concatenate the text items of the content array.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
