//! Domain model: tool definitions, MCP server records and OAuth state.

mod auth;
mod function;
mod server;
mod tool;

pub use auth::{
    AuthFlowMetaInfo, AuthServerMetadata, ProtectedResourceMetadata, TokenServerMeta, TokenSet,
};
pub use function::FunctionTool;
pub use server::{
    ACCESS_TOKEN_HEADER, AUTHORIZATION_HEADER, CallToolResult, McpServerConfig, McpServerRequest,
    McpServersConfig, McpToolDescriptor, ServerInfo, UNADDRESSED_SERVER_URL,
};
pub use tool::{
    ClientSideExecution, McpToolDefinition, NativeToolDefinition, PluggableToolDefinition,
    ServerRef, ToolDefinition, ToolHosting, ToolKind, ToolProgressEventMeta,
};
