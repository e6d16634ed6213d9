//! Core domain types and port definitions for toolgate.
//!
//! This crate holds everything the tool registry and execution subsystem
//! agrees on: tool and server records, OAuth token and flow state, the
//! explicit per-request [`RequestContext`], the cache [`Keyspace`], and the
//! port traits that storage, transport and workflow adapters implement.
//! It has no infrastructure dependencies.

pub mod context;
pub mod domain;
pub mod keyspace;
pub mod ports;
pub mod settings;

pub use context::RequestContext;
pub use domain::{
    ACCESS_TOKEN_HEADER, AUTHORIZATION_HEADER, AuthFlowMetaInfo, AuthServerMetadata,
    CallToolResult, ClientSideExecution, FunctionTool, McpServerConfig, McpServerRequest,
    McpServersConfig, McpToolDefinition, McpToolDescriptor, NativeToolDefinition,
    PluggableToolDefinition, ProtectedResourceMetadata, ServerInfo, ServerRef, TokenServerMeta,
    TokenSet, ToolDefinition, ToolHosting, ToolKind, ToolProgressEventMeta,
    UNADDRESSED_SERVER_URL,
};
pub use keyspace::{KeyCategory, Keyspace};
pub use ports::{
    AuthFlowRepository, AuthTokenRepository, ErrorKind, McpClient, McpClientFactory, McpError,
    NativeTool, PluggableToolAdapter, PluggedToolRequest, ServerInfoStorage, StorageError,
    ToolError, ToolRegistryStorage, WorkQueue, WorkResult, WorkUnit, WorkflowEngine,
    WorkflowError,
};
pub use settings::{
    DEFAULT_APP_NAME, DEFAULT_ENV, Settings, SettingsError, StoreBackend, WorkflowBackend,
};
