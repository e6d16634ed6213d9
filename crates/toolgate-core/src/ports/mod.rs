//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define interfaces that the core expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No `reqwest`, `redis`, `moka` or process types in any signature
//! - Traits are minimal and CRUD-focused where they front storage
//! - Every call takes an explicit [`RequestContext`](crate::RequestContext)
//!   when its result depends on the tenant

mod error;
mod mcp;
mod native;
mod pluggable;
mod storage;
mod workflow;

pub use error::{ErrorKind, McpError, StorageError, ToolError};
pub use mcp::{McpClient, McpClientFactory};
pub use native::NativeTool;
pub use pluggable::{PluggableToolAdapter, PluggedToolRequest};
pub use storage::{AuthFlowRepository, AuthTokenRepository, ServerInfoStorage, ToolRegistryStorage};
pub use workflow::{WorkQueue, WorkResult, WorkUnit, WorkflowEngine, WorkflowError};
