//! Tool dispatch for toolgate.
//!
//! [`ToolService`] resolves tool names across the native registry, the MCP
//! registry and the pluggable [`AdapterChain`], and executes them. Client-side
//! tools are registered per tenant in the [`PluggedToolsRegistry`] and run by
//! the caller's worker through a [`WorkflowToolExecutor`].

mod chain;
mod client_side;
mod native;
mod plugged;
mod service;
mod workflow;

pub use chain::{AdapterChain, ClaimedTool, NoOpAdapter};
pub use client_side::{
    ClientSideToolAdapter, DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_WAIT_TIME_MS,
    derive_client_side_tool,
};
pub use native::{NativeToolRegistry, ThinkTool};
pub use plugged::PluggedToolsRegistry;
pub use service::{ToolOutput, ToolService};
pub use workflow::{WorkflowToolExecutor, workflow_id};
