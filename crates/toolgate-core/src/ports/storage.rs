//! Storage ports for tool, server, token and flow-state records.

use async_trait::async_trait;

use super::StorageError;
use crate::context::RequestContext;
use crate::domain::{AuthFlowMetaInfo, ServerInfo, TokenSet, ToolDefinition, ToolKind};

/// Tool definitions keyed by (tenant, kind, name).
#[async_trait]
pub trait ToolRegistryStorage: Send + Sync {
    /// Upsert `tool` under its name and kind.
    async fn add(&self, ctx: &RequestContext, tool: ToolDefinition) -> Result<(), StorageError>;

    /// Lookup by name. Records of a different kind never match.
    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        kind: ToolKind,
    ) -> Result<Option<ToolDefinition>, StorageError>;

    async fn remove(
        &self,
        ctx: &RequestContext,
        name: &str,
        kind: ToolKind,
    ) -> Result<(), StorageError>;
}

/// Server records keyed by (tenant, server identifier).
#[async_trait]
pub trait ServerInfoStorage: Send + Sync {
    async fn add(&self, ctx: &RequestContext, server: ServerInfo) -> Result<(), StorageError>;

    async fn get(
        &self,
        ctx: &RequestContext,
        server_identifier: &str,
    ) -> Result<Option<ServerInfo>, StorageError>;

    async fn remove(&self, ctx: &RequestContext, server_identifier: &str)
    -> Result<(), StorageError>;
}

/// OAuth token sets keyed by (tenant, server identifier).
///
/// Reads never extend a token record's lifetime.
#[async_trait]
pub trait AuthTokenRepository: Send + Sync {
    async fn put(
        &self,
        ctx: &RequestContext,
        server_identifier: &str,
        tokens: TokenSet,
    ) -> Result<(), StorageError>;

    async fn get(
        &self,
        ctx: &RequestContext,
        server_identifier: &str,
    ) -> Result<Option<TokenSet>, StorageError>;
}

/// Short-lived OAuth flow state keyed by the `state` parameter.
#[async_trait]
pub trait AuthFlowRepository: Send + Sync {
    async fn save(&self, state: &str, flow: AuthFlowMetaInfo) -> Result<(), StorageError>;

    /// Atomically fetch and delete. Of two concurrent calls for the same
    /// state, at most one observes the record.
    async fn consume(&self, state: &str) -> Result<Option<AuthFlowMetaInfo>, StorageError>;
}
