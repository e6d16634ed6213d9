//! Process-local storage backed by bounded moka caches.
//!
//! Keys use the same layout as the distributed backend so records are
//! tenant-isolated identically in both.

use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use toolgate_core::{
    AuthFlowMetaInfo, AuthFlowRepository, AuthTokenRepository, Keyspace, RequestContext,
    ServerInfo, ServerInfoStorage, StorageError, TokenSet, ToolDefinition, ToolKind,
    ToolRegistryStorage,
};

use crate::distributed::{FLOW_STATE_TTL, TOKEN_TTL};

fn bounded<V>(max_entries: u64, ttl: Duration) -> Cache<String, V>
where
    V: Clone + Send + Sync + 'static,
{
    Cache::builder()
        .max_capacity(max_entries)
        .time_to_live(ttl)
        .build()
}

/// Tool definitions in a local cache.
pub struct LocalToolStorage {
    keyspace: Keyspace,
    cache: Cache<String, ToolDefinition>,
}

impl LocalToolStorage {
    pub fn new(keyspace: Keyspace, max_entries: u64, ttl: Duration) -> Self {
        Self {
            keyspace,
            cache: bounded(max_entries, ttl),
        }
    }
}

#[async_trait]
impl ToolRegistryStorage for LocalToolStorage {
    async fn add(&self, ctx: &RequestContext, tool: ToolDefinition) -> Result<(), StorageError> {
        let key = self.keyspace.tool_key(ctx, tool.kind(), tool.name());
        self.cache.insert(key, tool);
        Ok(())
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        kind: ToolKind,
    ) -> Result<Option<ToolDefinition>, StorageError> {
        let key = self.keyspace.tool_key(ctx, kind, name);
        Ok(self.cache.get(&key).filter(|tool| tool.kind() == kind))
    }

    async fn remove(
        &self,
        ctx: &RequestContext,
        name: &str,
        kind: ToolKind,
    ) -> Result<(), StorageError> {
        self.cache.invalidate(&self.keyspace.tool_key(ctx, kind, name));
        Ok(())
    }
}

/// Server records in a local cache.
pub struct LocalServerStorage {
    keyspace: Keyspace,
    cache: Cache<String, ServerInfo>,
}

impl LocalServerStorage {
    pub fn new(keyspace: Keyspace, max_entries: u64, ttl: Duration) -> Self {
        Self {
            keyspace,
            cache: bounded(max_entries, ttl),
        }
    }
}

#[async_trait]
impl ServerInfoStorage for LocalServerStorage {
    async fn add(&self, ctx: &RequestContext, server: ServerInfo) -> Result<(), StorageError> {
        let key = self.keyspace.server_key(ctx, &server.server_identifier());
        self.cache.insert(key, server);
        Ok(())
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        server_identifier: &str,
    ) -> Result<Option<ServerInfo>, StorageError> {
        Ok(self.cache.get(&self.keyspace.server_key(ctx, server_identifier)))
    }

    async fn remove(
        &self,
        ctx: &RequestContext,
        server_identifier: &str,
    ) -> Result<(), StorageError> {
        self.cache
            .invalidate(&self.keyspace.server_key(ctx, server_identifier));
        Ok(())
    }
}

/// Token sets in a local cache with the same fixed lifetime as the
/// distributed backend.
pub struct LocalTokenRepository {
    keyspace: Keyspace,
    cache: Cache<String, TokenSet>,
}

impl LocalTokenRepository {
    pub fn new(keyspace: Keyspace, max_entries: u64) -> Self {
        Self {
            keyspace,
            cache: bounded(max_entries, TOKEN_TTL),
        }
    }
}

#[async_trait]
impl AuthTokenRepository for LocalTokenRepository {
    async fn put(
        &self,
        ctx: &RequestContext,
        server_identifier: &str,
        tokens: TokenSet,
    ) -> Result<(), StorageError> {
        self.cache
            .insert(self.keyspace.token_key(ctx, server_identifier), tokens);
        Ok(())
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        server_identifier: &str,
    ) -> Result<Option<TokenSet>, StorageError> {
        Ok(self.cache.get(&self.keyspace.token_key(ctx, server_identifier)))
    }
}

/// Flow state in a local cache. `consume` uses the cache's atomic remove.
pub struct LocalFlowRepository {
    keyspace: Keyspace,
    cache: Cache<String, AuthFlowMetaInfo>,
}

impl LocalFlowRepository {
    pub fn new(keyspace: Keyspace, max_entries: u64) -> Self {
        Self {
            keyspace,
            cache: bounded(max_entries, FLOW_STATE_TTL),
        }
    }
}

#[async_trait]
impl AuthFlowRepository for LocalFlowRepository {
    async fn save(&self, state: &str, flow: AuthFlowMetaInfo) -> Result<(), StorageError> {
        self.cache.insert(self.keyspace.flow_key(state), flow);
        Ok(())
    }

    async fn consume(&self, state: &str) -> Result<Option<AuthFlowMetaInfo>, StorageError> {
        Ok(self.cache.remove(&self.keyspace.flow_key(state)))
    }
}
