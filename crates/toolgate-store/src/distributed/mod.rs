//! Distributed storage: JSON records in a shared [`KeyValueStore`].
//!
//! TTL policy per record type:
//!
//! | Record | TTL | On read |
//! |---|---|---|
//! | tool | configured window | TTL reset (sliding) |
//! | server | configured window | TTL reset (sliding) |
//! | token | fixed [`TOKEN_TTL`] | unchanged |
//! | flow state | fixed [`FLOW_STATE_TTL`] | deleted |

mod kv;
mod redis_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use toolgate_core::{
    AuthFlowMetaInfo, AuthFlowRepository, AuthTokenRepository, Keyspace, RequestContext,
    ServerInfo, ServerInfoStorage, StorageError, TokenSet, ToolDefinition, ToolKind,
    ToolRegistryStorage,
};

pub use kv::{InMemoryKeyValueStore, KeyValueStore};
pub use redis_store::RedisKeyValueStore;

/// Storage lifetime of token records, independent of the token's own expiry.
pub const TOKEN_TTL: Duration = Duration::from_secs(600 * 60);

/// Lifetime of an unconsumed OAuth flow state.
pub const FLOW_STATE_TTL: Duration = Duration::from_secs(5 * 60);

async fn put_json<T: Serialize + Sync>(
    kv: &dyn KeyValueStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), StorageError> {
    kv.set_with_ttl(key, serde_json::to_string(value)?, ttl).await
}

fn decode<T: DeserializeOwned>(raw: Option<String>) -> Result<Option<T>, StorageError> {
    raw.map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(StorageError::from)
}

/// Read a record and, if present, restart its TTL window.
async fn get_sliding(
    kv: &dyn KeyValueStore,
    key: &str,
    ttl: Duration,
) -> Result<Option<String>, StorageError> {
    let raw = kv.get(key).await?;
    if raw.is_some() {
        kv.expire(key, ttl).await?;
    }
    Ok(raw)
}

/// Tool definitions in the shared store, with sliding expiration.
pub struct DistributedToolStorage {
    kv: Arc<dyn KeyValueStore>,
    keyspace: Keyspace,
    ttl: Duration,
}

impl DistributedToolStorage {
    pub fn new(kv: Arc<dyn KeyValueStore>, keyspace: Keyspace, ttl: Duration) -> Self {
        Self { kv, keyspace, ttl }
    }
}

#[async_trait]
impl ToolRegistryStorage for DistributedToolStorage {
    async fn add(&self, ctx: &RequestContext, tool: ToolDefinition) -> Result<(), StorageError> {
        let key = self.keyspace.tool_key(ctx, tool.kind(), tool.name());
        put_json(self.kv.as_ref(), &key, &tool, self.ttl).await
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        kind: ToolKind,
    ) -> Result<Option<ToolDefinition>, StorageError> {
        let key = self.keyspace.tool_key(ctx, kind, name);
        let tool: Option<ToolDefinition> =
            decode(get_sliding(self.kv.as_ref(), &key, self.ttl).await?)?;
        Ok(tool.filter(|t| t.kind() == kind))
    }

    async fn remove(
        &self,
        ctx: &RequestContext,
        name: &str,
        kind: ToolKind,
    ) -> Result<(), StorageError> {
        self.kv.delete(&self.keyspace.tool_key(ctx, kind, name)).await
    }
}

/// Server records in the shared store, with sliding expiration.
pub struct DistributedServerStorage {
    kv: Arc<dyn KeyValueStore>,
    keyspace: Keyspace,
    ttl: Duration,
}

impl DistributedServerStorage {
    pub fn new(kv: Arc<dyn KeyValueStore>, keyspace: Keyspace, ttl: Duration) -> Self {
        Self { kv, keyspace, ttl }
    }
}

#[async_trait]
impl ServerInfoStorage for DistributedServerStorage {
    async fn add(&self, ctx: &RequestContext, server: ServerInfo) -> Result<(), StorageError> {
        let key = self.keyspace.server_key(ctx, &server.server_identifier());
        put_json(self.kv.as_ref(), &key, &server, self.ttl).await
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        server_identifier: &str,
    ) -> Result<Option<ServerInfo>, StorageError> {
        let key = self.keyspace.server_key(ctx, server_identifier);
        decode(get_sliding(self.kv.as_ref(), &key, self.ttl).await?)
    }

    async fn remove(
        &self,
        ctx: &RequestContext,
        server_identifier: &str,
    ) -> Result<(), StorageError> {
        self.kv
            .delete(&self.keyspace.server_key(ctx, server_identifier))
            .await
    }
}

/// Token sets in the shared store. Reads never extend their lifetime.
pub struct DistributedTokenRepository {
    kv: Arc<dyn KeyValueStore>,
    keyspace: Keyspace,
}

impl DistributedTokenRepository {
    pub fn new(kv: Arc<dyn KeyValueStore>, keyspace: Keyspace) -> Self {
        Self { kv, keyspace }
    }
}

#[async_trait]
impl AuthTokenRepository for DistributedTokenRepository {
    async fn put(
        &self,
        ctx: &RequestContext,
        server_identifier: &str,
        tokens: TokenSet,
    ) -> Result<(), StorageError> {
        let key = self.keyspace.token_key(ctx, server_identifier);
        put_json(self.kv.as_ref(), &key, &tokens, TOKEN_TTL).await
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        server_identifier: &str,
    ) -> Result<Option<TokenSet>, StorageError> {
        decode(
            self.kv
                .get(&self.keyspace.token_key(ctx, server_identifier))
                .await?,
        )
    }
}

/// OAuth flow state in the shared store, deleted on first read.
pub struct DistributedFlowRepository {
    kv: Arc<dyn KeyValueStore>,
    keyspace: Keyspace,
}

impl DistributedFlowRepository {
    pub fn new(kv: Arc<dyn KeyValueStore>, keyspace: Keyspace) -> Self {
        Self { kv, keyspace }
    }
}

#[async_trait]
impl AuthFlowRepository for DistributedFlowRepository {
    async fn save(&self, state: &str, flow: AuthFlowMetaInfo) -> Result<(), StorageError> {
        let key = self.keyspace.flow_key(state);
        put_json(self.kv.as_ref(), &key, &flow, FLOW_STATE_TTL).await
    }

    async fn consume(&self, state: &str) -> Result<Option<AuthFlowMetaInfo>, StorageError> {
        decode(self.kv.get_del(&self.keyspace.flow_key(state)).await?)
    }
}
