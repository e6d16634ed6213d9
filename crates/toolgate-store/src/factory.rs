//! Composition utilities for building the storage set from settings.
//!
//! Construction only; no registry logic lives here.

use std::sync::Arc;

use toolgate_core::{
    AuthFlowRepository, AuthTokenRepository, Keyspace, ServerInfoStorage, Settings, StorageError,
    StoreBackend, ToolRegistryStorage,
};

use crate::distributed::{
    DistributedFlowRepository, DistributedServerStorage, DistributedTokenRepository,
    DistributedToolStorage, KeyValueStore, RedisKeyValueStore,
};
use crate::local::{LocalFlowRepository, LocalServerStorage, LocalTokenRepository, LocalToolStorage};

/// The four stores, as trait objects.
#[derive(Clone)]
pub struct Stores {
    pub tools: Arc<dyn ToolRegistryStorage>,
    pub servers: Arc<dyn ServerInfoStorage>,
    pub tokens: Arc<dyn AuthTokenRepository>,
    pub flows: Arc<dyn AuthFlowRepository>,
}

/// Factory for the storage backends.
pub struct StoreFactory;

impl StoreFactory {
    /// Build the stores selected by `settings.store`, connecting to Redis
    /// when required.
    pub async fn build(settings: &Settings) -> Result<Stores, StorageError> {
        match settings.store {
            StoreBackend::InMemory => Ok(Self::local(settings)),
            StoreBackend::Redis => {
                let url = settings.redis_url.as_deref().ok_or_else(|| {
                    StorageError::Backend("TOOLGATE_REDIS_URL is not set".to_string())
                })?;
                let kv = RedisKeyValueStore::connect(url).await?;
                Ok(Self::distributed(Arc::new(kv), settings))
            }
        }
    }

    /// Process-local stores.
    pub fn local(settings: &Settings) -> Stores {
        let keyspace = keyspace(settings);
        let max = settings.local_cache_max_entries;
        tracing::debug!(max_entries = max, "Using local stores");
        Stores {
            tools: Arc::new(LocalToolStorage::new(keyspace.clone(), max, settings.tool_ttl())),
            servers: Arc::new(LocalServerStorage::new(
                keyspace.clone(),
                max,
                settings.server_ttl(),
            )),
            tokens: Arc::new(LocalTokenRepository::new(keyspace.clone(), max)),
            flows: Arc::new(LocalFlowRepository::new(keyspace, max)),
        }
    }

    /// Stores on top of any shared key-value store.
    pub fn distributed(kv: Arc<dyn KeyValueStore>, settings: &Settings) -> Stores {
        let keyspace = keyspace(settings);
        Stores {
            tools: Arc::new(DistributedToolStorage::new(
                Arc::clone(&kv),
                keyspace.clone(),
                settings.tool_ttl(),
            )),
            servers: Arc::new(DistributedServerStorage::new(
                Arc::clone(&kv),
                keyspace.clone(),
                settings.server_ttl(),
            )),
            tokens: Arc::new(DistributedTokenRepository::new(
                Arc::clone(&kv),
                keyspace.clone(),
            )),
            flows: Arc::new(DistributedFlowRepository::new(kv, keyspace)),
        }
    }
}

fn keyspace(settings: &Settings) -> Keyspace {
    Keyspace::new(&settings.env, &settings.app_name)
}
