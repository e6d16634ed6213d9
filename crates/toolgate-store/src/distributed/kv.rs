//! Key-value port for the distributed backend and an in-memory implementation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use toolgate_core::StorageError;

/// Minimal string key-value store with per-key TTL.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration)
    -> Result<(), StorageError>;

    /// Reset the TTL of an existing key. Returns false if the key is gone.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StorageError>;

    /// Atomically read and delete.
    async fn get_del(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process [`KeyValueStore`] with Redis-like expiry semantics.
///
/// Expiry is measured on the tokio clock, so paused-time tests can advance
/// past a TTL without sleeping.
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>, StorageError> {
        self.entries
            .lock()
            .map_err(|_| StorageError::Backend("in-memory store lock poisoned".to_string()))
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .map(|entries| entries.values().filter(|(_, deadline)| *deadline > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let live = entries
            .get(key)
            .map(|(value, deadline)| (*deadline > now).then(|| value.clone()));
        match live {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        let deadline = Instant::now() + ttl;
        self.lock()?.insert(key.to_string(), (value, deadline));
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StorageError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let Some((_, deadline)) = entries.get_mut(key) else {
            return Ok(false);
        };
        if *deadline > now {
            *deadline = now + ttl;
            return Ok(true);
        }
        entries.remove(key);
        Ok(false)
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>, StorageError> {
        let now = Instant::now();
        Ok(self
            .lock()?
            .remove(key)
            .filter(|(_, deadline)| *deadline > now)
            .map(|(value, _)| value))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_value_expires_after_ttl() {
        let store = InMemoryKeyValueStore::new();
        store.set_with_ttl("k", "v".into(), Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_extends_live_keys_only() {
        let store = InMemoryKeyValueStore::new();
        store.set_with_ttl("k", "v".into(), Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(store.expire("k", Duration::from_secs(10)).await.unwrap());
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(store.get("k").await.unwrap().is_some());

        assert!(!store.expire("missing", Duration::from_secs(10)).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_del_returns_once() {
        let store = InMemoryKeyValueStore::new();
        store.set_with_ttl("k", "v".into(), Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.get_del("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.get_del("k").await.unwrap().is_none());
    }
}
