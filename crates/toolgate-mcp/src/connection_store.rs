//! Bounded store of live MCP clients keyed by server identifier.
//!
//! Clients evicted for size or idleness are closed in the background.
//! Explicitly removed clients are the caller's to close.

use std::sync::Arc;
use std::time::Duration;

use moka::notification::RemovalCause;
use moka::sync::Cache;
use toolgate_core::McpClient;

pub struct ConnectionStore {
    cache: Cache<String, Arc<dyn McpClient>>,
}

impl ConnectionStore {
    pub fn new(capacity: u64, idle: Duration) -> Self {
        let runtime = tokio::runtime::Handle::try_current().ok();
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_idle(idle)
            .eviction_listener(
                move |key: Arc<String>, client: Arc<dyn McpClient>, cause: RemovalCause| {
                    if !(cause.was_evicted() || cause == RemovalCause::Replaced) {
                        return;
                    }
                    let Some(runtime) = runtime.as_ref() else {
                        return;
                    };
                    tracing::debug!(server = %key, ?cause, "Closing evicted MCP client");
                    runtime.spawn(async move {
                        if let Err(e) = client.close().await {
                            tracing::warn!(server = %key, error = %e, "Failed to close evicted MCP client");
                        }
                    });
                },
            )
            .build();
        Self { cache }
    }

    pub fn get(&self, server_identifier: &str) -> Option<Arc<dyn McpClient>> {
        self.cache.get(server_identifier)
    }

    pub fn insert(&self, server_identifier: String, client: Arc<dyn McpClient>) {
        self.cache.insert(server_identifier, client);
    }

    pub fn remove(&self, server_identifier: &str) -> Option<Arc<dyn McpClient>> {
        self.cache.remove(server_identifier)
    }

    /// Remove and return every live client.
    pub fn drain(&self) -> Vec<(String, Arc<dyn McpClient>)> {
        let keys: Vec<String> = self.cache.iter().map(|(key, _)| key.as_ref().clone()).collect();
        keys.into_iter()
            .filter_map(|key| self.cache.remove(&key).map(|client| (key, client)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use toolgate_core::{CallToolResult, McpError, McpToolDescriptor};

    #[derive(Default)]
    struct CountingClient {
        closes: AtomicUsize,
    }

    #[async_trait]
    impl McpClient for CountingClient {
        async fn list_tools(&self) -> Result<Vec<McpToolDescriptor>, McpError> {
            Ok(Vec::new())
        }

        async fn call_tool(
            &self,
            _name: &str,
            _arguments: Value,
            _headers: &BTreeMap<String, String>,
        ) -> Result<CallToolResult, McpError> {
            Err(McpError::Transport("unused".into()))
        }

        async fn close(&self) -> Result<(), McpError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let store = ConnectionStore::new(10, Duration::from_secs(60));
        let client: Arc<dyn McpClient> = Arc::new(CountingClient::default());
        store.insert("a_https://x".to_string(), Arc::clone(&client));

        assert!(store.get("a_https://x").is_some());
        assert!(store.remove("a_https://x").is_some());
        assert!(store.get("a_https://x").is_none());
    }

    #[tokio::test]
    async fn test_replaced_client_is_closed() {
        let store = ConnectionStore::new(10, Duration::from_secs(60));
        let first = Arc::new(CountingClient::default());
        store.insert("k".to_string(), Arc::clone(&first) as Arc<dyn McpClient>);
        store.insert("k".to_string(), Arc::new(CountingClient::default()));
        store.cache.run_pending_tasks();

        for _ in 0..50 {
            if first.closes.load(Ordering::SeqCst) == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("replaced client was not closed");
    }

    #[tokio::test]
    async fn test_drain_empties_store() {
        let store = ConnectionStore::new(10, Duration::from_secs(60));
        store.insert("a".to_string(), Arc::new(CountingClient::default()));
        store.insert("b".to_string(), Arc::new(CountingClient::default()));

        let drained = store.drain();
        assert_eq!(drained.len(), 2);
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_none());
    }
}
