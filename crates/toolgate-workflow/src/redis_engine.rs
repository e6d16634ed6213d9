//! Workflow engine on Redis lists.
//!
//! Units are pushed to `<prefix>:workflow:queue:<task queue>` and results to
//! `<prefix>:workflow:result:<correlation id>`. Submitters and workers may
//! live in different processes. A unit whose submitter times out is removed
//! from its queue if no worker has popped it yet.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use toolgate_core::{Keyspace, WorkQueue, WorkResult, WorkUnit, WorkflowEngine, WorkflowError};

/// Results nobody collects are dropped after this long.
const RESULT_TTL_SECS: u64 = 300;

/// Blocking connections kept around between pops.
const MAX_IDLE_BLOCKING: usize = 16;

fn backend(error: redis::RedisError) -> WorkflowError {
    WorkflowError::Backend(error.to_string())
}

/// BRPOP takes whole seconds, and zero means "block forever".
fn block_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs();
    if wait.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
}

pub fn queue_key(prefix: &str, task_queue: &str) -> String {
    format!("{prefix}:workflow:queue:{task_queue}")
}

pub fn result_key(prefix: &str, correlation_id: &str) -> String {
    format!("{prefix}:workflow:result:{correlation_id}")
}

/// Connections parked between uses. A connection is held by one caller at
/// a time, so a blocking pop never queues behind another.
struct IdlePool<C> {
    idle: Mutex<Vec<C>>,
    max_idle: usize,
}

impl<C> IdlePool<C> {
    const fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    fn take(&self) -> Option<C> {
        self.idle.lock().ok().and_then(|mut idle| idle.pop())
    }

    fn put(&self, connection: C) {
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < self.max_idle {
                idle.push(connection);
            }
        }
    }
}

#[derive(Clone)]
pub struct RedisWorkflowEngine {
    client: redis::Client,
    connection: ConnectionManager,
    blocking: Arc<IdlePool<MultiplexedConnection>>,
    prefix: String,
}

impl RedisWorkflowEngine {
    pub async fn connect(url: &str, keyspace: &Keyspace) -> Result<Self, WorkflowError> {
        let client = redis::Client::open(url).map_err(backend)?;
        let connection = ConnectionManager::new(client.clone()).await.map_err(backend)?;
        tracing::info!(prefix = %keyspace.prefix(), "Connected to Redis workflow backend");
        Ok(Self {
            client,
            connection,
            blocking: Arc::new(IdlePool::new(MAX_IDLE_BLOCKING)),
            prefix: keyspace.prefix(),
        })
    }

    /// Blocking pops run on dedicated connections so they never stall the
    /// shared one. Connections are reused across pops.
    async fn blocking_connection(&self) -> Result<MultiplexedConnection, WorkflowError> {
        if let Some(connection) = self.blocking.take() {
            return Ok(connection);
        }
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)
    }

    async fn blocking_pop(&self, key: &str, wait: Duration) -> Result<Option<String>, WorkflowError> {
        let mut conn = self.blocking_connection().await?;
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(key)
            .arg(block_secs(wait))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        // a failed pop drops its connection
        self.blocking.put(conn);
        Ok(popped.map(|(_, value)| value))
    }

    /// Remove a unit still waiting on its queue. Returns whether it was there.
    async fn withdraw(&self, task_queue: &str, payload: &str) -> Result<bool, WorkflowError> {
        let mut conn = self.connection.clone();
        let removed: i64 = redis::cmd("LREM")
            .arg(queue_key(&self.prefix, task_queue))
            .arg(1)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(removed > 0)
    }
}

#[async_trait]
impl WorkflowEngine for RedisWorkflowEngine {
    async fn submit_and_wait(
        &self,
        unit: WorkUnit,
        timeout: Duration,
    ) -> Result<String, WorkflowError> {
        let unit = unit.with_deadline(timeout);
        let payload = serde_json::to_string(&unit)?;
        let mut conn = self.connection.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(queue_key(&self.prefix, &unit.task_queue))
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        tracing::debug!(
            workflow = %unit.correlation_id,
            task_queue = %unit.task_queue,
            "Submitted work unit"
        );

        let key = result_key(&self.prefix, &unit.correlation_id);
        match self.blocking_pop(&key, timeout).await? {
            Some(raw) => match serde_json::from_str::<WorkResult>(&raw)? {
                WorkResult::Completed(value) => Ok(value),
                WorkResult::Failed(reason) => Err(WorkflowError::Failed(reason)),
            },
            None => {
                let withdrawn = self.withdraw(&unit.task_queue, &payload).await?;
                tracing::debug!(workflow = %unit.correlation_id, withdrawn, "No result in time");
                Err(WorkflowError::Timeout(timeout))
            }
        }
    }
}

#[async_trait]
impl WorkQueue for RedisWorkflowEngine {
    async fn next(
        &self,
        task_queue: &str,
        poll: Duration,
    ) -> Result<Option<WorkUnit>, WorkflowError> {
        let key = queue_key(&self.prefix, task_queue);
        match self.blocking_pop(&key, poll).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn complete(&self, correlation_id: &str, result: WorkResult) -> Result<(), WorkflowError> {
        let key = result_key(&self.prefix, correlation_id);
        let payload = serde_json::to_string(&result)?;
        let mut conn = self.connection.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("LPUSH")
            .arg(&key)
            .arg(payload)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(RESULT_TTL_SECS)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
