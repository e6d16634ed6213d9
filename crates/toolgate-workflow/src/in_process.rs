//! Workflow engine living inside one process.
//!
//! Submitters and workers share the same instance; used for single-node
//! deployments and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, oneshot};
use toolgate_core::{WorkQueue, WorkResult, WorkUnit, WorkflowEngine, WorkflowError};

#[derive(Default)]
pub struct InProcessWorkflowEngine {
    queues: Mutex<HashMap<String, VecDeque<WorkUnit>>>,
    pending: Mutex<HashMap<String, oneshot::Sender<WorkResult>>>,
    available: Notify,
}

fn poisoned<T>(_: T) -> WorkflowError {
    WorkflowError::Backend("workflow state lock poisoned".to_string())
}

impl InProcessWorkflowEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Units waiting on `task_queue`.
    pub fn queued(&self, task_queue: &str) -> usize {
        self.queues
            .lock()
            .map(|queues| queues.get(task_queue).map_or(0, VecDeque::len))
            .unwrap_or(0)
    }

    fn pop(&self, task_queue: &str) -> Result<Option<WorkUnit>, WorkflowError> {
        let mut queues = self.queues.lock().map_err(poisoned)?;
        Ok(queues.get_mut(task_queue).and_then(VecDeque::pop_front))
    }

    /// Drop a unit no worker has taken yet. Returns whether it was queued.
    fn withdraw(&self, task_queue: &str, correlation_id: &str) -> Result<bool, WorkflowError> {
        let mut queues = self.queues.lock().map_err(poisoned)?;
        let Some(units) = queues.get_mut(task_queue) else {
            return Ok(false);
        };
        let before = units.len();
        units.retain(|unit| unit.correlation_id != correlation_id);
        let withdrawn = units.len() < before;
        if units.is_empty() {
            queues.remove(task_queue);
        }
        Ok(withdrawn)
    }
}

#[async_trait]
impl WorkflowEngine for InProcessWorkflowEngine {
    async fn submit_and_wait(
        &self,
        unit: WorkUnit,
        timeout: Duration,
    ) -> Result<String, WorkflowError> {
        let unit = unit.with_deadline(timeout);
        let correlation_id = unit.correlation_id.clone();
        let task_queue = unit.task_queue.clone();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(poisoned)?
            .insert(correlation_id.clone(), tx);
        self.queues
            .lock()
            .map_err(poisoned)?
            .entry(task_queue.clone())
            .or_default()
            .push_back(unit);
        self.available.notify_waiters();

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(WorkResult::Completed(value))) => Ok(value),
            Ok(Ok(WorkResult::Failed(reason))) => Err(WorkflowError::Failed(reason)),
            Ok(Err(_)) => Err(WorkflowError::Backend(format!(
                "result channel for {correlation_id} closed"
            ))),
            Err(_) => {
                self.pending.lock().map_err(poisoned)?.remove(&correlation_id);
                let withdrawn = self.withdraw(&task_queue, &correlation_id)?;
                tracing::debug!(workflow = %correlation_id, withdrawn, "No result in time");
                Err(WorkflowError::Timeout(timeout))
            }
        }
    }
}

#[async_trait]
impl WorkQueue for InProcessWorkflowEngine {
    async fn next(
        &self,
        task_queue: &str,
        poll: Duration,
    ) -> Result<Option<WorkUnit>, WorkflowError> {
        let deadline = tokio::time::Instant::now() + poll;
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(unit) = self.pop(task_queue)? {
                return Ok(Some(unit));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn complete(&self, correlation_id: &str, result: WorkResult) -> Result<(), WorkflowError> {
        let sender = self.pending.lock().map_err(poisoned)?.remove(correlation_id);
        match sender {
            Some(sender) => {
                if sender.send(result).is_err() {
                    tracing::debug!(workflow = correlation_id, "Submitter stopped waiting");
                }
            }
            None => tracing::debug!(workflow = correlation_id, "No submitter waiting for result"),
        }
        Ok(())
    }
}
