//! Workflow-engine ports.
//!
//! The platform submits units of work and waits for their result; a
//! separate worker process polls the queue and runs caller-supplied logic.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{PluggedToolRequest, ToolError};

/// One unit of work on a task queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnit {
    /// Workflow id, also the correlation id for the result.
    pub correlation_id: String,
    pub task_queue: String,
    pub request: PluggedToolRequest,
    /// Per-attempt start-to-close budget.
    pub start_to_close_ms: u64,
    pub max_attempts: u32,
    /// Nobody waits for the result after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl WorkUnit {
    pub const fn start_to_close(&self) -> Duration {
        Duration::from_millis(self.start_to_close_ms)
    }

    /// Stamp the instant the submitter stops waiting, `timeout` from now.
    #[must_use]
    pub fn with_deadline(mut self, timeout: Duration) -> Self {
        self.expires_at = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|timeout| Utc::now().checked_add_signed(timeout));
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Outcome reported by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum WorkResult {
    Completed(String),
    Failed(String),
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("No result within {0:?}")]
    Timeout(Duration),

    #[error("Workflow failed: {0}")]
    Failed(String),

    #[error("Workflow backend error: {0}")]
    Backend(String),

    #[error("Failed to (de)serialize work unit: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<WorkflowError> for ToolError {
    fn from(error: WorkflowError) -> Self {
        match error {
            WorkflowError::Timeout(_) => Self::Timeout(error.to_string()),
            WorkflowError::Failed(_) | WorkflowError::Backend(_) | WorkflowError::Serialization(_) => {
                Self::Transport(error.to_string())
            }
        }
    }
}

/// Submitting side of the engine.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Enqueue `unit` and wait up to `timeout` for its result. On timeout a
    /// unit no worker has taken yet is withdrawn from its queue; one already
    /// running is left to finish and its result is dropped.
    async fn submit_and_wait(&self, unit: WorkUnit, timeout: Duration)
    -> Result<String, WorkflowError>;
}

/// Worker side of the engine.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Wait up to `poll` for the next unit on `task_queue`.
    async fn next(&self, task_queue: &str, poll: Duration) -> Result<Option<WorkUnit>, WorkflowError>;

    async fn complete(&self, correlation_id: &str, result: WorkResult) -> Result<(), WorkflowError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> WorkUnit {
        WorkUnit {
            correlation_id: "cs-tool-1".to_string(),
            task_queue: "u1.weather".to_string(),
            request: PluggedToolRequest {
                name: "weather".to_string(),
                arguments: "{}".to_string(),
                loop_id: None,
            },
            start_to_close_ms: 1000,
            max_attempts: 1,
            expires_at: None,
        }
    }

    #[test]
    fn test_unit_without_deadline_never_expires() {
        assert!(!unit().is_expired_at(Utc::now() + chrono::Duration::days(365)));
    }

    #[test]
    fn test_deadline_expires_after_timeout() {
        let unit = unit().with_deadline(Duration::from_secs(30));
        let now = Utc::now();
        assert!(!unit.is_expired_at(now));
        assert!(unit.is_expired_at(now + chrono::Duration::seconds(31)));
    }

    #[test]
    fn test_deadline_survives_serialization() {
        let unit = unit().with_deadline(Duration::from_secs(30));
        let json = serde_json::to_string(&unit).unwrap();
        let back: WorkUnit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, unit);

        let mut value = serde_json::to_value(&unit).unwrap();
        value.as_object_mut().unwrap().remove("expires_at");
        let legacy: WorkUnit = serde_json::from_value(value).unwrap();
        assert!(legacy.expires_at.is_none());
    }
}
