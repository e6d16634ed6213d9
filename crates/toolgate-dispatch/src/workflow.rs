//! Runs client-side tools as units of work on the workflow engine.

use std::sync::Arc;
use std::time::Duration;

use toolgate_core::{ClientSideExecution, PluggedToolRequest, ToolError, WorkUnit, WorkflowEngine};
use uuid::Uuid;

/// `cs-tool-<loop>-<4 hex>` inside an agent loop, `cs-tool-<uuid>` otherwise.
pub fn workflow_id(loop_id: Option<&str>) -> String {
    match loop_id {
        Some(loop_id) => {
            let suffix = Uuid::new_v4().simple().to_string();
            format!("cs-tool-{loop_id}-{}", &suffix[..4])
        }
        None => format!("cs-tool-{}", Uuid::new_v4()),
    }
}

pub struct WorkflowToolExecutor {
    engine: Arc<dyn WorkflowEngine>,
    run_timeout: Duration,
}

impl WorkflowToolExecutor {
    pub fn new(engine: Arc<dyn WorkflowEngine>, run_timeout: Duration) -> Self {
        Self {
            engine,
            run_timeout,
        }
    }

    /// Submit `request` to the tool's queue and wait for the worker's answer.
    ///
    /// Gives up after the run timeout, when the engine withdraws the unit.
    pub async fn execute(
        &self,
        execution: &ClientSideExecution,
        request: PluggedToolRequest,
    ) -> Result<String, ToolError> {
        let unit = WorkUnit {
            correlation_id: workflow_id(request.loop_id.as_deref()),
            task_queue: execution.task_queue.clone(),
            request,
            start_to_close_ms: execution.wait_time_ms,
            max_attempts: execution.max_retry_attempts.max(1),
            expires_at: None,
        };
        let workflow = unit.correlation_id.clone();
        tracing::debug!(workflow = %workflow, queue = %unit.task_queue, "Starting client-side tool workflow");

        match self.engine.submit_and_wait(unit, self.run_timeout).await {
            Ok(result) => {
                tracing::debug!(workflow = %workflow, "Client-side tool workflow completed");
                Ok(result)
            }
            Err(e) => {
                tracing::error!(workflow = %workflow, error = %e, "Client-side tool workflow failed");
                Err(e.into())
            }
        }
    }
}
