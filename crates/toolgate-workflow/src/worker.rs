//! Activity worker.
//!
//! Polls one or more task queues, runs each unit through an [`Activity`]
//! with its retry budget, and reports the outcome back to the engine.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use toolgate_core::{WorkQueue, WorkResult, WorkUnit};

use crate::activity::Activity;

const DEFAULT_POLL: Duration = Duration::from_secs(5);
const BACKEND_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct ActivityWorker {
    queue: Arc<dyn WorkQueue>,
    activity: Arc<dyn Activity>,
    task_queues: Vec<String>,
    poll: Duration,
}

impl ActivityWorker {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        activity: Arc<dyn Activity>,
        task_queues: Vec<String>,
    ) -> Self {
        Self {
            queue,
            activity,
            task_queues,
            poll: DEFAULT_POLL,
        }
    }

    #[must_use]
    pub const fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Serve every task queue until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut tasks = JoinSet::new();
        for task_queue in self.task_queues.clone() {
            let worker = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { worker.serve(&task_queue, cancel).await });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
        tracing::info!("Activity worker stopped");
    }

    async fn serve(&self, task_queue: &str, cancel: CancellationToken) {
        tracing::info!(task_queue, "Polling task queue");
        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => return,
                next = self.queue.next(task_queue, self.poll) => next,
            };
            match next {
                Ok(Some(unit)) => self.handle(unit).await,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(task_queue, error = %e, "Failed to poll task queue");
                    tokio::select! {
                        () = cancel.cancelled() => return,
                        () = tokio::time::sleep(BACKEND_BACKOFF) => {}
                    }
                }
            }
        }
    }

    /// Run one unit and report its result. Units whose submitter has
    /// stopped waiting are dropped unrun.
    pub async fn handle(&self, unit: WorkUnit) {
        if unit.is_expired() {
            tracing::info!(workflow = %unit.correlation_id, "Skipping expired work unit");
            return;
        }
        let result = self.attempt_all(&unit).await;
        if let Err(e) = self.queue.complete(&unit.correlation_id, result).await {
            tracing::error!(workflow = %unit.correlation_id, error = %e, "Failed to report result");
        }
    }

    async fn attempt_all(&self, unit: &WorkUnit) -> WorkResult {
        let attempts = unit.max_attempts.max(1);
        let budget = unit.start_to_close();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match tokio::time::timeout(budget, self.activity.run(&unit.request)).await {
                Ok(Ok(value)) => return WorkResult::Completed(value),
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("Activity timed out after {budget:?}"),
            }
            tracing::warn!(
                workflow = %unit.correlation_id,
                attempt,
                attempts,
                error = %last_error,
                "Activity attempt failed"
            );
        }
        WorkResult::Failed(last_error)
    }
}
