//! Workflow engines and the client-side activity worker.
//!
//! - [`InProcessWorkflowEngine`]: submitter and worker in one process
//! - [`RedisWorkflowEngine`]: Redis lists shared with `toolgate-worker`
//! - [`ActivityWorker`]: polls task queues and runs an [`Activity`]

mod activity;
pub mod cli;
pub mod config;
mod in_process;
mod redis_engine;
mod worker;

pub use activity::{Activity, PlaceholderActivity};
pub use config::{QueueConfig, WorkerConfig, WorkerConfigError};
pub use in_process::InProcessWorkflowEngine;
pub use redis_engine::{RedisWorkflowEngine, queue_key, result_key};
pub use worker::ActivityWorker;
