//! Worker configuration file.
//!
//! ```json
//! { "profileid": "u1", "queues": [{ "name": "weather" }] }
//! ```
//!
//! Each queue name is a tool name; the task queue served is
//! `<profileid>.<name>`, matching the id client-side tools are registered
//! under.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerConfigError {
    #[error("Failed to read worker config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid worker config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Worker config {0} lists no queues")]
    NoQueues(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueConfig {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkerConfig {
    pub profileid: String,
    pub queues: Vec<QueueConfig>,
}

impl WorkerConfig {
    pub async fn load(path: &Path) -> Result<Self, WorkerConfigError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| WorkerConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config: Self =
            serde_json::from_str(&raw).map_err(|source| WorkerConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if config.queues.is_empty() {
            return Err(WorkerConfigError::NoQueues(path.to_path_buf()));
        }
        Ok(config)
    }

    pub fn task_queues(&self) -> Vec<String> {
        self.queues
            .iter()
            .map(|q| format!("{}.{}", self.profileid, q.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_load_builds_task_queues() {
        let file = write(r#"{"profileid":"u1","queues":[{"name":"weather"},{"name":"files"}]}"#);
        let config = WorkerConfig::load(file.path()).await.unwrap();
        assert_eq!(config.task_queues(), vec!["u1.weather", "u1.files"]);
    }

    #[tokio::test]
    async fn test_empty_queue_list_rejected() {
        let file = write(r#"{"profileid":"u1","queues":[]}"#);
        let err = WorkerConfig::load(file.path()).await.unwrap_err();
        assert!(matches!(err, WorkerConfigError::NoQueues(_)));
    }

    #[tokio::test]
    async fn test_garbage_rejected() {
        let file = write("profileid = u1");
        let err = WorkerConfig::load(file.path()).await.unwrap_err();
        assert!(matches!(err, WorkerConfigError::Parse { .. }));
    }
}
