//! MCP client over a spawned process's stdio.
//!
//! A writer task drains an outbound queue into stdin and a reader task
//! routes responses from stdout to waiting callers by request id, so
//! concurrent calls never hold a lock across I/O.

use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use toolgate_core::{CallToolResult, McpClient, McpError, McpServerConfig, McpToolDescriptor};

use super::jsonrpc::{self, JsonRpcRequest, JsonRpcResponse};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Client for an MCP server spawned from a launch configuration.
pub struct StdioMcpClient {
    name: String,
    outbound: mpsc::UnboundedSender<String>,
    pending: Pending,
    request_id: AtomicU64,
    timeout: Duration,
    supports_tools: AtomicBool,
    child: Mutex<Option<Child>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StdioMcpClient {
    /// Spawn the server process and complete the initialize handshake.
    pub async fn spawn(
        name: &str,
        config: &McpServerConfig,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let command = config.command.as_deref().ok_or_else(|| {
            McpError::InvalidConfig(format!("server {name} has neither command nor url"))
        })?;

        let mut child = Command::new(command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                McpError::SpawnFailed(format!(
                    "Failed to spawn '{command}': {e}\nArgs: {:?}",
                    config.args
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::SpawnFailed("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::SpawnFailed("Failed to get stdout".to_string()))?;

        let (outbound, mut queue) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(async move {
            while let Some(line) = queue.recv().await {
                if stdin.write_all(line.as_bytes()).await.is_err() || stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = Arc::clone(&pending);
        let server = name.to_string();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let Ok(response) = serde_json::from_str::<JsonRpcResponse>(trimmed) else {
                    // npx and friends print banners on stdout
                    tracing::debug!(server = %server, line = trimmed, "Skipping non-JSON-RPC output");
                    continue;
                };
                let Some(id) = response.id else { continue };
                let waiter = reader_pending.lock().ok().and_then(|mut p| p.remove(&id));
                if let Some(waiter) = waiter {
                    let _ = waiter.send(response);
                }
            }
            tracing::debug!(server = %server, "MCP server closed stdout");
            if let Ok(mut p) = reader_pending.lock() {
                p.clear();
            }
        });

        let client = Self {
            name: name.to_string(),
            outbound,
            pending,
            request_id: AtomicU64::new(1),
            timeout,
            supports_tools: AtomicBool::new(false),
            child: Mutex::new(Some(child)),
            tasks: Mutex::new(vec![writer, reader]),
        };
        client.initialize().await?;
        Ok(client)
    }

    async fn initialize(&self) -> Result<(), McpError> {
        let result = self
            .request("initialize", Some(jsonrpc::initialize_params()))
            .await?;
        self.supports_tools
            .store(jsonrpc::supports_tools(&result), Ordering::Relaxed);
        self.send_line(&jsonrpc::notification("notifications/initialized"))?;
        tracing::info!(server = %self.name, "MCP stdio session initialized");
        Ok(())
    }

    fn send_line<T: serde::Serialize>(&self, message: &T) -> Result<(), McpError> {
        let line = serde_json::to_string(message).map_err(|e| McpError::Protocol(e.to_string()))?
            + "\n";
        self.outbound
            .send(line)
            .map_err(|_| McpError::Transport(format!("server {} is not running", self.name)))
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| McpError::Transport("pending map poisoned".to_string()))?
            .insert(id, tx);

        if let Err(e) = self.send_line(&JsonRpcRequest::new(id, method, params)) {
            self.forget(id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(_)) => Err(McpError::Transport(format!(
                "server {} closed the connection",
                self.name
            ))),
            Err(_) => {
                self.forget(id);
                Err(McpError::Timeout(self.timeout))
            }
        }
    }

    fn forget(&self, id: u64) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }
    }
}

#[async_trait]
impl McpClient for StdioMcpClient {
    async fn list_tools(&self) -> Result<Vec<McpToolDescriptor>, McpError> {
        if !self.supports_tools.load(Ordering::Relaxed) {
            return Ok(Vec::new());
        }
        jsonrpc::parse_tools(self.request("tools/list", None).await?)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        _headers: &BTreeMap<String, String>,
    ) -> Result<CallToolResult, McpError> {
        let result = self
            .request("tools/call", Some(jsonrpc::call_params(name, arguments)))
            .await?;
        jsonrpc::parse_call_result(result)
    }

    async fn close(&self) -> Result<(), McpError> {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        let child = self.child.lock().ok().and_then(|mut c| c.take());
        if let Some(mut child) = child {
            child
                .kill()
                .await
                .map_err(|e| McpError::Transport(format!("failed to stop {}: {e}", self.name)))?;
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// A shell-script MCP server answering initialize, tools/list and tools/call.
    const FAKE_SERVER: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      echo "starting up"
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","serverInfo":{"name":"fake"},"capabilities":{"tools":{}}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"echo","description":"Echo"}]}}\n' "$id" ;;
    *'"method":"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"pong"}],"isError":false}}\n' "$id" ;;
  esac
done
"#;

    fn fake_config() -> McpServerConfig {
        McpServerConfig {
            command: Some("sh".to_string()),
            args: vec!["-c".to_string(), FAKE_SERVER.to_string()],
            ..McpServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_stdio_round_trip() {
        let client = StdioMcpClient::spawn("fake", &fake_config(), Duration::from_secs(10))
            .await
            .unwrap();

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");

        let result = client
            .call_tool("echo", serde_json::json!({}), &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(result.text(), "pong");
        assert!(!result.is_error);

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_command_is_invalid_config() {
        let result =
            StdioMcpClient::spawn("empty", &McpServerConfig::default(), Duration::from_secs(1))
                .await;
        assert!(matches!(result, Err(McpError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let config = McpServerConfig {
            command: Some("/nonexistent/mcp-server".to_string()),
            ..McpServerConfig::default()
        };
        let result = StdioMcpClient::spawn("bad", &config, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(McpError::SpawnFailed(_))));
    }
}
