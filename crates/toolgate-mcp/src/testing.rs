//! Fake transports for tests in this and downstream crates.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use toolgate_core::{
    CallToolResult, McpClient, McpClientFactory, McpError, McpServerConfig, McpToolDescriptor,
    ServerInfo,
};

pub use crate::oauth::http::testing::{FakeOAuthHttp, RecordedCall};

/// Canned answer for one tool.
#[derive(Debug, Clone)]
pub enum FakeResponse {
    Result(CallToolResult),
    Unauthorized,
    Transport,
}

impl FakeResponse {
    pub fn text(text: &str) -> Self {
        Self::Result(CallToolResult {
            content: vec![json!({"type": "text", "text": text})],
            is_error: false,
        })
    }

    pub fn tool_error(text: &str) -> Self {
        Self::Result(CallToolResult {
            content: vec![json!({"type": "text", "text": text})],
            is_error: true,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedToolCall {
    pub name: String,
    pub arguments: Value,
    pub headers: BTreeMap<String, String>,
}

/// In-memory MCP server. Unknown tools answer `ok:<name>`.
#[derive(Default)]
pub struct FakeMcpClient {
    tools: Vec<McpToolDescriptor>,
    responses: Mutex<HashMap<String, FakeResponse>>,
    calls: Mutex<Vec<RecordedToolCall>>,
    fail_close: bool,
    closes: AtomicUsize,
}

impl FakeMcpClient {
    pub fn with_tools(names: &[&str]) -> Self {
        Self {
            tools: names
                .iter()
                .map(|name| McpToolDescriptor {
                    name: (*name).to_string(),
                    description: Some(format!("{name} tool")),
                    input_schema: Some(json!({"type": "object"})),
                })
                .collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn respond(&self, tool: &str, response: FakeResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(tool.to_string(), response);
    }

    pub fn calls(&self) -> Vec<RecordedToolCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl McpClient for FakeMcpClient {
    async fn list_tools(&self) -> Result<Vec<McpToolDescriptor>, McpError> {
        Ok(self.tools.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        headers: &BTreeMap<String, String>,
    ) -> Result<CallToolResult, McpError> {
        self.calls.lock().unwrap().push(RecordedToolCall {
            name: name.to_string(),
            arguments,
            headers: headers.clone(),
        });
        match self.responses.lock().unwrap().get(name).cloned() {
            Some(FakeResponse::Result(result)) => Ok(result),
            Some(FakeResponse::Unauthorized) => {
                Err(McpError::Unauthorized("HTTP 401 from MCP server".to_string()))
            }
            Some(FakeResponse::Transport) => Err(McpError::Transport("connection reset".to_string())),
            None => Ok(CallToolResult {
                content: vec![json!({"type": "text", "text": format!("ok:{name}")})],
                is_error: false,
            }),
        }
    }

    async fn close(&self) -> Result<(), McpError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(McpError::Transport("close failed".to_string()));
        }
        Ok(())
    }
}

/// Hands out registered [`FakeMcpClient`]s by server label (remote) or
/// name (configured). Unknown servers refuse the connection.
#[derive(Default)]
pub struct FakeMcpClientFactory {
    clients: Mutex<HashMap<String, Arc<FakeMcpClient>>>,
    connects: AtomicUsize,
    seen_headers: Mutex<Vec<BTreeMap<String, String>>>,
}

impl FakeMcpClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, server: &str, client: Arc<FakeMcpClient>) {
        self.clients
            .lock()
            .unwrap()
            .insert(server.to_string(), client);
    }

    pub fn unregister(&self, server: &str) {
        self.clients.lock().unwrap().remove(server);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Headers passed with each remote connect.
    pub fn seen_headers(&self) -> Vec<BTreeMap<String, String>> {
        self.seen_headers.lock().unwrap().clone()
    }

    fn lookup(&self, server: &str) -> Result<Arc<dyn McpClient>, McpError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.clients
            .lock()
            .unwrap()
            .get(server)
            .map(|client| Arc::clone(client) as Arc<dyn McpClient>)
            .ok_or_else(|| McpError::Transport(format!("connection refused: {server}")))
    }
}

#[async_trait]
impl McpClientFactory for FakeMcpClientFactory {
    async fn connect_remote(&self, server: &ServerInfo) -> Result<Arc<dyn McpClient>, McpError> {
        self.seen_headers.lock().unwrap().push(server.headers.clone());
        self.lookup(&server.id)
    }

    async fn connect_configured(
        &self,
        name: &str,
        _config: &McpServerConfig,
    ) -> Result<Arc<dyn McpClient>, McpError> {
        self.lookup(name)
    }
}
