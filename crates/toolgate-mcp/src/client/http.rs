//! MCP client over HTTP (one JSON-RPC POST per request).
//!
//! Responses may come back as plain JSON or as a `text/event-stream` body;
//! for the latter the `data:` event carrying our request id is used.
//! Server push and resumable streams are not supported.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use toolgate_core::{CallToolResult, McpClient, McpError, McpToolDescriptor};

use super::jsonrpc::{self, JsonRpcRequest, JsonRpcResponse};

const SESSION_HEADER: &str = "mcp-session-id";

/// Client for a remote MCP server reachable over HTTP.
pub struct HttpMcpClient {
    http: reqwest::Client,
    endpoint: String,
    /// Headers sent with every request (connect-time credentials).
    headers: BTreeMap<String, String>,
    session_id: Mutex<Option<String>>,
    request_id: AtomicU64,
    timeout: Duration,
}

impl HttpMcpClient {
    /// Connect and complete the initialize handshake.
    pub async fn connect(
        endpoint: &str,
        headers: BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| McpError::Transport(e.to_string()))?;
        let client = Self {
            http,
            endpoint: endpoint.to_string(),
            headers,
            session_id: Mutex::new(None),
            request_id: AtomicU64::new(1),
            timeout,
        };

        client
            .request("initialize", Some(jsonrpc::initialize_params()), &BTreeMap::new())
            .await?;
        client
            .post(&jsonrpc::notification("notifications/initialized"), &BTreeMap::new())
            .await?;
        tracing::info!(endpoint = %client.endpoint, "MCP http session initialized");
        Ok(client)
    }

    fn session(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|s| s.clone())
    }

    async fn post<T: serde::Serialize + Sync>(
        &self,
        body: &T,
        extra_headers: &BTreeMap<String, String>,
    ) -> Result<reqwest::Response, McpError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json, text/event-stream")
            .headers(merged_headers(&self.headers, extra_headers)?)
            .json(body);
        if let Some(session) = self.session() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                McpError::Timeout(self.timeout)
            } else {
                McpError::Transport(e.to_string())
            }
        })?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if let Ok(mut slot) = self.session_id.lock() {
                *slot = Some(session.to_string());
            }
        }

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(McpError::Unauthorized(format!(
                "{} returned 401",
                self.endpoint
            ))),
            status if !status.is_success() => Err(McpError::Transport(format!(
                "{} returned HTTP {status}",
                self.endpoint
            ))),
            _ => Ok(response),
        }
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        headers: &BTreeMap<String, String>,
    ) -> Result<Value, McpError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let response = self
            .post(&JsonRpcRequest::new(id, method, params), headers)
            .await?;

        let is_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = response
            .text()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let parsed = if is_stream {
            find_sse_response(&body, id)
        } else {
            serde_json::from_str::<JsonRpcResponse>(&body).ok()
        };
        parsed
            .ok_or_else(|| McpError::Protocol(format!("No JSON-RPC response for {method}")))?
            .into_result()
    }
}

/// Connect-time headers overlaid with per-call ones. Names compare
/// case-insensitively and a per-call value replaces the connect-time one.
fn merged_headers(
    base: &BTreeMap<String, String>,
    extra: &BTreeMap<String, String>,
) -> Result<HeaderMap, McpError> {
    let mut merged = HeaderMap::with_capacity(base.len() + extra.len());
    for (name, value) in base.iter().chain(extra) {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| McpError::Transport(format!("Invalid header name {name:?}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| McpError::Transport(format!("Invalid value for header {name:?}")))?;
        merged.insert(header, value);
    }
    Ok(merged)
}

/// Pick the JSON-RPC response with `id` out of an SSE body.
fn find_sse_response(body: &str, id: u64) -> Option<JsonRpcResponse> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<JsonRpcResponse>(data.trim()).ok())
        .find(|response| response.id == Some(id))
}

#[async_trait]
impl McpClient for HttpMcpClient {
    async fn list_tools(&self) -> Result<Vec<McpToolDescriptor>, McpError> {
        jsonrpc::parse_tools(self.request("tools/list", None, &BTreeMap::new()).await?)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        headers: &BTreeMap<String, String>,
    ) -> Result<CallToolResult, McpError> {
        let result = self
            .request("tools/call", Some(jsonrpc::call_params(name, arguments)), headers)
            .await?;
        jsonrpc::parse_call_result(result)
    }

    async fn close(&self) -> Result<(), McpError> {
        let Some(session) = self.session() else {
            return Ok(());
        };
        // Best effort; servers may not support explicit session teardown.
        let _ = self
            .http
            .delete(&self.endpoint)
            .header(SESSION_HEADER, session)
            .send()
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    /// Minimal HTTP/1.1 JSON-RPC server recording the header block of every
    /// request, keyed by JSON-RPC method.
    async fn serve(stream: TcpStream, seen: Arc<Mutex<Vec<(String, String)>>>) {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        loop {
            let mut head = String::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                    return;
                }
                if line == "\r\n" {
                    break;
                }
                head.push_str(&line);
            }
            let length = head
                .lines()
                .filter_map(|l| l.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .map_or(0, |(_, v)| v.trim().parse::<usize>().unwrap());
            let mut body = vec![0; length];
            reader.read_exact(&mut body).await.unwrap();
            let request: Value = serde_json::from_slice(&body).unwrap();
            let method = request["method"].as_str().unwrap_or_default().to_string();
            seen.lock().unwrap().push((method.clone(), head));

            let reply = match request.get("id") {
                Some(id) => {
                    let result = if method == "tools/call" {
                        serde_json::json!({"content": [{"type": "text", "text": "ok"}], "isError": false})
                    } else {
                        serde_json::json!({})
                    };
                    serde_json::json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()
                }
                None => String::new(),
            };
            let status = if reply.is_empty() { "202 Accepted" } else { "200 OK" };
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{reply}",
                reply.len()
            );
            writer.write_all(response.as_bytes()).await.unwrap();
            writer.flush().await.unwrap();
        }
    }

    #[test]
    fn test_merged_headers_per_call_value_wins() {
        let base = headers(&[("Authorization", "Bearer t0"), ("X-Tenant", "u1")]);
        let extra = headers(&[("authorization", "Bearer t1")]);

        let merged = merged_headers(&base, &extra).unwrap();
        let auth: Vec<_> = merged.get_all(reqwest::header::AUTHORIZATION).iter().collect();
        assert_eq!(auth, vec!["Bearer t1"]);
        assert_eq!(merged["x-tenant"], "u1");
    }

    #[test]
    fn test_merged_headers_rejects_bad_name() {
        let err = merged_headers(&headers(&[("bad header", "v")]), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, McpError::Transport(_)));
    }

    #[tokio::test]
    async fn test_call_sends_authorization_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&recorder)));
            }
        });

        let client = HttpMcpClient::connect(
            &format!("http://{addr}/mcp"),
            headers(&[("Authorization", "Bearer t0")]),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        let result = client
            .call_tool(
                "echo",
                serde_json::json!({}),
                &headers(&[("Authorization", "Bearer t1")]),
            )
            .await
            .unwrap();
        assert_eq!(result.text(), "ok");

        let seen = seen.lock().unwrap();
        let (_, head) = seen.iter().find(|(method, _)| method == "tools/call").unwrap();
        let auth: Vec<&str> = head
            .lines()
            .filter(|l| l.to_ascii_lowercase().starts_with("authorization:"))
            .collect();
        assert_eq!(auth.len(), 1);
        assert!(auth[0].ends_with("Bearer t1"));
    }

    #[test]
    fn test_find_sse_response_matches_id() {
        let body = "event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n\
                    event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"tools\":[]}}\n\n";
        let response = find_sse_response(body, 7).unwrap();
        assert!(response.result.is_some());
        assert!(find_sse_response(body, 8).is_none());
    }
}
