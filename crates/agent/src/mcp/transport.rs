//! JSON-RPC transports for MCP servers

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::{McpError, McpResult};

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

fn notification(method: &str, params: Option<Value>) -> Value {
    let mut msg = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
    });
    if let Some(params) = params {
        msg["params"] = params;
    }
    msg
}

/// Carries JSON-RPC messages to one server
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a request and wait for its response
    async fn send_request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse>;

    /// Send a notification; no response is expected
    async fn send_notification(&self, method: &str, params: Option<Value>) -> McpResult<()>;

    fn is_connected(&self) -> bool;

    async fn close(&mut self) -> McpResult<()>;
}

/// Server running as a child process, speaking newline-delimited JSON
pub struct StdioTransport {
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Child>,
    connected: AtomicBool,
}

impl StdioTransport {
    pub fn new(mut child: Child) -> McpResult<Self> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("failed to capture server stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("failed to capture server stdout".into()))?;

        Ok(Self {
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(child),
            connected: AtomicBool::new(true),
        })
    }

    /// Spawn the server process. It is killed when the transport drops.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        cwd: Option<&Path>,
    ) -> McpResult<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        debug!("Spawning MCP server: {} {:?}", command, args);
        let child = cmd
            .spawn()
            .map_err(|e| McpError::Transport(format!("failed to spawn '{}': {}", command, e)))?;
        Self::new(child)
    }

    async fn read_message(&self) -> McpResult<Value> {
        let mut stdout = self.stdout.lock().await;
        let mut line = String::new();
        loop {
            line.clear();
            let read = stdout.read_line(&mut line).await?;
            if read == 0 {
                self.connected.store(false, Ordering::SeqCst);
                return Err(McpError::Transport("server closed connection".into()));
            }
            if !line.trim().is_empty() {
                break;
            }
        }
        trace!("MCP <- {}", line.trim_end());
        Ok(serde_json::from_str(&line)?)
    }

    async fn write_message(&self, value: &Value) -> McpResult<()> {
        let json = serde_json::to_string(value)?;
        trace!("MCP -> {}", json);
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send_request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        if !self.is_connected() {
            return Err(McpError::NotConnected);
        }
        let request_id = request.id;
        self.write_message(&serde_json::to_value(&request)?).await?;

        // Skip server notifications and stale responses.
        loop {
            let value = self.read_message().await?;
            if value.get("id").map_or(true, Value::is_null) {
                continue;
            }
            let response: JsonRpcResponse = serde_json::from_value(value)?;
            if response.id == Some(request_id) {
                return Ok(response);
            }
        }
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        if !self.is_connected() {
            return Err(McpError::NotConnected);
        }
        self.write_message(&notification(method, params)).await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> McpResult<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let mut child = self.child.lock().await;
        // The process may already have exited.
        let _ = child.kill().await;
        Ok(())
    }
}

/// Remote server reached with one HTTP POST per message
pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
    connected: AtomicBool,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            connected: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn send_request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        if !self.is_connected() {
            return Err(McpError::NotConnected);
        }
        let response = self.client.post(&self.url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(McpError::Transport(format!(
                "server returned status {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        if !self.is_connected() {
            return Err(McpError::NotConnected);
        }
        self.client
            .post(&self.url)
            .json(&notification(method, params))
            .send()
            .await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> McpResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
