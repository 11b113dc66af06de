//! MCP client

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::transport::{JsonRpcRequest, McpTransport};
use super::{McpError, McpResult, RemoteCallResult, RemoteToolInfo, RemoteToolProvider};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Upper bound on `tools/list` pages fetched during one discovery
pub const MAX_TOOL_PAGES: usize = 64;

#[derive(Debug, Clone, Serialize)]
struct ClientInfo {
    name: String,
    version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "ravel".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Server identity returned by `initialize`
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    #[serde(default)]
    protocol_version: String,
    server_info: ServerInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct McpToolInfo {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    input_schema: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListToolsResult {
    tools: Vec<McpToolInfo>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentItem {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallToolResult {
    #[serde(default)]
    content: Vec<ContentItem>,
    #[serde(default)]
    is_error: bool,
}

/// Client for one MCP server
pub struct McpClient<T: McpTransport> {
    transport: T,
    request_id: AtomicU64,
    server_info: Option<ServerInfo>,
    tools: Option<Vec<RemoteToolInfo>>,
    closed: bool,
}

impl<T: McpTransport> McpClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            request_id: AtomicU64::new(1),
            server_info: None,
            tools: None,
            closed: false,
        }
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn request<R: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> McpResult<R> {
        let request = JsonRpcRequest::new(self.next_id(), method, params);
        let response = self.transport.send_request(request).await?;

        if let Some(error) = response.error {
            return Err(McpError::Rpc(error.to_string()));
        }
        let result = response
            .result
            .ok_or_else(|| McpError::Protocol(format!("'{}' response has no result", method)))?;
        Ok(serde_json::from_value(result)?)
    }

    async fn initialize(&mut self) -> McpResult<()> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": ClientInfo::default(),
        });
        let result: InitializeResult = self.request("initialize", Some(params)).await?;
        self.transport
            .send_notification("notifications/initialized", None)
            .await?;

        info!(
            "Connected to MCP server '{}' (protocol {})",
            result.server_info.name, result.protocol_version
        );
        self.server_info = Some(result.server_info);
        Ok(())
    }

    async fn list_tools(&self) -> McpResult<Vec<RemoteToolInfo>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();

        for page_no in 1..=MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult = self.request("tools/list", params).await?;
            tools.extend(page.tools.into_iter().map(|t| RemoteToolInfo {
                name: t.name,
                description: t.description.unwrap_or_default(),
                input_schema: t.input_schema,
            }));

            match page.next_cursor {
                Some(next) if !next.is_empty() => {
                    if !seen.insert(next.clone()) {
                        warn!("MCP server repeated tools/list cursor '{}', stopping", next);
                        return Ok(tools);
                    }
                    cursor = Some(next);
                }
                _ => return Ok(tools),
            }
            if page_no == MAX_TOOL_PAGES {
                warn!("MCP server listed more than {} pages of tools, stopping", MAX_TOOL_PAGES);
            }
        }
        Ok(tools)
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.tools.is_some() && !self.closed && self.transport.is_connected()
    }
}

#[async_trait]
impl<T: McpTransport> RemoteToolProvider for McpClient<T> {
    async fn connect(&mut self) -> McpResult<Vec<RemoteToolInfo>> {
        if self.closed {
            return Err(McpError::NotConnected);
        }
        if let Some(tools) = &self.tools {
            debug!("MCP client already connected, reusing tool list");
            return Ok(tools.clone());
        }

        self.initialize().await?;
        let tools = self.list_tools().await?;
        debug!("MCP server exposes {} tool(s)", tools.len());
        self.tools = Some(tools.clone());
        Ok(tools)
    }

    async fn invoke(&self, name: &str, args: Value) -> McpResult<RemoteCallResult> {
        if self.tools.is_none() || self.closed {
            return Err(McpError::NotConnected);
        }
        let params = json!({ "name": name, "arguments": args });
        let result: CallToolResult = self.request("tools/call", Some(params)).await?;

        let text = result
            .content
            .into_iter()
            .filter(|item| item.content_type == "text")
            .filter_map(|item| item.text)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(RemoteCallResult {
            text,
            is_error: result.is_error,
        })
    }

    async fn disconnect(&mut self) -> McpResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.tools = None;
        self.transport.close().await
    }
}
