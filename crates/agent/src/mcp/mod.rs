//! Remote tool discovery
//!
//! A remote provider advertises tools over a connection; `RemoteTools`
//! merges them into an agent's registry under namespaced names and removes
//! them again on disconnect.

pub mod client;
pub mod remote;
pub mod transport;

pub use client::McpClient;
pub use remote::{namespaced_tool_name, RemoteTool, RemoteTools};
pub use transport::{HttpTransport, McpTransport, StdioTransport};

use async_trait::async_trait;
use ravel_config::{McpServerConfig, McpTransportConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Remote provider failures
#[derive(Error, Debug)]
pub enum McpError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Rpc(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("not connected")]
    NotConnected,

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("invalid server config: {0}")]
    Config(String),

    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type McpResult<T> = std::result::Result<T, McpError>;

/// A tool as advertised by a remote provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl RemoteToolInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Outcome of a remote invocation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteCallResult {
    pub text: String,
    /// The remote tool reported a failure
    pub is_error: bool,
}

/// Connection to an external tool provider
#[async_trait]
pub trait RemoteToolProvider: Send + Sync {
    /// Handshake and list tools. Calling again on a live connection
    /// returns the same list.
    async fn connect(&mut self) -> McpResult<Vec<RemoteToolInfo>>;

    async fn invoke(&self, name: &str, args: Value) -> McpResult<RemoteCallResult>;

    /// Close the connection. Safe to call repeatedly.
    async fn disconnect(&mut self) -> McpResult<()>;
}

/// Build an unconnected client for a configured server
pub fn provider_from_config(server: &McpServerConfig) -> McpResult<Box<dyn RemoteToolProvider>> {
    let mut server = server.clone();
    server
        .expand_env_vars()
        .map_err(|e| McpError::Config(e.to_string()))?;

    match &server.transport {
        McpTransportConfig::Stdio {
            command,
            args,
            env,
            cwd,
        } => {
            let transport = StdioTransport::spawn(command, args, env, cwd.as_deref())?;
            Ok(Box::new(McpClient::new(transport)))
        }
        McpTransportConfig::Http { url } => Ok(Box::new(McpClient::new(HttpTransport::new(url)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_provider_from_config_missing_env_var() {
        let server = McpServerConfig::stdio("gh", "true")
            .with_env("TOKEN", "${RAVEL_MCP_TEST_UNSET_VAR}");
        let err = provider_from_config(&server).err().unwrap();
        assert!(matches!(err, McpError::Config(_)));
    }

    #[tokio::test]
    async fn test_provider_from_config_http_defers_connection() {
        let server = McpServerConfig::http("remote", "http://127.0.0.1:9/mcp");
        assert!(provider_from_config(&server).is_ok());
    }
}
