//! Remote tools in the local registry

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{McpError, RemoteToolInfo, RemoteToolProvider};
use crate::tools::{ToolError, ToolRegistry, ToolSource, ToolTrait};
use crate::{AgentError, Result};

type SharedProvider = Arc<RwLock<Box<dyn RemoteToolProvider>>>;

const MAX_TOOL_NAME_LEN: usize = 64;

/// Registry name for a remote tool: `mcp_<server>_<tool>`, restricted to
/// `[A-Za-z0-9_-]` and 64 characters.
pub fn namespaced_tool_name(server: &str, tool: &str) -> String {
    let raw = format!("mcp_{}_{}", server, tool);
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_TOOL_NAME_LEN)
        .collect()
}

/// Adapter exposing one remote tool through the local tool contract
pub struct RemoteTool {
    name: String,
    remote_name: String,
    description: String,
    parameters: Value,
    provider: SharedProvider,
}

impl RemoteTool {
    fn new(server: &str, info: RemoteToolInfo, provider: SharedProvider) -> Self {
        let parameters = if info.input_schema.is_object() {
            info.input_schema
        } else {
            json!({ "type": "object", "properties": {} })
        };
        Self {
            name: namespaced_tool_name(server, &info.name),
            remote_name: info.name,
            description: info.description,
            parameters,
            provider,
        }
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }
}

#[async_trait]
impl ToolTrait for RemoteTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, args: Value) -> std::result::Result<String, ToolError> {
        let provider = self.provider.read().await;
        let result = provider
            .invoke(&self.remote_name, args)
            .await
            .map_err(|e| ToolError::Internal(format!("remote call failed: {}", e)))?;

        if result.is_error {
            Err(ToolError::Failed(result.text))
        } else {
            Ok(result.text)
        }
    }
}

struct Connection {
    provider: SharedProvider,
    tools: Vec<String>,
}

/// Live remote connections of one agent, keyed by server name
#[derive(Default)]
pub struct RemoteTools {
    connections: BTreeMap<String, Connection>,
    connect_timeout: Option<Duration>,
}

impl RemoteTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound on the handshake of subsequent `connect_server` calls
    pub fn set_connect_timeout(&mut self, timeout: Option<Duration>) {
        self.connect_timeout = timeout;
    }

    /// Connect to `server` and register its tools.
    ///
    /// A failure is fatal only when `required` is set; otherwise the server
    /// is skipped and `Ok(0)` returned. Returns the number of tools added.
    pub async fn connect_server(
        &mut self,
        server: &str,
        mut provider: Box<dyn RemoteToolProvider>,
        required: bool,
        registry: &mut ToolRegistry,
    ) -> Result<usize> {
        if let Some(existing) = self.connections.get(server) {
            debug!("Remote server '{}' already connected", server);
            return Ok(existing.tools.len());
        }

        info!("Connecting to remote tool provider '{}'", server);
        let listed = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, provider.connect())
                .await
                .unwrap_or_else(|_| Err(McpError::Timeout(limit.as_secs()))),
            None => provider.connect().await,
        };

        let infos = match listed {
            Ok(infos) => infos,
            Err(e) => {
                // Don't leave a half-open connection behind.
                if let Err(close_err) = provider.disconnect().await {
                    debug!("Closing failed connection '{}': {}", server, close_err);
                }
                if required {
                    return Err(AgentError::DiscoveryConnection {
                        server: server.to_string(),
                        reason: e.to_string(),
                    });
                }
                warn!("Skipping remote tool provider '{}': {}", server, e);
                return Ok(0);
            }
        };

        let provider: SharedProvider = Arc::new(RwLock::new(provider));
        let mut tools = Vec::with_capacity(infos.len());
        for info in infos {
            let tool = RemoteTool::new(server, info, Arc::clone(&provider));
            let name = tool.name().to_string();
            match registry.source(&name) {
                Some(ToolSource::Static) => {
                    warn!("Remote tool '{}' collides with a built-in tool, skipping", name);
                    continue;
                }
                Some(ToolSource::Remote(other)) if other != server => {
                    warn!(
                        "Remote tool '{}' from '{}' is already provided by '{}', skipping",
                        name, server, other
                    );
                    continue;
                }
                _ => {}
            }
            if tools.contains(&name) {
                warn!("Remote server '{}' lists '{}' twice", server, name);
            } else {
                tools.push(name);
            }
            registry.register_arc(Arc::new(tool), ToolSource::Remote(server.to_string()));
        }

        info!("Registered {} tool(s) from '{}'", tools.len(), server);
        let count = tools.len();
        self.connections
            .insert(server.to_string(), Connection { provider, tools });
        Ok(count)
    }

    /// Disconnect `server` and remove exactly the tools it contributed.
    /// Returns false if it was not connected.
    pub async fn disconnect_server(&mut self, server: &str, registry: &mut ToolRegistry) -> bool {
        let Some(connection) = self.connections.remove(server) else {
            return false;
        };

        let removed = registry.unregister_source(server);
        debug!(
            "Unregistered {} tool(s) from '{}' ({} tracked)",
            removed.len(),
            server,
            connection.tools.len()
        );

        if let Err(e) = connection.provider.write().await.disconnect().await {
            warn!("Error disconnecting from '{}': {}", server, e);
        }
        info!("Disconnected from remote tool provider '{}'", server);
        true
    }

    pub async fn disconnect_all(&mut self, registry: &mut ToolRegistry) {
        let servers: Vec<String> = self.connections.keys().cloned().collect();
        for server in servers {
            self.disconnect_server(&server, registry).await;
        }
    }

    pub fn is_connected(&self, server: &str) -> bool {
        self.connections.contains_key(server)
    }

    pub fn servers(&self) -> Vec<String> {
        self.connections.keys().cloned().collect()
    }

    pub fn tool_names(&self, server: &str) -> Vec<String> {
        self.connections
            .get(server)
            .map(|c| c.tools.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_tool_name() {
        assert_eq!(namespaced_tool_name("fs", "read_file"), "mcp_fs_read_file");
        assert_eq!(namespaced_tool_name("my server", "a.b/c"), "mcp_my_server_a_b_c");
        let long = "x".repeat(100);
        assert_eq!(namespaced_tool_name("s", &long).len(), MAX_TOOL_NAME_LEN);
    }
}
