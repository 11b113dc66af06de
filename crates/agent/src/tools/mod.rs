//! Tool contract and registry

pub mod ask_human;
pub mod schema;
pub mod shell;
pub mod terminate;

pub use ask_human::AskHumanTool;
pub use shell::ExecTool;
pub use terminate::TerminateTool;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use ravel_provider::Tool;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure reported by a tool
#[derive(Error, Debug)]
pub enum ToolError {
    /// The tool ran and reported an error result
    #[error("{0}")]
    Failed(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Infrastructure fault while running the tool
    #[error("{0}")]
    Internal(String),
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        ToolError::InvalidArguments(e.to_string())
    }
}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        ToolError::Internal(e.to_string())
    }
}

/// A callable capability exposed to the model
#[async_trait]
pub trait ToolTrait: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value;

    /// Invoking a terminal tool ends the run after the current batch
    fn is_terminal(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError>;

    /// Runs after every `execute`, whatever its outcome
    async fn release(&self) {}

    /// Runs once when the owning agent tears down
    async fn cleanup(&self) {}
}

pub fn to_provider_tool(tool: &dyn ToolTrait) -> Tool {
    Tool::new(tool.name(), tool.description(), tool.parameters())
}

/// Where a registered tool came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSource {
    Static,
    Remote(String),
}

struct Entry {
    tool: Arc<dyn ToolTrait>,
    source: ToolSource,
}

/// Tools keyed by unique name.
///
/// Registering an existing name replaces the previous entry.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Entry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    pub fn register<T: ToolTrait + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool), ToolSource::Static);
    }

    /// Register a shared tool, returning true when a previous entry was
    /// replaced.
    pub fn register_arc(&mut self, tool: Arc<dyn ToolTrait>, source: ToolSource) -> bool {
        let name = tool.name().to_string();
        debug!("Registering tool '{}' ({:?})", name, source);
        let previous = self.tools.insert(name.clone(), Entry { tool, source });
        if previous.is_some() {
            warn!("Tool '{}' was already registered, overwriting", name);
        }
        previous.is_some()
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn ToolTrait>> {
        self.tools.remove(name).map(|e| e.tool)
    }

    /// Remove every tool discovered from `server`
    pub fn unregister_source(&mut self, server: &str) -> Vec<String> {
        let names: Vec<String> = self
            .tools
            .iter()
            .filter(|(_, e)| matches!(&e.source, ToolSource::Remote(s) if s == server))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &names {
            self.tools.remove(name);
        }
        names
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolTrait>> {
        self.tools.get(name).map(|e| Arc::clone(&e.tool))
    }

    pub fn source(&self, name: &str) -> Option<&ToolSource> {
        self.tools.get(name).map(|e| &e.source)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn definitions(&self) -> Vec<Tool> {
        self.tools
            .values()
            .map(|e| to_provider_tool(e.tool.as_ref()))
            .collect()
    }

    /// Names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn tools(&self) -> impl Iterator<Item = Arc<dyn ToolTrait>> + '_ {
        self.tools.values().map(|e| Arc::clone(&e.tool))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
