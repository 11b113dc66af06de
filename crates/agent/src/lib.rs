//! Agent core: lifecycle state machine, memory, think/act step cycle,
//! tool dispatch, remote tool discovery and the runtime loop.

use thiserror::Error;

use ravel_provider::ProviderError;

pub mod agent;
pub mod builder;
pub mod dispatcher;
pub mod mcp;
pub mod memory;
pub mod prompt;
pub mod runtime;
pub mod state;
pub mod stuck;
pub mod tools;

pub use agent::{Agent, StepOutcome, ToolCallAgent};
pub use builder::AgentBuilder;
pub use dispatcher::{ActOutcome, Dispatcher};
pub use mcp::{RemoteCallResult, RemoteToolInfo, RemoteToolProvider, RemoteTools};
pub use memory::Memory;
pub use runtime::{RunReport, Runtime, RuntimeOptions};
pub use state::{AgentState, StateMachine};
pub use stuck::StuckMonitor;
pub use tools::{ToolError, ToolRegistry, ToolTrait};

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: AgentState, to: AgentState },

    #[error("completion failed: {0}")]
    Completion(#[from] ProviderError),

    #[error("tool '{0}' not found")]
    ToolNotFound(String),

    #[error("invalid arguments for tool '{tool}': {reason}")]
    InvalidToolArguments { tool: String, reason: String },

    #[error("tool '{tool}' failed: {reason}")]
    ToolExecution { tool: String, reason: String },

    #[error("tool choice is 'required' but the model chose no tool")]
    NoActionChosen,

    #[error("remote tool provider '{server}' unreachable: {reason}")]
    DiscoveryConnection { server: String, reason: String },

    #[error("run cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Whether the runtime loop may record this error and keep stepping
    pub fn is_step_recoverable(&self) -> bool {
        matches!(
            self,
            AgentError::NoActionChosen
                | AgentError::ToolNotFound(_)
                | AgentError::InvalidToolArguments { .. }
                | AgentError::ToolExecution { .. }
        )
    }

    /// Machine-readable kind used in tool-result payloads
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::InvalidStateTransition { .. } => "invalid_state_transition",
            AgentError::Completion(_) => "completion_error",
            AgentError::ToolNotFound(_) => "tool_not_found",
            AgentError::InvalidToolArguments { .. } => "invalid_arguments",
            AgentError::ToolExecution { .. } => "execution_failure",
            AgentError::NoActionChosen => "no_action_chosen",
            AgentError::DiscoveryConnection { .. } => "discovery_connection",
            AgentError::Cancelled => "cancelled",
            AgentError::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
