//! Tool-call dispatch
//!
//! Every requested call yields exactly one tool-result message, in request
//! order. Tool failures of any kind become structured payloads the model
//! can read; nothing a tool does escapes `dispatch`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use ravel_provider::{Message, ToolCall};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::memory::Memory;
use crate::tools::schema::validate_arguments;
use crate::tools::{ToolError, ToolRegistry};
use crate::AgentError;

/// Result of one act phase
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActOutcome {
    /// Tool outputs joined in request order
    pub result: String,
    /// A terminal tool ran in this batch
    pub terminate: bool,
    pub calls: usize,
    /// The batch was interrupted; unfinished calls carry a `cancelled` result
    pub cancelled: bool,
}

/// Executes tool calls against a registry
#[derive(Debug, Clone)]
pub struct Dispatcher {
    timeout: Duration,
    max_observe: Option<usize>,
}

impl Dispatcher {
    pub fn new(timeout: Duration, max_observe: Option<usize>) -> Self {
        Self {
            timeout,
            max_observe: max_observe.filter(|m| *m > 0),
        }
    }

    /// Run every call in order, appending one tool-result message per call.
    ///
    /// A terminal tool sets `terminate` only after the whole batch ran. Once
    /// `cancel` fires, the running tool is interrupted (its `release` still
    /// runs) and it and every later call get a `cancelled` result.
    pub async fn dispatch(
        &self,
        registry: &ToolRegistry,
        calls: &[ToolCall],
        memory: &mut Memory,
        cancel: &CancellationToken,
    ) -> ActOutcome {
        let mut outputs = Vec::with_capacity(calls.len());
        let mut terminate = false;

        for call in calls {
            let (content, terminal) = if cancel.is_cancelled() {
                (cancelled_payload(&call.name), false)
            } else {
                self.execute_call(registry, call, cancel).await
            };
            debug!("Tool '{}' ({}) -> {} chars", call.name, call.id, content.len());
            memory.append(Message::tool(&call.id, &call.name, &content));
            outputs.push(content);
            terminate |= terminal;
        }

        let cancelled = cancel.is_cancelled();
        if cancelled {
            warn!("Tool batch interrupted by cancellation");
        } else if terminate {
            info!("Termination requested, ending run after this batch");
        }

        ActOutcome {
            result: outputs.join("\n\n"),
            terminate: terminate && !cancelled,
            calls: calls.len(),
            cancelled,
        }
    }

    async fn execute_call(
        &self,
        registry: &ToolRegistry,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> (String, bool) {
        let Some(tool) = registry.get(&call.name) else {
            warn!("Model requested unknown tool '{}'", call.name);
            return (
                failure_payload(&AgentError::ToolNotFound(call.name.clone())),
                false,
            );
        };
        let terminal = tool.is_terminal();

        let args = match validate_arguments(&tool.parameters(), &call.arguments) {
            Ok(args) => args,
            Err(reason) => {
                warn!("Invalid arguments for '{}': {}", call.name, reason);
                let err = AgentError::InvalidToolArguments {
                    tool: call.name.clone(),
                    reason,
                };
                return (failure_payload(&err), terminal);
            }
        };

        info!("Activating tool '{}'", call.name);
        let run = AssertUnwindSafe(tool.execute(args)).catch_unwind();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = tokio::time::timeout(self.timeout, run) => Some(outcome),
        };
        tool.release().await;

        let Some(outcome) = outcome else {
            warn!("Tool '{}' interrupted by cancellation", call.name);
            return (cancelled_payload(&call.name), false);
        };

        let content = match outcome {
            Ok(Ok(Ok(output))) => self.observation(&call.name, &output),
            Ok(Ok(Err(ToolError::InvalidArguments(reason)))) => {
                failure_payload(&AgentError::InvalidToolArguments {
                    tool: call.name.clone(),
                    reason,
                })
            }
            Ok(Ok(Err(ToolError::Failed(reason)))) => tool_error_payload(&call.name, &reason),
            Ok(Ok(Err(err @ ToolError::Internal(_)))) => {
                warn!("Tool '{}' faulted: {}", call.name, err);
                failure_payload(&AgentError::ToolExecution {
                    tool: call.name.clone(),
                    reason: err.to_string(),
                })
            }
            Ok(Err(panic)) => {
                let reason = format!("tool panicked: {}", panic_message(panic.as_ref()));
                warn!("Tool '{}' {}", call.name, reason);
                failure_payload(&AgentError::ToolExecution {
                    tool: call.name.clone(),
                    reason,
                })
            }
            Err(_) => {
                let reason = format!("timed out after {}s", self.timeout.as_secs());
                warn!("Tool '{}' {}", call.name, reason);
                failure_payload(&AgentError::ToolExecution {
                    tool: call.name.clone(),
                    reason,
                })
            }
        };

        (content, terminal)
    }

    fn observation(&self, name: &str, output: &str) -> String {
        if output.is_empty() {
            return format!("Cmd `{}` completed with no output", name);
        }

        let output = match self.max_observe {
            Some(max) if output.chars().count() > max => {
                output.chars().take(max).collect::<String>()
            }
            _ => output.to_string(),
        };
        format!("Observed output of cmd `{}` executed:\n{}", name, output)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(120), None)
    }
}

/// Structured payload for a call that could not be carried out
pub fn failure_payload(err: &AgentError) -> String {
    let tool = match err {
        AgentError::ToolNotFound(name) => Some(name.as_str()),
        AgentError::InvalidToolArguments { tool, .. } | AgentError::ToolExecution { tool, .. } => {
            Some(tool.as_str())
        }
        _ => None,
    };
    json!({
        "error": {
            "kind": err.kind(),
            "tool": tool,
            "message": err.to_string(),
        }
    })
    .to_string()
}

/// Structured payload for a call cut short or skipped by cancellation
fn cancelled_payload(tool: &str) -> String {
    json!({
        "error": {
            "kind": AgentError::Cancelled.kind(),
            "tool": tool,
            "message": AgentError::Cancelled.to_string(),
        }
    })
    .to_string()
}

/// Structured payload for a tool that ran and reported an error
fn tool_error_payload(tool: &str, message: &str) -> String {
    json!({
        "error": {
            "kind": "tool_error",
            "tool": tool,
            "message": message,
        }
    })
    .to_string()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
