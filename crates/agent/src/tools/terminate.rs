//! Termination tool

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{ToolError, ToolTrait};

pub const TERMINATE_TOOL_NAME: &str = "terminate";

/// Ends the run once the current batch of tool calls completes
#[derive(Debug, Clone, Default)]
pub struct TerminateTool;

impl TerminateTool {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Deserialize)]
struct TerminateArgs {
    status: String,
    #[serde(default)]
    final_answer: Option<String>,
}

#[async_trait]
impl ToolTrait for TerminateTool {
    fn name(&self) -> &str {
        TERMINATE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Terminate the interaction when the request is met or the task cannot proceed. \
         Provide the final answer for the user when one is available."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "description": "The finish status of the interaction",
                    "enum": ["success", "failure"]
                },
                "final_answer": {
                    "type": "string",
                    "description": "Final answer for the user"
                }
            },
            "required": ["status"]
        })
    }

    fn is_terminal(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: TerminateArgs = serde_json::from_value(args)?;
        info!("Terminate requested with status {}", args.status);

        match args.final_answer.as_deref().map(str::trim) {
            Some(answer) if !answer.is_empty() => Ok(answer.to_string()),
            _ => Ok(format!(
                "The interaction has been completed with status: {}",
                args.status
            )),
        }
    }
}
