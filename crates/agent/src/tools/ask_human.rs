//! Human interaction tool

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::debug;

use super::{ToolError, ToolTrait};

type LineSource = Box<dyn AsyncBufRead + Send + Unpin>;
type Prompter = Box<dyn AsyncWrite + Send + Unpin>;

/// Asks the operator a question and returns their answer
pub struct AskHumanTool {
    input: Arc<Mutex<LineSource>>,
    output: Arc<Mutex<Prompter>>,
}

impl AskHumanTool {
    /// Read answers from stdin, prompt on stdout
    pub fn new() -> Self {
        Self::with_io(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }

    pub fn with_io(
        input: impl AsyncBufRead + Send + Unpin + 'static,
        output: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            input: Arc::new(Mutex::new(Box::new(input))),
            output: Arc::new(Mutex::new(Box::new(output))),
        }
    }
}

impl Default for AskHumanTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct AskArgs {
    inquire: String,
}

#[async_trait]
impl ToolTrait for AskHumanTool {
    fn name(&self) -> &str {
        "ask_human"
    }

    fn description(&self) -> &str {
        "Use this tool to ask the human for help."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "inquire": {
                    "type": "string",
                    "description": "The question you want to ask the human."
                }
            },
            "required": ["inquire"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: AskArgs = serde_json::from_value(args)?;
        debug!("Asking human: {}", args.inquire);

        {
            let mut output = self.output.lock().await;
            output
                .write_all(format!("Bot: {}\n\nYou: ", args.inquire).as_bytes())
                .await?;
            output.flush().await?;
        }

        let mut line = String::new();
        let read = self.input.lock().await.read_line(&mut line).await?;
        if read == 0 {
            return Err(ToolError::Failed("no answer: input closed".into()));
        }
        Ok(line.trim().to_string())
    }
}
