//! Shell command execution

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::{ToolError, ToolTrait};

const MAX_OUTPUT_LEN: usize = 10000;

/// Runs `sh -c <command>` inside the workspace
pub struct ExecTool {
    timeout: Duration,
    workspace: PathBuf,
}

impl ExecTool {
    pub fn new(timeout_secs: u64, workspace: PathBuf) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            workspace,
        }
    }

    pub fn with_workspace(workspace: PathBuf) -> Self {
        Self::new(60, workspace)
    }

    /// Resolve a requested directory, refusing anything outside the workspace
    fn resolve_dir(&self, dir: &str) -> Result<PathBuf, ToolError> {
        let requested = Path::new(dir);
        if requested
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(ToolError::InvalidArguments(format!(
                "working_dir '{}' must not contain '..'",
                dir
            )));
        }

        let resolved = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.workspace.join(requested)
        };
        if !resolved.starts_with(&self.workspace) {
            return Err(ToolError::InvalidArguments(format!(
                "working_dir '{}' is outside the workspace",
                dir
            )));
        }
        Ok(resolved)
    }
}

#[derive(Deserialize)]
struct ExecArgs {
    command: String,
    working_dir: Option<String>,
}

#[async_trait]
impl ToolTrait for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its output. Use with caution."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to run" },
                "working_dir": { "type": "string", "description": "Directory inside the workspace" }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let args: ExecArgs = serde_json::from_value(args)?;

        let working_dir = match args.working_dir.as_deref() {
            Some(dir) => self.resolve_dir(dir)?,
            None => self.workspace.clone(),
        };

        debug!("Executing: {}", args.command);
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&args.command)
            .current_dir(&working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ToolError::Failed(format!("failed to run command: {}", e))),
            Err(_) => {
                return Err(ToolError::Failed(format!(
                    "command timed out after {} seconds",
                    self.timeout.as_secs()
                )))
            }
        };

        let mut parts = Vec::new();
        if !output.stdout.is_empty() {
            parts.push(String::from_utf8_lossy(&output.stdout).to_string());
        }
        if !output.stderr.is_empty() {
            parts.push(format!(
                "STDERR:\n{}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        if output.status.code() != Some(0) {
            parts.push(format!("EXIT CODE: {}", output.status.code().unwrap_or(-1)));
        }

        let result = parts.join("\n");
        if result.len() > MAX_OUTPUT_LEN {
            let mut cut = MAX_OUTPUT_LEN;
            while !result.is_char_boundary(cut) {
                cut -= 1;
            }
            Ok(format!(
                "{}\n... (truncated, {} more bytes)",
                &result[..cut],
                result.len() - cut
            ))
        } else {
            Ok(result)
        }
    }
}
