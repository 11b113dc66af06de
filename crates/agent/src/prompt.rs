//! Default prompts

use chrono::Local;
use std::path::Path;

/// Appended to every completion request unless overridden
pub const NEXT_STEP_PROMPT: &str = "If the request is simple and needs no tools, answer it \
directly. Use tools only when they are needed to make progress. When the task is complete, \
call the `terminate` tool with a `status` and, when one exists, a `final_answer` for the user.";

/// Default system prompt for a tool-calling agent
pub fn system_prompt(workspace: &Path) -> String {
    let now = Local::now().format("%Y-%m-%d %H:%M (%A)");
    format!(
        r#"# ravel

You are an agent that can execute tool calls to complete the user's task.
Think step by step, choose one or more tools when an action is needed, and
read each tool observation before deciding the next step.

## Current Time
{now}

## Workspace
Your workspace is at: {workspace}
Shell commands run inside this directory."#,
        now = now,
        workspace = workspace.display()
    )
}
