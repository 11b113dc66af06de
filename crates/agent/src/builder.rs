//! Agent construction
//!
//! Every parameter is explicit: either set on the builder or taken from a
//! `Config` with `from_config`.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use ravel_config::{Config, McpServerConfig};
use ravel_provider::{Message, Provider, ToolChoice};

use crate::agent::ToolCallAgent;
use crate::dispatcher::Dispatcher;
use crate::mcp::{provider_from_config, RemoteToolProvider};
use crate::memory::Memory;
use crate::prompt;
use crate::runtime::{Runtime, RuntimeOptions};
use crate::tools::{AskHumanTool, ExecTool, TerminateTool, ToolRegistry, ToolTrait};
use crate::{Agent, AgentError, Result};

struct PendingRemote {
    name: String,
    provider: Box<dyn RemoteToolProvider>,
    required: bool,
}

/// Builds a `Runtime` around a `ToolCallAgent`
pub struct AgentBuilder<P: Provider> {
    provider: P,
    name: String,
    model: Option<String>,
    max_tokens: u32,
    temperature: f32,
    workspace: PathBuf,
    system_prompt: Option<String>,
    next_step_prompt: Option<String>,
    tool_choice: ToolChoice,
    max_messages: Option<usize>,
    max_observe: Option<usize>,
    tool_timeout: Duration,
    options: RuntimeOptions,
    tools: ToolRegistry,
    servers: Vec<McpServerConfig>,
    remotes: Vec<PendingRemote>,
}

impl<P: Provider> AgentBuilder<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            name: "ravel".to_string(),
            model: None,
            max_tokens: 4096,
            temperature: 0.0,
            workspace: ravel_config::workspace_path(),
            system_prompt: None,
            next_step_prompt: Some(prompt::NEXT_STEP_PROMPT.to_string()),
            tool_choice: ToolChoice::Auto,
            max_messages: None,
            max_observe: None,
            tool_timeout: Duration::from_secs(120),
            options: RuntimeOptions::default(),
            tools: ToolRegistry::new(),
            servers: Vec::new(),
            remotes: Vec::new(),
        }
    }

    /// Apply every section of `config`, including the enabled built-in
    /// tools and the configured remote servers.
    pub fn from_config(provider: P, config: &Config) -> Self {
        let agent = &config.agent;
        let mut builder = Self::new(provider)
            .model(config.model())
            .sampling(config.provider.max_tokens, config.provider.temperature)
            .max_steps(agent.max_steps)
            .duplicate_threshold(agent.duplicate_threshold)
            .tool_choice(agent.tool_choice)
            .max_messages(agent.max_messages)
            .max_observe(agent.max_observe)
            .tool_timeout(Duration::from_secs(agent.tool_timeout_secs))
            .abort_on_completion_error(agent.abort_on_completion_error);

        if let Some(system) = &agent.system_prompt {
            builder = builder.system_prompt(system.clone());
        }
        if let Some(next) = &agent.next_step_prompt {
            builder = builder.next_step_prompt(Some(next.clone()));
        }

        if config.tools.exec.enabled {
            let exec = ExecTool::new(config.tools.exec.timeout_secs, builder.workspace.clone());
            builder = builder.tool(exec);
        }
        if config.tools.ask_human.enabled {
            builder = builder.tool(AskHumanTool::new());
        }

        for server in &config.mcp.servers {
            builder = builder.mcp_server(server.clone());
        }
        builder
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// `None` or an empty string disables the trailing prompt
    pub fn next_step_prompt(mut self, prompt: Option<String>) -> Self {
        self.next_step_prompt = prompt;
        self
    }

    pub fn tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.options.max_steps = max_steps;
        self
    }

    pub fn duplicate_threshold(mut self, threshold: usize) -> Self {
        self.options.duplicate_threshold = threshold;
        self
    }

    pub fn abort_on_completion_error(mut self, abort: bool) -> Self {
        self.options.abort_on_completion_error = abort;
        self
    }

    pub fn max_messages(mut self, max_messages: Option<usize>) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn max_observe(mut self, max_observe: Option<usize>) -> Self {
        self.max_observe = max_observe;
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn tool<T: ToolTrait + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    /// Remote server to connect and spawn at build time
    pub fn mcp_server(mut self, server: McpServerConfig) -> Self {
        self.servers.push(server);
        self
    }

    /// Already-constructed remote provider to connect at build time
    pub fn remote(
        mut self,
        name: impl Into<String>,
        provider: Box<dyn RemoteToolProvider>,
        required: bool,
    ) -> Self {
        self.remotes.push(PendingRemote {
            name: name.into(),
            provider,
            required,
        });
        self
    }

    /// Register the termination tool, connect every remote provider and
    /// wrap the agent in a runtime.
    ///
    /// Fails with `DiscoveryConnection` if a required provider is
    /// unreachable; connections already made are closed first.
    pub async fn build(self) -> Result<Runtime<ToolCallAgent<P>>> {
        let mut tools = self.tools;
        if tools.has(crate::tools::terminate::TERMINATE_TOOL_NAME) {
            warn!("Replacing custom 'terminate' tool with the built-in one");
        }
        tools.register(TerminateTool::new());

        let mut memory = Memory::with_max_messages(self.max_messages);
        let system = self
            .system_prompt
            .unwrap_or_else(|| prompt::system_prompt(&self.workspace));
        memory.append(Message::system(system));

        let mut agent = ToolCallAgent::new(self.provider, tools, memory)
            .with_name(self.name)
            .with_sampling(self.max_tokens, self.temperature)
            .with_tool_choice(self.tool_choice)
            .with_next_step_prompt(self.next_step_prompt)
            .with_dispatcher(Dispatcher::new(self.tool_timeout, self.max_observe));
        if let Some(model) = self.model {
            agent = agent.with_model(model);
        }

        for remote in self.remotes {
            agent.set_connect_timeout(None);
            if let Err(e) = agent
                .connect_remote(&remote.name, remote.provider, remote.required)
                .await
            {
                agent.cleanup().await;
                return Err(e);
            }
        }

        for server in &self.servers {
            let provider = match provider_from_config(server) {
                Ok(provider) => provider,
                Err(e) if server.required => {
                    agent.cleanup().await;
                    return Err(AgentError::DiscoveryConnection {
                        server: server.name.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Skipping remote tool provider '{}': {}", server.name, e);
                    continue;
                }
            };

            agent.set_connect_timeout(Some(Duration::from_secs(server.timeout_secs)));
            if let Err(e) = agent
                .connect_remote(&server.name, provider, server.required)
                .await
            {
                agent.cleanup().await;
                return Err(e);
            }
        }

        info!(
            "Agent '{}' ready with {} tool(s): {}",
            agent.name(),
            agent.tools().len(),
            agent.tools().names().join(", ")
        );
        Ok(Runtime::new(agent, self.options))
    }
}
