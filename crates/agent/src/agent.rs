//! Think/act step cycle
//!
//! `Agent` is the steppable capability the runtime drives. `ToolCallAgent`
//! composes it with a provider, a tool registry and a dispatcher.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ravel_provider::{parse_arguments, ChatParams, Message, Provider, ToolCall, ToolChoice};

use crate::dispatcher::{ActOutcome, Dispatcher};
use crate::mcp::{RemoteToolProvider, RemoteTools};
use crate::memory::Memory;
use crate::tools::ToolRegistry;
use crate::{AgentError, Result};

/// Result of one step
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub result: String,
    /// Stop the run after this step
    pub terminate: bool,
}

impl StepOutcome {
    pub fn new(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            terminate: false,
        }
    }

    pub fn terminal(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            terminate: true,
        }
    }
}

/// Something the runtime loop can step
#[async_trait]
pub trait Agent: Send {
    fn name(&self) -> &str;
    fn memory(&self) -> &Memory;
    fn memory_mut(&mut self) -> &mut Memory;

    /// One think/act iteration.
    ///
    /// Returns `Cancelled` once `cancel` fires, after leaving memory
    /// consistent: every tool call already recorded has its result.
    async fn step(&mut self, cancel: &CancellationToken) -> Result<StepOutcome>;

    /// Release connections and tool resources
    async fn cleanup(&mut self);
}

/// Agent that acts through model-selected tool calls
pub struct ToolCallAgent<P: Provider> {
    name: String,
    provider: P,
    model: String,
    max_tokens: u32,
    temperature: f32,
    tool_choice: ToolChoice,
    next_step_prompt: Option<String>,
    memory: Memory,
    tools: ToolRegistry,
    remote: RemoteTools,
    dispatcher: Dispatcher,
    pending: Vec<ToolCall>,
    last_text: Option<String>,
}

impl<P: Provider> ToolCallAgent<P> {
    pub fn new(provider: P, tools: ToolRegistry, memory: Memory) -> Self {
        let model = provider.default_model();
        Self {
            name: "ravel".to_string(),
            provider,
            model,
            max_tokens: 4096,
            temperature: 0.0,
            tool_choice: ToolChoice::Auto,
            next_step_prompt: None,
            memory,
            tools,
            remote: RemoteTools::new(),
            dispatcher: Dispatcher::default(),
            pending: Vec::new(),
            last_text: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    /// Trailing user message for every request; never stored in memory
    pub fn with_next_step_prompt(mut self, prompt: Option<String>) -> Self {
        self.next_step_prompt = prompt.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tool_choice(&self) -> ToolChoice {
        self.tool_choice
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.tools
    }

    pub fn remote(&self) -> &RemoteTools {
        &self.remote
    }

    /// Tool calls selected by the last think, not yet acted on
    pub fn pending_calls(&self) -> &[ToolCall] {
        &self.pending
    }

    pub fn set_connect_timeout(&mut self, timeout: Option<std::time::Duration>) {
        self.remote.set_connect_timeout(timeout);
    }

    /// Discover and register the tools of a remote provider
    pub async fn connect_remote(
        &mut self,
        server: &str,
        provider: Box<dyn RemoteToolProvider>,
        required: bool,
    ) -> Result<usize> {
        self.remote
            .connect_server(server, provider, required, &mut self.tools)
            .await
    }

    pub async fn disconnect_remote(&mut self, server: &str) -> bool {
        self.remote.disconnect_server(server, &mut self.tools).await
    }

    /// Ask the model for the next move.
    ///
    /// The assistant message is appended before deciding whether an action
    /// was chosen. Returns true when tool calls are pending.
    pub async fn think(&mut self, cancel: &CancellationToken) -> Result<bool> {
        let mut messages = self.memory.to_context();
        if let Some(prompt) = &self.next_step_prompt {
            messages.push(Message::user(prompt.clone()));
        }
        let tools = match self.tool_choice {
            ToolChoice::None => Vec::new(),
            _ => self.tools.definitions(),
        };

        let params = ChatParams {
            model: self.model.clone(),
            messages,
            tools,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tool_choice: self.tool_choice,
        };
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            response = self.provider.chat(params) => response,
        };
        if self.memory.consume_note().is_some() {
            debug!("Corrective note consumed");
        }
        let response = response?;

        let content = response.content.filter(|c| !c.is_empty());
        let mut calls = response.tool_calls;
        if self.tool_choice == ToolChoice::None && !calls.is_empty() {
            warn!(
                "Model returned {} tool call(s) with tool choice 'none', ignoring",
                calls.len()
            );
            calls.clear();
        }
        for call in &mut calls {
            call.arguments = parse_arguments(&call.arguments);
        }

        if let Some(text) = &content {
            info!("{}'s thoughts: {}", self.name, text);
        }
        info!("{} selected {} tool(s)", self.name, calls.len());
        if !calls.is_empty() {
            let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
            debug!("Tools being prepared: {:?}", names);
        }

        if content.is_some() || !calls.is_empty() {
            self.memory.append(Message::assistant_with_tool_calls(
                content.clone(),
                calls.clone(),
            ));
        }
        self.last_text = content;
        self.pending = calls;

        let has_action = !self.pending.is_empty();
        if !has_action && self.tool_choice == ToolChoice::Required {
            return Err(AgentError::NoActionChosen);
        }
        Ok(has_action)
    }

    /// Execute the pending tool calls
    pub async fn act(&mut self, cancel: &CancellationToken) -> ActOutcome {
        let calls = std::mem::take(&mut self.pending);
        if calls.is_empty() {
            return ActOutcome {
                result: self.last_text.clone().unwrap_or_default(),
                ..ActOutcome::default()
            };
        }
        self.dispatcher
            .dispatch(&self.tools, &calls, &mut self.memory, cancel)
            .await
    }
}

#[async_trait]
impl<P: Provider> Agent for ToolCallAgent<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn memory(&self) -> &Memory {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    async fn step(&mut self, cancel: &CancellationToken) -> Result<StepOutcome> {
        if !self.think(cancel).await? {
            let text = self
                .last_text
                .clone()
                .unwrap_or_else(|| "Thinking complete - no action needed".to_string());
            return Ok(StepOutcome::new(text));
        }

        let outcome = self.act(cancel).await;
        if outcome.cancelled {
            return Err(AgentError::Cancelled);
        }
        Ok(StepOutcome {
            result: outcome.result,
            terminate: outcome.terminate,
        })
    }

    async fn cleanup(&mut self) {
        info!("Cleaning up agent '{}'", self.name);
        self.remote.disconnect_all(&mut self.tools).await;

        let tools: Vec<_> = self.tools.tools().collect();
        for tool in tools {
            tool.cleanup().await;
        }
        debug!("Cleanup for agent '{}' completed", self.name);
    }
}
