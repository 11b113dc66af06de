//! Shared fakes for agent integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use ravel_agent::mcp::{McpError, McpResult};
use ravel_agent::{
    AgentBuilder, RemoteCallResult, RemoteToolInfo, RemoteToolProvider, ToolError, ToolTrait,
};
use ravel_provider::{ChatParams, ChatResponse, Provider, ProviderError, ToolCall};

/// Provider that replays a script of responses and records every request
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ChatResponse, ProviderError>>>,
    repeat: Option<ChatResponse>,
    requests: Mutex<Vec<ChatParams>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ChatResponse, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Return `response` on every call once the script runs out
    pub fn repeating(script: Vec<Result<ChatResponse, ProviderError>>, response: ChatResponse) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            repeat: Some(response),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ChatParams> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse, ProviderError> {
        self.requests.lock().unwrap().push(params);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => self
                .repeat
                .clone()
                .ok_or_else(|| ProviderError::Api("script exhausted".into())),
        }
    }

    fn default_model(&self) -> String {
        "scripted-model".to_string()
    }

    fn is_configured(&self) -> bool {
        true
    }
}

pub fn call(id: &str, name: &str, args: Value) -> ToolCall {
    ToolCall::new(id, name, args)
}

pub fn terminate_call(id: &str) -> ToolCall {
    call(id, "terminate", json!({"status": "success", "final_answer": "all done"}))
}

pub fn tool_response(calls: Vec<ToolCall>) -> Result<ChatResponse, ProviderError> {
    Ok(ChatResponse::with_tool_calls(None, calls))
}

pub fn text_response(text: &str) -> Result<ChatResponse, ProviderError> {
    Ok(ChatResponse::text(text))
}

/// Builder with deterministic prompts and no built-in tools beyond terminate
pub fn builder(provider: Arc<ScriptedProvider>) -> AgentBuilder<Arc<ScriptedProvider>> {
    AgentBuilder::new(provider)
        .system_prompt("test system")
        .next_step_prompt(None)
}

/// Lifecycle counters shared with a `CountingTool`
#[derive(Debug, Clone, Default)]
pub struct Counters {
    pub executions: Arc<AtomicUsize>,
    pub releases: Arc<AtomicUsize>,
    pub cleanups: Arc<AtomicUsize>,
}

impl Counters {
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }
}

/// What a `CountingTool` does when executed
#[derive(Debug, Clone)]
pub enum Behaviour {
    Echo,
    Fail(String),
    Panic,
    Sleep(Duration),
}

/// Test tool with a `text` parameter that counts its lifecycle hooks
pub struct CountingTool {
    name: String,
    behaviour: Behaviour,
    counters: Counters,
}

impl CountingTool {
    pub fn new(name: &str, behaviour: Behaviour) -> (Self, Counters) {
        let counters = Counters::default();
        (
            Self {
                name: name.to_string(),
                behaviour,
                counters: counters.clone(),
            },
            counters,
        )
    }

    pub fn echo(name: &str) -> (Self, Counters) {
        Self::new(name, Behaviour::Echo)
    }
}

#[async_trait]
impl ToolTrait for CountingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Test tool"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        self.counters.executions.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Echo => Ok(args["text"].as_str().unwrap_or_default().to_string()),
            Behaviour::Fail(reason) => Err(ToolError::Failed(reason.clone())),
            Behaviour::Panic => panic!("tool exploded"),
            Behaviour::Sleep(d) => {
                tokio::time::sleep(*d).await;
                Ok("woke up".to_string())
            }
        }
    }

    async fn release(&self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
    }

    async fn cleanup(&self) {
        self.counters.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

/// Remote provider double
#[derive(Clone, Default)]
pub struct FakeRemote {
    pub tools: Vec<RemoteToolInfo>,
    pub fail_connect: bool,
    pub connects: Arc<AtomicUsize>,
    pub disconnects: Arc<AtomicUsize>,
    pub invocations: Arc<Mutex<Vec<(String, Value)>>>,
}

impl FakeRemote {
    pub fn with_tools(names: &[&str]) -> Self {
        Self {
            tools: names
                .iter()
                .map(|n| {
                    RemoteToolInfo::new(
                        *n,
                        format!("Remote {}", n),
                        json!({"type": "object", "properties": {}}),
                    )
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail_connect: true,
            ..Default::default()
        }
    }

    pub fn boxed(&self) -> Box<dyn RemoteToolProvider> {
        Box::new(self.clone())
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteToolProvider for FakeRemote {
    async fn connect(&mut self) -> McpResult<Vec<RemoteToolInfo>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(McpError::Transport("connection refused".into()));
        }
        Ok(self.tools.clone())
    }

    async fn invoke(&self, name: &str, args: Value) -> McpResult<RemoteCallResult> {
        self.invocations
            .lock()
            .unwrap()
            .push((name.to_string(), args.clone()));
        match name {
            "broken" => Ok(RemoteCallResult {
                text: "remote tool failed".into(),
                is_error: true,
            }),
            "offline" => Err(McpError::NotConnected),
            _ => Ok(RemoteCallResult {
                text: format!("remote {} ok", name),
                is_error: false,
            }),
        }
    }

    async fn disconnect(&mut self) -> McpResult<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
