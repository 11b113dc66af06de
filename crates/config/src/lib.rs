//! Configuration for the ravel agent runtime
//!
//! Everything the runtime needs is passed in explicitly at construction
//! time; this crate only loads and saves those parameters.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use ravel_provider::ToolChoice;

pub mod paths;

pub use paths::{config_path, data_dir, workspace_path};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config not found: {0}")]
    NotFound(PathBuf),

    #[error("environment variable {0} not set")]
    MissingEnvVar(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Completion service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.0
}

/// Runtime loop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Truncate tool observations to this many characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_observe: Option<usize>,
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: usize,
    #[serde(default)]
    pub tool_choice: ToolChoice,
    /// Memory cap; the leading system message is never evicted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_messages: Option<usize>,
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub abort_on_completion_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_observe: None,
            duplicate_threshold: default_duplicate_threshold(),
            tool_choice: ToolChoice::Auto,
            max_messages: None,
            tool_timeout_secs: default_tool_timeout(),
            abort_on_completion_error: true,
            system_prompt: None,
            next_step_prompt: None,
        }
    }
}

fn default_max_steps() -> usize {
    20
}

fn default_duplicate_threshold() -> usize {
    2
}

fn default_tool_timeout() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

/// Shell execution tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecToolConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_exec_timeout")]
    pub timeout_secs: u64,
}

impl Default for ExecToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_exec_timeout(),
        }
    }
}

fn default_exec_timeout() -> u64 {
    60
}

/// Human-interaction tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskHumanConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for AskHumanConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Built-in tool configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    #[serde(default)]
    pub exec: ExecToolConfig,
    #[serde(default)]
    pub ask_human: AskHumanConfig,
}

/// How to reach a remote tool provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum McpTransportConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        /// Values support `${VAR}` expansion
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<PathBuf>,
    },
    Http {
        url: String,
    },
}

/// A remote tool provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Unique name, used to namespace the discovered tools
    pub name: String,
    #[serde(flatten)]
    pub transport: McpTransportConfig,
    /// Fail agent construction when this server cannot be reached
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_mcp_timeout")]
    pub timeout_secs: u64,
}

fn default_mcp_timeout() -> u64 {
    30
}

impl McpServerConfig {
    pub fn stdio(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: McpTransportConfig::Stdio {
                command: command.into(),
                args: Vec::new(),
                env: HashMap::new(),
                cwd: None,
            },
            required: false,
            timeout_secs: default_mcp_timeout(),
        }
    }

    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: McpTransportConfig::Http { url: url.into() },
            required: false,
            timeout_secs: default_mcp_timeout(),
        }
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_args(mut self, new_args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        if let McpTransportConfig::Stdio { args, .. } = &mut self.transport {
            args.extend(new_args.into_iter().map(Into::into));
        }
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let McpTransportConfig::Stdio { env, .. } = &mut self.transport {
            env.insert(key.into(), value.into());
        }
        self
    }

    /// Expand `${VAR}` references in stdio environment values
    pub fn expand_env_vars(&mut self) -> Result<()> {
        if let McpTransportConfig::Stdio { env, .. } = &mut self.transport {
            for value in env.values_mut() {
                *value = expand_env_string(value)?;
            }
        }
        Ok(())
    }
}

/// Expand `${VAR}` patterns using the process environment
pub fn expand_env_string(s: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::Invalid(e.to_string()))?;
    let mut result = s.to_string();

    for cap in re.captures_iter(s) {
        let var_name = &cap[1];
        let var_value =
            std::env::var(var_name).map_err(|_| ConfigError::MissingEnvVar(var_name.to_string()))?;
        result = result.replace(&cap[0], &var_value);
    }

    Ok(result)
}

/// Remote tool providers
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub mcp: McpConfig,
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from a specific location; a missing file yields defaults
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        debug!("Loading config from {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to a specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("Writing config to {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Reject values the runtime cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_steps == 0 {
            return Err(ConfigError::Invalid("agent.max_steps must be at least 1".into()));
        }
        if self.agent.duplicate_threshold == 0 {
            return Err(ConfigError::Invalid(
                "agent.duplicate_threshold must be at least 1".into(),
            ));
        }
        if self.agent.max_messages == Some(0) {
            return Err(ConfigError::Invalid("agent.max_messages must be at least 1".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for server in &self.mcp.servers {
            if server.name.trim().is_empty() {
                return Err(ConfigError::Invalid("mcp server name must not be empty".into()));
            }
            if !seen.insert(server.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate mcp server name '{}'",
                    server.name
                )));
            }
        }
        Ok(())
    }

    /// API key from config, falling back to `OPENAI_API_KEY`
    pub fn api_key(&self) -> Option<String> {
        if !self.provider.api_key.is_empty() {
            return Some(self.provider.api_key.clone());
        }
        std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
    }

    pub fn api_base(&self) -> Option<String> {
        self.provider.api_base.clone().filter(|b| !b.is_empty())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    pub fn model(&self) -> String {
        self.provider.model.clone()
    }
}

/// Write a default config and create the workspace
pub async fn init() -> Result<Config> {
    let config_path = config_path();

    if config_path.exists() {
        warn!("Config already exists at {:?}", config_path);
    } else {
        let config = Config::default();
        config.save().await?;
        info!("Wrote default config to {:?}", config_path);
    }

    let workspace = workspace_path();
    tokio::fs::create_dir_all(&workspace).await?;
    info!("Workspace ready at {:?}", workspace);

    Config::load().await
}
