//! ravel command implementations

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use ravel_agent::{AgentBuilder, AgentState};
use ravel_config::{self, Config};
use ravel_provider::OpenAiCompatProvider;

/// Options of `ravel run`
pub struct RunArgs {
    pub config: Option<PathBuf>,
    pub prompt: Option<String>,
    pub max_steps: Option<usize>,
}

async fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().await.context("Failed to load config")?,
    };
    Ok(config)
}

fn provider_for(config: &Config, api_key: String) -> OpenAiCompatProvider {
    let model = Some(config.model()).filter(|m| !m.is_empty());
    OpenAiCompatProvider::new(api_key, config.api_base(), model)
}

/// Write a default config and create the workspace
pub async fn init_command() -> Result<()> {
    println!("◆ Initializing ravel...");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    ravel_config::init().await.context("Failed to initialize config")?;

    println!("Config:    {}", ravel_config::config_path().display());
    println!("Workspace: {}", ravel_config::workspace_path().display());
    println!("\nNext steps:");
    println!("  1. Add your API key to {}", ravel_config::config_path().display());
    println!("     or export OPENAI_API_KEY");
    println!("  2. Run a task: ravel run -p \"List the files in the workspace\"");

    Ok(())
}

/// Run the agent on one request. Returns whether the run finished cleanly.
pub async fn run_command(args: RunArgs) -> Result<bool> {
    let prompt = match args.prompt {
        Some(prompt) => prompt,
        None => {
            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("Failed to read prompt from stdin")?;
            input
        }
    };
    let prompt = prompt.trim();
    if prompt.is_empty() {
        warn!("Empty prompt provided, nothing to do");
        return Ok(true);
    }

    let mut config = load_config(args.config.as_ref()).await?;
    if let Some(max_steps) = args.max_steps {
        config.agent.max_steps = max_steps;
        config.validate().context("Invalid --max-steps")?;
    }
    let api_key = config
        .api_key()
        .context("No API key configured. Set one in ~/.ravel/config.json or OPENAI_API_KEY")?;

    let provider = provider_for(&config, api_key);
    let mut runtime = AgentBuilder::from_config(provider, &config)
        .build()
        .await
        .context("Failed to build agent")?;

    let token = runtime.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            token.cancel();
        }
    });

    info!("Processing request...");
    let result = runtime.run(Some(prompt)).await;
    interrupt.abort();
    runtime.shutdown().await;
    let report = result.context("Agent run failed")?;

    match report.final_answer() {
        Some(answer) => println!("{}", answer),
        None => println!("{}", report.summary()),
    }

    if report.status == AgentState::Error {
        warn!(
            "Run ended in error after {} step(s): {}",
            report.steps,
            report.error.as_deref().unwrap_or("unknown error")
        );
        return Ok(false);
    }
    Ok(true)
}

/// List static and discovered tools, then disconnect
pub async fn tools_command(config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config.as_ref()).await?;
    let provider = provider_for(&config, config.api_key().unwrap_or_default());

    let mut runtime = AgentBuilder::from_config(provider, &config)
        .build()
        .await
        .context("Failed to build agent")?;

    for name in runtime.agent().tools().names() {
        println!("{}", name);
    }
    runtime.shutdown().await;
    Ok(())
}
