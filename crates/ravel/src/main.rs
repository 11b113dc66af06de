//! ravel - a tool-calling agent runtime

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{init_command, run_command, tools_command, RunArgs};

/// ravel - drive a tool-calling agent from your terminal
#[derive(Parser)]
#[command(name = "ravel")]
#[command(about = "A tool-calling agent runtime")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Config file (defaults to ~/.ravel/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the workspace
    Init,
    /// Run the agent on one request
    Run {
        /// Request text; read from stdin when absent
        #[arg(short, long)]
        prompt: Option<String>,
        /// Override the configured step bound
        #[arg(long)]
        max_steps: Option<usize>,
    },
    /// List the tools the agent would expose
    Tools,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.config;
    match cli.command {
        Commands::Init => {
            if let Err(e) = init_command().await {
                error!("Init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Commands::Run { prompt, max_steps } => {
            let args = RunArgs {
                config,
                prompt,
                max_steps,
            };
            match run_command(args).await {
                Ok(true) => {}
                Ok(false) => std::process::exit(1),
                Err(e) => {
                    error!("Run failed: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Tools => {
            if let Err(e) = tools_command(config).await {
                error!("Tools failed: {:#}", e);
                std::process::exit(1);
            }
        }
    }
}
