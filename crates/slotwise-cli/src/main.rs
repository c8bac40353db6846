//! CLI entry point for Slotwise.
//!
//! This binary provides the `slotwise` command: an HTTP server, one-shot
//! chat with a file-backed paused run, an interactive REPL, and a config dump.

mod cli;
mod commands;
mod helpers;
mod repl;

use anyhow::{Context, Result};
use clap::Parser;
use slotwise_agent::AppConfig;

use crate::cli::{Cli, Commands};
use crate::helpers::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(Some(cli.config.as_path()))
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve {
            bind,
            port,
            backend,
        } => commands::cmd_serve(config, bind, port, backend.offline).await,
        Commands::Chat(args) => commands::cmd_chat(config, args).await,
        Commands::Repl { backend } => repl::cmd_repl(config, backend.offline).await,
        Commands::Config => commands::cmd_config(&config),
    }
}
