//! Subcommand implementations.

use std::sync::Arc;

use anyhow::{Context, Result};
use slotwise_agent::AppConfig;
use slotwise_web::WebServer;
use slotwise_workflow::{Invocation, InvocationResult};
use tracing::info;

use crate::cli::ChatArgs;
use crate::helpers::{build_engine, load_run_state, store_run_state};

// ---------------------------------------------------------------------------
// serve
// ---------------------------------------------------------------------------

pub async fn cmd_serve(
    mut config: AppConfig,
    bind: Option<String>,
    port: Option<u16>,
    offline: bool,
) -> Result<()> {
    if let Some(bind) = bind {
        config.web.bind_addr = bind;
    }
    if let Some(port) = port {
        config.web.port = port;
    }

    let engine = Arc::new(build_engine(&config, offline)?);
    let server = WebServer::new(config.web.clone(), engine);
    println!("  Slotwise listening on http://{}", server.addr());
    server.start().await.context("web server failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// chat
// ---------------------------------------------------------------------------

pub async fn cmd_chat(config: AppConfig, args: ChatArgs) -> Result<()> {
    let engine = build_engine(&config, args.backend.offline)?;
    let prior = load_run_state(&args.state)?;

    let mut invocation = match prior {
        Some(state) => {
            info!(conversation = %state.conversation_id, "resuming paused run");
            Invocation::resume(state, &args.message)
        }
        None => Invocation::new(&args.message),
    };
    if let Some(decision) = args.decision() {
        invocation = invocation.with_decision(decision);
    }
    if let Some(feedback) = &args.changes {
        invocation = invocation.with_feedback(feedback);
    }
    if let Some(intent) = args.intent {
        invocation = invocation.with_intent_hint(intent.into());
    }

    let result = engine.invoke(invocation).await?;
    store_run_state(&args.state, &result.run_state, result.is_paused)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
        if result.is_paused {
            println!(
                "\n  (run saved to {}; reply with `slotwise chat \"...\"`, --approve, --reject or --changes)",
                args.state.display()
            );
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

pub fn cmd_config(config: &AppConfig) -> Result<()> {
    print!("{}", config.to_redacted_toml()?);
    Ok(())
}

/// Print the assistant's reply, indented like the REPL output.
pub fn print_result(result: &InvocationResult) {
    println!();
    for line in result.assistant_message.lines() {
        println!("  {line}");
    }
}
