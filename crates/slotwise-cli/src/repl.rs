//! Subcommand: `slotwise repl` -- interactive session.
//!
//! A paused run is held in memory, so the next line is read as the reply to
//! the proposal. `/reset` drops it; `quit` or `exit` leaves.

use std::io::{self, Write as _};

use anyhow::Result;
use slotwise_agent::AppConfig;
use slotwise_workflow::{Invocation, InvocationResult, RunState, WorkflowEngine, WorkflowError};
use tracing::{info, warn};

use crate::commands::print_result;
use crate::helpers::build_engine;

pub async fn cmd_repl(config: AppConfig, offline: bool) -> Result<()> {
    let engine = build_engine(&config, offline)?;
    info!(backend = engine.calendar_backend(), "starting REPL");

    println!("  Slotwise -- describe a habit or task to schedule, or ask about your week.");
    println!("  Type `quit` to leave, `/reset` to drop a pending proposal.\n");

    let stdin = io::stdin();
    let mut line_buf = String::new();
    let mut paused: Option<RunState> = None;

    loop {
        print!("{}", if paused.is_some() { "reply> " } else { "> " });
        io::stdout().flush().ok();

        line_buf.clear();
        match stdin.read_line(&mut line_buf) {
            Ok(0) => {
                println!();
                info!("EOF received, exiting");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("  Error reading input: {e}");
                continue;
            }
        }

        let trimmed = line_buf.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "quit" || trimmed == "exit" {
            break;
        }
        if trimmed == "/reset" {
            paused = None;
            println!("  Pending proposal dropped.\n");
            continue;
        }

        match reply(&engine, &mut paused, trimmed).await {
            Ok(result) => {
                print_result(&result);
                println!();
            }
            Err(e) => {
                warn!(error = %e, "invocation failed");
                eprintln!("  Error: {e}");
                if e.is_retryable() {
                    eprintln!("  (temporary; try again)");
                }
                println!();
            }
        }
    }

    Ok(())
}

/// Send one line, as a reply when a run is paused. The paused run is
/// replaced only on success, so a failed reply can be retried.
async fn reply(
    engine: &WorkflowEngine,
    paused: &mut Option<RunState>,
    text: &str,
) -> Result<InvocationResult, WorkflowError> {
    let invocation = match paused.clone() {
        Some(state) => Invocation::resume(state, text),
        None => Invocation::new(text),
    };
    let result = engine.invoke(invocation).await?;
    *paused = result.is_paused.then(|| result.run_state.clone());
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use slotwise_adapters::InMemoryCalendar;
    use serde_json::json;
    use slotwise_workflow::{EngineConfig, ExtractionSchema, ScriptedExtractor};

    use super::*;

    fn engine() -> WorkflowEngine {
        let extractor = ScriptedExtractor::new()
            .with(ExtractionSchema::Intent, json!({"intent": "UNKNOWN"}));
        WorkflowEngine::new(
            EngineConfig::default(),
            Arc::new(extractor),
            Arc::new(InMemoryCalendar::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn failed_reply_keeps_the_paused_run() {
        let engine = engine();
        // Not waiting for approval, so resuming it is rejected.
        let state = RunState::new();
        let mut paused = Some(state.clone());

        let err = reply(&engine, &mut paused, "yes").await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidResume { .. }));
        assert_eq!(
            paused.map(|s| s.conversation_id),
            Some(state.conversation_id)
        );
    }

    #[tokio::test]
    async fn finished_run_clears_the_paused_slot() {
        let engine = engine();
        let mut paused = None;
        let result = reply(&engine, &mut paused, "hmm").await.unwrap();
        assert!(!result.is_paused);
        assert!(paused.is_none());
    }
}
