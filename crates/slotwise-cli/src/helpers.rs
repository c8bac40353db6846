//! Shared helpers used across subcommands: tracing, engine wiring and the
//! run-state file.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use slotwise_adapters::{CalDavCalendar, CalendarRepository, InMemoryCalendar};
use slotwise_agent::{AppConfig, LlmClient, LoggingSettings};
use slotwise_workflow::{EngineConfig, LlmExtractor, RunState, WorkflowEngine};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber. `RUST_LOG` wins over the configured
/// level. Logs go to stderr so command output stays clean.
pub fn init_tracing(settings: &LoggingSettings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if settings.json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Pick the calendar backend: CalDAV when a URL is configured, otherwise
/// (or when `offline`) a process-local calendar.
pub fn build_calendar(config: &AppConfig, offline: bool) -> Result<Arc<dyn CalendarRepository>> {
    let calendar = &config.calendar;
    match (&calendar.caldav_url, offline) {
        (Some(url), false) => {
            let mut caldav = CalDavCalendar::new(url).context("failed to set up CalDAV")?;
            if let (Some(user), Some(pass)) = (&calendar.username, &calendar.password) {
                caldav = caldav.with_credentials(user, pass);
            }
            info!(url = %url, "using CalDAV calendar");
            Ok(Arc::new(caldav))
        }
        (None, false) => {
            warn!("no CalDAV URL configured, using an in-memory calendar");
            Ok(Arc::new(InMemoryCalendar::new()))
        }
        (_, true) => {
            info!("offline, using an in-memory calendar");
            Ok(Arc::new(InMemoryCalendar::new()))
        }
    }
}

/// Wire the LLM extractor and calendar into a validated engine.
pub fn build_engine(config: &AppConfig, offline: bool) -> Result<WorkflowEngine> {
    let engine_config =
        EngineConfig::from_settings(&config.scheduling, &config.calendar.calendar_id)
            .context("invalid [scheduling] configuration")?;

    let llm_config = config
        .llm
        .client_config()
        .context("invalid [llm] configuration")?;
    let llm = Arc::new(LlmClient::new(llm_config).context("failed to create LLM client")?);
    info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        timezone = engine_config.timezone.name(),
        "LLM client ready"
    );

    let calendar = build_calendar(config, offline)?;
    let engine = WorkflowEngine::new(engine_config, Arc::new(LlmExtractor::new(llm)), calendar)?;
    Ok(engine)
}

// ---------------------------------------------------------------------------
// Run-state file
// ---------------------------------------------------------------------------

/// Read a paused run, if the file exists.
pub fn load_run_state(path: &Path) -> Result<Option<RunState>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let state = serde_json::from_str(&raw)
        .with_context(|| format!("{} does not hold a run state", path.display()))?;
    Ok(Some(state))
}

/// Keep a paused run for the next call, or clear it once the run is over.
pub fn store_run_state(path: &Path, state: &RunState, paused: bool) -> Result<()> {
    if paused {
        let raw = serde_json::to_string_pretty(state)?;
        std::fs::write(path, raw).with_context(|| format!("failed to write {}", path.display()))?;
    } else if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("failed to remove {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_state_file_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        assert!(load_run_state(&path).unwrap().is_none());

        let state = RunState::new();
        store_run_state(&path, &state, true).unwrap();
        let loaded = load_run_state(&path).unwrap().unwrap();
        assert_eq!(loaded.conversation_id, state.conversation_id);

        store_run_state(&path, &state, false).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn garbage_state_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_run_state(&path).is_err());
    }

    #[test]
    fn offline_always_uses_memory() {
        let mut config = AppConfig::default();
        config.calendar.caldav_url = Some("http://localhost:5232/user/cal".into());
        assert_eq!(build_calendar(&config, true).unwrap().backend(), "memory");
        assert_eq!(build_calendar(&config, false).unwrap().backend(), "caldav");
    }
}
