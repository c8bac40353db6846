//! Layered application configuration.
//!
//! Resolution order, later layers winning:
//!
//! 1. Built-in defaults.
//! 2. A config file (`.toml`, or `.json` by extension).
//! 3. A `.env` file in the working directory (loaded into the process
//!    environment via `dotenvy`).
//! 4. Environment variables (`SLOTWISE_*`, `ANTHROPIC_API_KEY`,
//!    `OPENAI_API_KEY`).

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::llm::{LlmClientConfig, LlmProvider};

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Settings for the Text-to-Structure model.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// `anthropic` or `openai` (any OpenAI-compatible endpoint).
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "anthropic".into(),
            model: "claude-sonnet-4-20250514".into(),
            api_key: None,
            base_url: None,
            max_tokens: 1024,
        }
    }
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &redact(self.api_key.as_deref()))
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl LlmSettings {
    /// Build an [`LlmClientConfig`] from these settings.
    ///
    /// Fails when the provider is unknown or no API key is available.
    pub fn client_config(&self) -> Result<LlmClientConfig> {
        let provider = LlmProvider::from_name(&self.provider)?;
        let api_key = self
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AgentError::MissingApiKey {
                provider: provider.name().into(),
            })?;

        let mut config = match provider {
            LlmProvider::Anthropic => LlmClientConfig::anthropic(api_key, &self.model),
            LlmProvider::OpenAI => LlmClientConfig::openai(api_key, &self.model),
        };
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url);
        }
        Ok(config.with_max_tokens(self.max_tokens))
    }
}

/// Where calendar data lives.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarSettings {
    /// CalDAV collection URL. `None` selects the in-memory calendar.
    pub caldav_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Identifier passed to the repository for every call.
    pub calendar_id: String,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            caldav_url: None,
            username: None,
            password: None,
            calendar_id: "primary".into(),
        }
    }
}

impl fmt::Debug for CalendarSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalendarSettings")
            .field("caldav_url", &self.caldav_url)
            .field("username", &self.username)
            .field("password", &redact(self.password.as_deref()))
            .field("calendar_id", &self.calendar_id)
            .finish()
    }
}

/// Scheduling knobs consumed by the workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingSettings {
    /// IANA timezone used as the reference zone for bands and all-day events.
    pub timezone: String,
    pub slot_granularity_minutes: u32,
    /// First hour (inclusive) a task may start.
    pub day_start_hour: u32,
    /// Hour (exclusive) by which a task must end.
    pub day_end_hour: u32,
    pub default_horizon_days: u32,
    pub insight_default_days: u32,
    /// Upper bound on change-request rounds per conversation.
    pub max_revisions: u32,
    /// Minimum gap between habit occurrences when the habit doesn't say.
    pub habit_min_gap_hours: Option<u32>,
}

impl Default for SchedulingSettings {
    fn default() -> Self {
        Self {
            timezone: "UTC".into(),
            slot_granularity_minutes: 15,
            day_start_hour: 7,
            day_end_hour: 22,
            default_horizon_days: 7,
            insight_default_days: 7,
            max_revisions: 5,
            habit_min_gap_hours: None,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSettings {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact human format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

/// The complete, resolved configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSettings,
    pub calendar: CalendarSettings,
    pub scheduling: SchedulingSettings,
    pub web: WebSettings,
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Load configuration from `path` (if it exists) and the environment.
    ///
    /// A missing file is not an error: defaults are used and a warning is
    /// logged. A file that exists but fails to parse is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            debug!(error = %e, "no .env file loaded");
        }

        let mut config = match path {
            Some(p) if p.exists() => Self::from_file(p)?,
            Some(p) => {
                warn!(path = %p.display(), "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a config file, choosing the format by extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| AgentError::ConfigError {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Ok(serde_json::from_str(&raw)?)
        } else {
            Self::from_toml_str(&raw)
        }
    }

    /// Parse TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| AgentError::ConfigError {
            reason: format!("invalid TOML: {e}"),
        })
    }

    /// Overlay environment variables using the supplied lookup.
    ///
    /// Taking a lookup function keeps tests free of process-global state.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SLOTWISE_LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Some(v) = lookup("SLOTWISE_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("SLOTWISE_LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }

        // Provider-specific key first, then the generic override.
        let provider_key = match self.llm.provider.to_ascii_lowercase().as_str() {
            "openai" | "openai-compatible" | "ollama" => lookup("OPENAI_API_KEY"),
            _ => lookup("ANTHROPIC_API_KEY"),
        };
        if let Some(v) = lookup("SLOTWISE_LLM_API_KEY").or(provider_key) {
            self.llm.api_key = Some(v);
        }

        if let Some(v) = lookup("SLOTWISE_CALDAV_URL") {
            self.calendar.caldav_url = Some(v);
        }
        if let Some(v) = lookup("SLOTWISE_CALDAV_USERNAME") {
            self.calendar.username = Some(v);
        }
        if let Some(v) = lookup("SLOTWISE_CALDAV_PASSWORD") {
            self.calendar.password = Some(v);
        }
        if let Some(v) = lookup("SLOTWISE_CALENDAR_ID") {
            self.calendar.calendar_id = v;
        }

        if let Some(v) = lookup("SLOTWISE_TIMEZONE") {
            self.scheduling.timezone = v;
        }
        if let Some(v) = parse_env(&lookup, "SLOTWISE_MAX_REVISIONS") {
            self.scheduling.max_revisions = v;
        }

        if let Some(v) = lookup("SLOTWISE_BIND_ADDR") {
            self.web.bind_addr = v;
        }
        if let Some(v) = parse_env(&lookup, "SLOTWISE_PORT") {
            self.web.port = v;
        }

        if let Some(v) = lookup("SLOTWISE_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = parse_env(&lookup, "SLOTWISE_LOG_JSON") {
            self.logging.json = v;
        }
    }

    /// Render the configuration as TOML with secrets replaced.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        shown.llm.api_key = shown.llm.api_key.as_deref().map(mask);
        shown.calendar.password = shown.calendar.password.as_deref().map(mask);
        toml::to_string_pretty(&shown).map_err(|e| AgentError::ConfigError {
            reason: format!("failed to render config: {e}"),
        })
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}

fn mask(_secret: &str) -> String {
    "********".into()
}

fn redact(secret: Option<&str>) -> Option<&'static str> {
    secret.map(|_| "********")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
