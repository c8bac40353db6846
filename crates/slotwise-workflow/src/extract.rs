//! The Text-to-Structure capability.
//!
//! [`StructuredExtractor`] turns conversation history into a JSON object
//! shaped by an [`ExtractionSchema`]. It is fallible by contract and must
//! never panic on malformed model output; callers map any
//! [`ExtractionFailure`] to a clarification request.
//!
//! [`LlmExtractor`] is the production implementation over
//! [`slotwise_agent::LlmClient`]; [`ScriptedExtractor`] returns canned
//! answers for tests and demos.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use slotwise_agent::{ChatRequest, LlmClient, Message};
use tracing::{debug, warn};

use crate::state::{Turn, TurnRole};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which structure the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSchema {
    Intent,
    Habit,
    Task,
    Insight,
}

impl fmt::Display for ExtractionSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intent => write!(f, "intent"),
            Self::Habit => write!(f, "habit"),
            Self::Task => write!(f, "task"),
            Self::Insight => write!(f, "insight"),
        }
    }
}

/// Input for one extraction.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub schema: ExtractionSchema,
    pub history: Vec<Turn>,
    /// Anchor for relative phrases ("tomorrow", "due Friday").
    pub now: DateTime<Utc>,
    pub timezone: Tz,
}

/// The capability could not produce a usable structure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{schema} extraction failed: {reason}")]
pub struct ExtractionFailure {
    pub schema: ExtractionSchema,
    pub reason: String,
}

impl ExtractionFailure {
    pub fn new(schema: ExtractionSchema, reason: impl Into<String>) -> Self {
        Self {
            schema,
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Core trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    /// Return a JSON object for `request.schema`, or a failure.
    async fn extract(&self, request: &ExtractionRequest) -> Result<Value, ExtractionFailure>;
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

const INTENT_PROMPT: &str = r#"Classify the user's latest request.

Respond ONLY with a JSON object:
{"intent": "HABIT_SCHEDULE" | "TASK_SCHEDULE" | "CALENDAR_ANALYSIS" | "UNKNOWN"}

- HABIT_SCHEDULE: a recurring activity to fit into the calendar ("daily exercise", "read 3 times a week").
- TASK_SCHEDULE: a one-off piece of work with a deadline ("submit report by Friday").
- CALENDAR_ANALYSIS: a question about the existing calendar ("how busy is my week?").
- UNKNOWN: anything else, or when unsure."#;

const HABIT_PROMPT: &str = r#"Extract the recurring habit the user wants scheduled.

Respond ONLY with a JSON object; use null for anything the user did not say:
{
  "name": "short habit name",
  "duration_minutes": integer | null,
  "frequency": {"times": integer, "per": "day" | "week"} | null,
  "time_of_day": ["morning" | "afternoon" | "evening" | "night"],
  "preferred_time": "HH:MM" | null,
  "excluded_days": ["Mon" | "Tue" | "Wed" | "Thu" | "Fri" | "Sat" | "Sun"],
  "energy": "low" | "medium" | "high" | null,
  "priority": "low" | "medium" | "high" | null,
  "horizon_days": integer | null,
  "min_gap_hours": integer | null
}
"daily" means {"times": 1, "per": "day"}. "next 7 days" means horizon_days 7."#;

const TASK_PROMPT: &str = r#"Extract the one-off task the user wants scheduled.

Respond ONLY with a JSON object; use null for anything the user did not say:
{
  "name": "short task name",
  "duration_minutes": integer | null,
  "deadline": "RFC 3339 timestamp with offset" | null,
  "constraints": ["hard constraints, verbatim"],
  "location": string | null,
  "preferred_time": "HH:MM" | null,
  "priority": "low" | "medium" | "high" | null
}
Resolve relative deadlines ("due Friday") against the current date below. A
deadline given as a day only means the end of that day (23:59) local time."#;

const INSIGHT_PROMPT: &str = r#"The user is asking about their existing calendar.

Respond ONLY with a JSON object:
{
  "start": "YYYY-MM-DD" | null,
  "end": "YYYY-MM-DD (inclusive)" | null,
  "focus": "overview" | "busy" | "free"
}
"my week" means today through six days from today."#;

fn schema_prompt(schema: ExtractionSchema) -> &'static str {
    match schema {
        ExtractionSchema::Intent => INTENT_PROMPT,
        ExtractionSchema::Habit => HABIT_PROMPT,
        ExtractionSchema::Task => TASK_PROMPT,
        ExtractionSchema::Insight => INSIGHT_PROMPT,
    }
}

/// The full system prompt for a request, anchored at "now".
pub fn system_prompt(request: &ExtractionRequest) -> String {
    let local = request.now.with_timezone(&request.timezone);
    format!(
        "{}\n\nCurrent date and time: {} ({}), timezone {}.",
        schema_prompt(request.schema),
        local.format("%Y-%m-%d %H:%M"),
        local.format("%A"),
        request.timezone.name()
    )
}

/// Extract a JSON payload from a model reply, tolerating markdown fences
/// and prose around a single object.
pub fn extract_json_block(text: &str) -> &str {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```json") {
        let json_start = start + 7;
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let json_start = start + 3;
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(open), Some(close)) if open < close => &trimmed[open..=close],
        _ => trimmed,
    }
}

// ---------------------------------------------------------------------------
// LLM-backed extractor
// ---------------------------------------------------------------------------

/// Text-to-Structure over a chat model.
pub struct LlmExtractor {
    llm: Arc<LlmClient>,
    max_tokens: u32,
}

impl LlmExtractor {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self {
            llm,
            max_tokens: 512,
        }
    }

    fn messages(request: &ExtractionRequest) -> Vec<Message> {
        let mut messages = Vec::with_capacity(request.history.len() + 1);
        messages.push(Message::system(system_prompt(request)));
        for turn in &request.history {
            match turn.role {
                TurnRole::User => messages.push(Message::user(&turn.text)),
                TurnRole::Assistant => messages.push(Message::assistant(&turn.text)),
                TurnRole::Tool => {}
            }
        }
        messages
    }
}

#[async_trait]
impl StructuredExtractor for LlmExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Value, ExtractionFailure> {
        let mut chat = ChatRequest::deterministic(Self::messages(request)).with_json_mode();
        chat.max_tokens = Some(self.max_tokens);

        let response = self.llm.chat(&chat).await.map_err(|e| {
            warn!(schema = %request.schema, error = %e, "extraction call failed");
            ExtractionFailure::new(request.schema, format!("model call failed: {e}"))
        })?;

        debug!(
            schema = %request.schema,
            output_tokens = response.usage.output_tokens,
            "extraction response received"
        );

        parse_object(request.schema, &response.text)
    }
}

/// Parse model text into a JSON object.
pub fn parse_object(schema: ExtractionSchema, text: &str) -> Result<Value, ExtractionFailure> {
    let block = extract_json_block(text);
    let value: Value = serde_json::from_str(block)
        .map_err(|e| ExtractionFailure::new(schema, format!("reply is not JSON: {e}")))?;
    if !value.is_object() {
        return Err(ExtractionFailure::new(schema, "reply is not a JSON object"));
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Scripted extractor
// ---------------------------------------------------------------------------

/// Returns a fixed answer per schema and records every call.
#[derive(Default)]
pub struct ScriptedExtractor {
    answers: HashMap<ExtractionSchema, Result<Value, String>>,
    calls: Mutex<Vec<ExtractionSchema>>,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `schema` with `value`.
    pub fn with(mut self, schema: ExtractionSchema, value: Value) -> Self {
        self.answers.insert(schema, Ok(value));
        self
    }

    /// Fail every `schema` extraction.
    pub fn failing(mut self, schema: ExtractionSchema, reason: impl Into<String>) -> Self {
        self.answers.insert(schema, Err(reason.into()));
        self
    }

    /// Schemas requested so far, in order.
    pub fn calls(&self) -> Vec<ExtractionSchema> {
        self.calls
            .lock()
            .map(|c| c.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl StructuredExtractor for ScriptedExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Value, ExtractionFailure> {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(request.schema),
            Err(poisoned) => poisoned.into_inner().push(request.schema),
        }
        match self.answers.get(&request.schema) {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(reason)) => Err(ExtractionFailure::new(request.schema, reason.clone())),
            None => Err(ExtractionFailure::new(request.schema, "no scripted answer")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
