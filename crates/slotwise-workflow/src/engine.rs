//! The workflow engine.
//!
//! One [`WorkflowEngine::invoke`] call runs nodes until the run ends or the
//! approval gate pauses it. Nothing survives between calls: a paused run is
//! returned in full and handed back by the caller to resume.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use slotwise_adapters::CalendarRepository;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{Result, WorkflowError};
use crate::extract::StructuredExtractor;
use crate::feedback::interpret_reply;
use crate::nodes::planner::{HabitPlanner, TaskAnalyzer, run_planner};
use crate::nodes::{
    StepContext, approval, calendar, classifier, commit, decider, filter, insights, reporters,
    selector,
};
use crate::router::{Route, Step, next_step, route_by_approval_state};
use crate::state::{
    ApprovalState, CommittedEvent, Intent, RunState, StateDelta, Turn, TurnRole,
};

/// Upper bound on nodes executed in one invocation.
const MAX_STEPS: usize = 64;

// ---------------------------------------------------------------------------
// Invocation contract
// ---------------------------------------------------------------------------

/// One request into the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Invocation {
    #[serde(default)]
    pub latest_message: String,
    /// Present when resuming a paused run.
    #[serde(default)]
    pub prior_run_state: Option<RunState>,
    /// When resuming without one, the latest message is read as the reply.
    #[serde(default)]
    pub approval_decision: Option<ApprovalState>,
    #[serde(default)]
    pub approval_feedback: Option<String>,
    /// Skip classification and use this intent.
    #[serde(default)]
    pub intent_hint: Option<Intent>,
}

impl Invocation {
    pub fn new(latest_message: impl Into<String>) -> Self {
        Self {
            latest_message: latest_message.into(),
            ..Self::default()
        }
    }

    pub fn resume(prior: RunState, latest_message: impl Into<String>) -> Self {
        Self {
            latest_message: latest_message.into(),
            prior_run_state: Some(prior),
            ..Self::default()
        }
    }

    pub fn with_decision(mut self, decision: ApprovalState) -> Self {
        self.approval_decision = Some(decision);
        self
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.approval_feedback = Some(feedback.into());
        self
    }

    pub fn with_intent_hint(mut self, intent: Intent) -> Self {
        self.intent_hint = Some(intent);
        self
    }
}

/// What one invocation produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationResult {
    pub assistant_message: String,
    #[serde(rename = "updated_run_state")]
    pub run_state: RunState,
    pub is_paused: bool,
    /// Every event committed in this conversation so far.
    pub created_events: Vec<CommittedEvent>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct WorkflowEngine {
    config: EngineConfig,
    extractor: Arc<dyn StructuredExtractor>,
    calendar: Arc<dyn CalendarRepository>,
    clock: Arc<dyn Clock>,
}

impl WorkflowEngine {
    pub fn new(
        config: EngineConfig,
        extractor: Arc<dyn StructuredExtractor>,
        calendar: Arc<dyn CalendarRepository>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            extractor,
            calendar,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn calendar_backend(&self) -> &str {
        self.calendar.backend()
    }

    /// Run until the conversation ends or pauses for approval.
    pub async fn invoke(&self, invocation: Invocation) -> Result<InvocationResult> {
        let ctx = StepContext {
            config: &self.config,
            extractor: self.extractor.as_ref(),
            calendar: self.calendar.as_ref(),
            now: self.clock.now(),
            intent_hint: invocation.intent_hint,
        };

        let (mut state, mut route) = match invocation.prior_run_state.clone() {
            None => {
                if invocation.approval_decision.is_some() {
                    return Err(WorkflowError::InvalidResume {
                        reason: "an approval decision needs the prior run state".into(),
                    });
                }
                let mut state = RunState::new();
                state.turns.push(Turn::user(invocation.latest_message.trim()));
                info!(conversation = %state.conversation_id, "new run");
                (state, Route::Next(Step::IntentClassifier))
            }
            Some(prior) => {
                let state = resume(prior, &invocation)?;
                info!(
                    conversation = %state.conversation_id,
                    decision = ?state.approval_state,
                    revision = state.revision_count,
                    "resuming run"
                );
                let route = route_by_approval_state(&state, self.config.max_revisions)?;
                (state, route)
            }
        };
        let first_new_turn = state.turns.len();

        let mut steps = 0;
        let is_paused = loop {
            let step = match route {
                Route::Next(step) => step,
                Route::Pause => break true,
                Route::End => break false,
            };
            steps += 1;
            if steps > MAX_STEPS {
                return Err(WorkflowError::Internal(format!(
                    "run exceeded {MAX_STEPS} steps at {step}"
                )));
            }

            debug!(step = %step, "running step");
            let delta = self.run_step(step, &ctx, &state).await.inspect_err(|e| {
                warn!(step = %step, error = %e, "step failed");
            })?;
            state.apply(delta);
            route = next_step(step, &state, self.config.max_revisions)?;
        };

        let assistant_message = state.turns[first_new_turn..]
            .iter()
            .rev()
            .find(|t| t.role == TurnRole::Assistant)
            .map(|t| t.text.clone())
            .unwrap_or_default();

        info!(
            conversation = %state.conversation_id,
            steps,
            paused = is_paused,
            created = state.created_events.len(),
            "invocation finished"
        );

        Ok(InvocationResult {
            assistant_message,
            created_events: state.created_events.clone(),
            run_state: state,
            is_paused,
        })
    }

    async fn run_step(
        &self,
        step: Step,
        ctx: &StepContext<'_>,
        state: &RunState,
    ) -> Result<StateDelta> {
        match step {
            Step::IntentClassifier => classifier::classify_intent(ctx, state).await,
            Step::HabitPlanner => run_planner(&HabitPlanner, ctx, state).await,
            Step::TaskAnalyzer => run_planner(&TaskAnalyzer, ctx, state).await,
            Step::InsightManager => insights::plan_insight(ctx, state).await,
            Step::ExecutionDecider => decider::decide_execution(ctx, state),
            Step::FetchEvents => calendar::fetch_events(ctx, state).await,
            Step::NormalizeEvents => calendar::normalize_events(ctx, state),
            Step::ComputeFreeSlots => calendar::compute_free_slots_step(ctx, state),
            Step::SlotFilter => filter::filter_slots(ctx, state),
            Step::SlotSelector => selector::select_slots(ctx, state),
            Step::ApprovalGate => approval::request_approval(ctx, state),
            Step::EventCreation => commit::create_events(ctx, state).await,
            Step::CalendarInsights => insights::report_insights(ctx, state),
            Step::Summary => reporters::summary(ctx, state),
            Step::Explanation => reporters::explanation(ctx, state),
            Step::Clarification => reporters::clarification(ctx, state),
            Step::Cancellation => reporters::cancellation(ctx, state),
        }
    }
}

/// Validate a paused run and apply the caller's decision to it.
fn resume(mut state: RunState, invocation: &Invocation) -> Result<RunState> {
    let invalid = |reason: &str| {
        Err(WorkflowError::InvalidResume {
            reason: reason.to_owned(),
        })
    };

    if state.approval_state != Some(ApprovalState::Pending) {
        return invalid("the run is not waiting for approval");
    }
    if !state.intent.is_some_and(Intent::is_scheduling) {
        return invalid("only habit and task runs can be approved");
    }
    if state.selected_slots.is_empty() {
        return invalid("the run has no proposed slots");
    }
    if invocation.approval_decision == Some(ApprovalState::Pending) {
        return invalid("PENDING is not a decision");
    }

    let message = invocation.latest_message.trim();
    if !message.is_empty() {
        state.turns.push(Turn::user(message));
    }
    let decision = invocation
        .approval_decision
        .unwrap_or_else(|| interpret_reply(message));

    let mut delta = StateDelta {
        approval_state: Some(decision),
        ..StateDelta::default()
    };
    if decision == ApprovalState::ChangesRequested {
        let feedback = invocation
            .approval_feedback
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(message);
        delta.approval_feedback = Some(feedback.to_owned());
        delta.revision_count = Some(state.revision_count + 1);
    }
    state.apply(delta);
    Ok(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use slotwise_adapters::InMemoryCalendar;

    use super::*;
    use crate::clock::FixedClock;
    use crate::extract::{ExtractionSchema, ScriptedExtractor};

    fn engine(extractor: ScriptedExtractor) -> WorkflowEngine {
        WorkflowEngine::new(
            EngineConfig::default(),
            Arc::new(extractor),
            Arc::new(InMemoryCalendar::new()),
        )
        .unwrap()
        .with_clock(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 3, 2, 5, 0, 0).unwrap(),
        )))
    }

    #[tokio::test]
    async fn unknown_intent_asks_for_clarification() {
        let engine = engine(
            ScriptedExtractor::new().with(ExtractionSchema::Intent, json!({"intent": "UNKNOWN"})),
        );
        let result = engine.invoke(Invocation::new("hmm")).await.unwrap();
        assert!(!result.is_paused);
        assert!(result.assistant_message.contains("What would you like to do?"));
        assert_eq!(result.run_state.turns.len(), 2);
    }

    #[tokio::test]
    async fn decision_without_state_is_rejected() {
        let engine = engine(ScriptedExtractor::new());
        let err = engine
            .invoke(Invocation::new("yes").with_decision(ApprovalState::Approved))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidResume { .. }));
    }

    #[tokio::test]
    async fn resume_requires_a_pending_run() {
        let engine = engine(ScriptedExtractor::new());
        let mut done = RunState::new();
        done.intent = Some(Intent::TaskSchedule);
        let err = engine
            .invoke(Invocation::resume(done, "yes"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidResume { .. }));
    }

    #[test]
    fn invalid_config_is_refused() {
        let config = EngineConfig {
            max_revisions: 0,
            ..EngineConfig::default()
        };
        assert!(
            WorkflowEngine::new(
                config,
                Arc::new(ScriptedExtractor::new()),
                Arc::new(InMemoryCalendar::new())
            )
            .is_err()
        );
    }

    #[test]
    fn invocation_deserializes_from_wire_shape() {
        let inv: Invocation = serde_json::from_value(json!({
            "latest_message": "looks good",
            "approval_decision": "APPROVED"
        }))
        .unwrap();
        assert_eq!(inv.approval_decision, Some(ApprovalState::Approved));
        assert!(inv.prior_run_state.is_none());
    }
}
