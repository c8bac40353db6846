//! Pure routing functions.
//!
//! Every function here maps the current [`RunState`] to the next [`Route`].
//! There is no I/O and no fallback arm: a state a router has no destination
//! for is a [`WorkflowError::RouterContractViolation`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkflowError};
use crate::state::{
    ApprovalState, ExecutionDecision, Intent, PlanOutcome, PlanStatus, RunState,
};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A workflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    IntentClassifier,
    HabitPlanner,
    TaskAnalyzer,
    InsightManager,
    ExecutionDecider,
    FetchEvents,
    NormalizeEvents,
    ComputeFreeSlots,
    SlotFilter,
    SlotSelector,
    ApprovalGate,
    EventCreation,
    CalendarInsights,
    Summary,
    Explanation,
    Clarification,
    Cancellation,
}

impl Step {
    pub fn name(self) -> &'static str {
        match self {
            Self::IntentClassifier => "intent_classifier",
            Self::HabitPlanner => "habit_planner",
            Self::TaskAnalyzer => "task_analyzer",
            Self::InsightManager => "insight_manager",
            Self::ExecutionDecider => "execution_decider",
            Self::FetchEvents => "fetch_events",
            Self::NormalizeEvents => "normalize_events",
            Self::ComputeFreeSlots => "compute_free_slots",
            Self::SlotFilter => "slot_filter",
            Self::SlotSelector => "slot_selector",
            Self::ApprovalGate => "approval_gate",
            Self::EventCreation => "event_creation",
            Self::CalendarInsights => "calendar_insights",
            Self::Summary => "summary",
            Self::Explanation => "explanation",
            Self::Clarification => "clarification",
            Self::Cancellation => "cancellation",
        }
    }

    /// Nodes that produce the run's final assistant message.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::CalendarInsights
                | Self::Summary
                | Self::Explanation
                | Self::Clarification
                | Self::Cancellation
        )
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where control goes after a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Next(Step),
    /// Stop and hand the run state back; resumed by a later invocation.
    Pause,
    End,
}

// ---------------------------------------------------------------------------
// Routers
// ---------------------------------------------------------------------------

pub fn route_by_intent(state: &RunState) -> Result<Route> {
    let intent = state
        .intent
        .ok_or_else(|| WorkflowError::contract("route_by_intent", "intent is not set"))?;
    Ok(Route::Next(match intent {
        Intent::HabitSchedule => Step::HabitPlanner,
        Intent::TaskSchedule => Step::TaskAnalyzer,
        Intent::CalendarAnalysis => Step::InsightManager,
        Intent::Unknown => Step::Clarification,
    }))
}

pub fn route_by_plan_status(state: &RunState) -> Result<Route> {
    let status = state.plan_status().ok_or_else(|| {
        WorkflowError::contract("route_by_plan_status", "planner left no plan status")
    })?;
    Ok(Route::Next(match status {
        PlanStatus::PlanReady => Step::ExecutionDecider,
        PlanStatus::NeedsClarification => Step::Clarification,
        PlanStatus::PlanInfeasible => Step::Explanation,
    }))
}

pub fn route_by_execution_decision(state: &RunState) -> Result<Route> {
    let decision = state.execution_decision.ok_or_else(|| {
        WorkflowError::contract("route_by_execution_decision", "no execution decision")
    })?;
    Ok(Route::Next(match decision {
        ExecutionDecision::Execute => Step::FetchEvents,
        ExecutionDecision::DryRun => Step::Explanation,
        ExecutionDecision::Cancel => Step::Cancellation,
    }))
}

/// Intent-aware: a change request goes back to the filter for habits and
/// to the selector for tasks. Runs past `max_revisions` end in an
/// explanation.
pub fn route_by_approval_state(state: &RunState, max_revisions: u32) -> Result<Route> {
    const ROUTER: &str = "route_by_approval_state";

    let intent = state
        .intent
        .ok_or_else(|| WorkflowError::contract(ROUTER, "intent is not set"))?;
    let approval = state
        .approval_state
        .ok_or_else(|| WorkflowError::contract(ROUTER, "approval state is not set"))?;

    let revise = |step: Step| {
        if state.revision_count > max_revisions {
            Route::Next(Step::Explanation)
        } else {
            Route::Next(step)
        }
    };

    match (intent, approval) {
        (Intent::HabitSchedule | Intent::TaskSchedule, ApprovalState::Pending) => Ok(Route::Pause),
        (Intent::HabitSchedule | Intent::TaskSchedule, ApprovalState::Approved) => {
            Ok(Route::Next(Step::EventCreation))
        }
        (Intent::HabitSchedule | Intent::TaskSchedule, ApprovalState::Rejected) => {
            Ok(Route::Next(Step::Cancellation))
        }
        (Intent::HabitSchedule, ApprovalState::ChangesRequested) => Ok(revise(Step::SlotFilter)),
        (Intent::TaskSchedule, ApprovalState::ChangesRequested) => Ok(revise(Step::SlotSelector)),
        (Intent::CalendarAnalysis | Intent::Unknown, approval) => Err(WorkflowError::contract(
            ROUTER,
            format!("{intent:?} never reaches approval (state {approval:?})"),
        )),
    }
}

/// Habits go through the filter; tasks skip it.
pub fn route_after_free_slots(state: &RunState) -> Result<Route> {
    match state.intent {
        Some(Intent::HabitSchedule) => Ok(Route::Next(Step::SlotFilter)),
        Some(Intent::TaskSchedule) => Ok(Route::Next(Step::SlotSelector)),
        other => Err(WorkflowError::contract(
            "route_after_free_slots",
            format!("free slots computed for {other:?}"),
        )),
    }
}

/// The successor of `step` given the state after it ran.
pub fn next_step(step: Step, state: &RunState, max_revisions: u32) -> Result<Route> {
    match step {
        Step::IntentClassifier => route_by_intent(state),
        Step::HabitPlanner | Step::TaskAnalyzer => route_by_plan_status(state),
        Step::ExecutionDecider => route_by_execution_decision(state),
        Step::InsightManager => Ok(Route::Next(Step::FetchEvents)),
        Step::FetchEvents => Ok(Route::Next(Step::NormalizeEvents)),
        Step::NormalizeEvents => Ok(Route::Next(match state.intent {
            Some(Intent::CalendarAnalysis) => Step::CalendarInsights,
            _ => Step::ComputeFreeSlots,
        })),
        Step::ComputeFreeSlots => route_after_free_slots(state),
        Step::SlotFilter => Ok(Route::Next(match &state.planning {
            Some(PlanOutcome::PlanReady { .. }) => Step::SlotSelector,
            _ => Step::Explanation,
        })),
        Step::SlotSelector => Ok(Route::Next(if state.selected_slots.is_empty() {
            Step::Explanation
        } else {
            Step::ApprovalGate
        })),
        Step::ApprovalGate => route_by_approval_state(state, max_revisions),
        Step::EventCreation => Ok(Route::Next(Step::Summary)),
        Step::CalendarInsights
        | Step::Summary
        | Step::Explanation
        | Step::Clarification
        | Step::Cancellation => Ok(Route::End),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::state::SelectedSlot;

    fn state(intent: Option<Intent>, approval: Option<ApprovalState>) -> RunState {
        let mut s = RunState::new();
        s.intent = intent;
        s.approval_state = approval;
        s
    }

    #[test]
    fn every_intent_has_a_destination() {
        let expected = [
            (Intent::HabitSchedule, Step::HabitPlanner),
            (Intent::TaskSchedule, Step::TaskAnalyzer),
            (Intent::CalendarAnalysis, Step::InsightManager),
            (Intent::Unknown, Step::Clarification),
        ];
        for (intent, step) in expected {
            assert_eq!(
                route_by_intent(&state(Some(intent), None)).unwrap(),
                Route::Next(step)
            );
        }
        assert!(route_by_intent(&RunState::new()).is_err());
    }

    #[test]
    fn approval_routing_is_exhaustive() {
        for intent in Intent::ALL {
            for approval in ApprovalState::ALL {
                let got = route_by_approval_state(&state(Some(intent), Some(approval)), 5);
                let expected = match (intent, approval) {
                    (Intent::CalendarAnalysis | Intent::Unknown, _) => None,
                    (_, ApprovalState::Pending) => Some(Route::Pause),
                    (_, ApprovalState::Approved) => Some(Route::Next(Step::EventCreation)),
                    (_, ApprovalState::Rejected) => Some(Route::Next(Step::Cancellation)),
                    (Intent::HabitSchedule, ApprovalState::ChangesRequested) => {
                        Some(Route::Next(Step::SlotFilter))
                    }
                    (Intent::TaskSchedule, ApprovalState::ChangesRequested) => {
                        Some(Route::Next(Step::SlotSelector))
                    }
                };
                match expected {
                    Some(route) => assert_eq!(got.unwrap(), route, "{intent:?}/{approval:?}"),
                    None => assert!(
                        matches!(got, Err(WorkflowError::RouterContractViolation { .. })),
                        "{intent:?}/{approval:?} must be a contract violation"
                    ),
                }
            }
        }
    }

    #[test]
    fn approval_routing_requires_both_fields() {
        assert!(route_by_approval_state(&state(None, Some(ApprovalState::Approved)), 5).is_err());
        assert!(route_by_approval_state(&state(Some(Intent::TaskSchedule), None), 5).is_err());
    }

    #[test]
    fn revision_bound_forces_explanation() {
        let mut s = state(Some(Intent::TaskSchedule), Some(ApprovalState::ChangesRequested));
        s.revision_count = 5;
        assert_eq!(
            route_by_approval_state(&s, 5).unwrap(),
            Route::Next(Step::SlotSelector)
        );
        s.revision_count = 6;
        assert_eq!(
            route_by_approval_state(&s, 5).unwrap(),
            Route::Next(Step::Explanation)
        );
    }

    #[test]
    fn plan_status_and_decision_routes() {
        let mut s = RunState::new();
        assert!(route_by_plan_status(&s).is_err());

        s.planning = Some(PlanOutcome::infeasible("no room"));
        assert_eq!(
            route_by_plan_status(&s).unwrap(),
            Route::Next(Step::Explanation)
        );
        s.planning = Some(PlanOutcome::NeedsClarification { questions: vec![] });
        assert_eq!(
            route_by_plan_status(&s).unwrap(),
            Route::Next(Step::Clarification)
        );

        for (decision, step) in [
            (ExecutionDecision::Execute, Step::FetchEvents),
            (ExecutionDecision::DryRun, Step::Explanation),
            (ExecutionDecision::Cancel, Step::Cancellation),
        ] {
            s.execution_decision = Some(decision);
            assert_eq!(route_by_execution_decision(&s).unwrap(), Route::Next(step));
        }
    }

    #[test]
    fn tasks_skip_the_filter() {
        assert_eq!(
            next_step(
                Step::ComputeFreeSlots,
                &state(Some(Intent::TaskSchedule), None),
                5
            )
            .unwrap(),
            Route::Next(Step::SlotSelector)
        );
        assert_eq!(
            next_step(
                Step::ComputeFreeSlots,
                &state(Some(Intent::HabitSchedule), None),
                5
            )
            .unwrap(),
            Route::Next(Step::SlotFilter)
        );
        assert!(
            next_step(
                Step::ComputeFreeSlots,
                &state(Some(Intent::CalendarAnalysis), None),
                5
            )
            .is_err()
        );
    }

    #[test]
    fn analysis_branch_never_computes_slots() {
        let s = state(Some(Intent::CalendarAnalysis), None);
        assert_eq!(
            next_step(Step::NormalizeEvents, &s, 5).unwrap(),
            Route::Next(Step::CalendarInsights)
        );
        assert_eq!(next_step(Step::CalendarInsights, &s, 5).unwrap(), Route::End);
    }

    #[test]
    fn empty_selection_is_explained() {
        let mut s = state(Some(Intent::TaskSchedule), None);
        assert_eq!(
            next_step(Step::SlotSelector, &s, 5).unwrap(),
            Route::Next(Step::Explanation)
        );
        s.selected_slots.push(SelectedSlot {
            slot_number: 1,
            start: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
            duration_minutes: 30,
        });
        assert_eq!(
            next_step(Step::SlotSelector, &s, 5).unwrap(),
            Route::Next(Step::ApprovalGate)
        );
    }

    #[test]
    fn terminals_end() {
        let s = RunState::new();
        for step in [
            Step::Summary,
            Step::Explanation,
            Step::Clarification,
            Step::Cancellation,
            Step::CalendarInsights,
        ] {
            assert!(step.is_terminal());
            assert_eq!(next_step(step, &s, 5).unwrap(), Route::End);
        }
    }
}
