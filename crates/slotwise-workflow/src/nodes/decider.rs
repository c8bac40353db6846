//! Execution decision, taken before any calendar I/O.

use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use super::StepContext;
use crate::error::{Result, WorkflowError};
use crate::state::{ExecutionDecision, Plan, RunState, StateDelta};

fn dry_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:just\s+show|only\s+show|don'?t\s+book|do\s+not\s+book|dry[\s-]?run|preview|without\s+booking|just\s+suggest)\b",
        )
        .unwrap()
    })
}

pub fn decide_execution(ctx: &StepContext<'_>, state: &RunState) -> Result<StateDelta> {
    let plan = state.plan().ok_or_else(|| {
        WorkflowError::contract("execution_decider", "reached without a ready plan")
    })?;

    let decision = match plan {
        Plan::Task(task) if task.deadline <= ctx.now => ExecutionDecision::Cancel,
        _ if state
            .latest_user_text()
            .is_some_and(|text| dry_run_re().is_match(text)) =>
        {
            ExecutionDecision::DryRun
        }
        _ => ExecutionDecision::Execute,
    };

    info!(node = "execution_decider", decision = ?decision, "execution decided");
    Ok(StateDelta {
        execution_decision: Some(decision),
        ..StateDelta::default()
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use slotwise_adapters::InMemoryCalendar;

    use super::*;
    use crate::config::EngineConfig;
    use crate::extract::ScriptedExtractor;
    use crate::state::{PlanOutcome, Priority, TaskDefinition, Turn};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 5, 0, 0).unwrap()
    }

    fn decide(deadline: DateTime<Utc>, message: &str) -> Result<StateDelta> {
        let config = EngineConfig::default();
        let extractor = ScriptedExtractor::new();
        let calendar = InMemoryCalendar::new();
        let ctx = StepContext {
            config: &config,
            extractor: &extractor,
            calendar: &calendar,
            now: now(),
            intent_hint: None,
        };
        let mut state = RunState::new();
        state.turns.push(Turn::user(message));
        state.planning = Some(PlanOutcome::PlanReady {
            plan: Plan::Task(TaskDefinition {
                name: "Report".into(),
                duration_minutes: 120,
                deadline,
                constraints: vec![],
                location: None,
                preferred_time: None,
                priority: Priority::Medium,
            }),
        });
        decide_execution(&ctx, &state)
    }

    #[test]
    fn passed_deadline_cancels() {
        let delta = decide(now() - Duration::days(3), "submit report by Friday").unwrap();
        assert_eq!(delta.execution_decision, Some(ExecutionDecision::Cancel));
    }

    #[test]
    fn show_only_is_a_dry_run() {
        let delta = decide(
            now() + Duration::days(2),
            "find time for the report, just show me, don't book it",
        )
        .unwrap();
        assert_eq!(delta.execution_decision, Some(ExecutionDecision::DryRun));
    }

    #[test]
    fn otherwise_execute() {
        let delta = decide(now() + Duration::days(2), "book 2 hours for the report").unwrap();
        assert_eq!(delta.execution_decision, Some(ExecutionDecision::Execute));
    }

    #[test]
    fn requires_a_plan() {
        let config = EngineConfig::default();
        let extractor = ScriptedExtractor::new();
        let calendar = InMemoryCalendar::new();
        let ctx = StepContext {
            config: &config,
            extractor: &extractor,
            calendar: &calendar,
            now: now(),
            intent_hint: None,
        };
        assert!(decide_execution(&ctx, &RunState::new()).is_err());
    }
}
