//! Terminal reporters. Each adds exactly one assistant turn and ends the run.

use serde_json::json;
use tracing::info;

use super::StepContext;
use crate::error::Result;
use crate::state::{
    ApprovalState, ExecutionDecision, Intent, Plan, PlanOutcome, RunState, StateDelta, Turn,
};
use crate::time::{format_minutes, format_span};

/// What was booked and what was not.
pub fn summary(ctx: &StepContext<'_>, state: &RunState) -> Result<StateDelta> {
    let name = state.plan().map(Plan::name).unwrap_or("your plan");
    let total = state.selected_slots.len();
    let booked = state.created_events.len();

    let mut text = if state.commit_failures.is_empty() {
        format!("Booked {booked} session(s) for {name}:\n")
    } else if booked == 0 {
        format!("I couldn't book any of the {total} session(s) for {name}.\n")
    } else {
        format!("Booked {booked} of {total} session(s) for {name}:\n")
    };

    let mut committed = state.created_events.clone();
    committed.sort_by_key(|c| c.slot_number);
    for c in &committed {
        text.push_str(&format!(
            "  {}. {}\n",
            c.slot_number,
            format_span(ctx.tz(), c.event.start, c.event.end)
        ));
    }
    for failure in &state.commit_failures {
        let span = state
            .selected_slots
            .iter()
            .find(|s| s.slot_number == failure.slot_number)
            .map(|s| format_span(ctx.tz(), s.start, s.end()))
            .unwrap_or_default();
        text.push_str(&format!(
            "  Slot {} ({span}) was not booked: {}\n",
            failure.slot_number, failure.reason
        ));
    }

    info!(
        node = "summary",
        booked,
        failed = state.commit_failures.len(),
        "run summarised"
    );
    let payload = json!({
        "created_events": state.created_events,
        "commit_failures": state.commit_failures,
    });
    Ok(StateDelta {
        append_turns: vec![Turn::assistant(text.trim_end()).with_payload(payload)],
        ..StateDelta::default()
    })
}

/// Why nothing was booked: infeasible plan, dry run, exhausted revisions,
/// or no slot to offer.
pub fn explanation(ctx: &StepContext<'_>, state: &RunState) -> Result<StateDelta> {
    let text = if state.approval_state == Some(ApprovalState::ChangesRequested)
        && state.revision_count > ctx.config.max_revisions
    {
        format!(
            "We've been through {} rounds of changes without settling on times, so I've stopped here and booked nothing. Start a new request when you're ready.",
            ctx.config.max_revisions
        )
    } else if let Some(PlanOutcome::PlanInfeasible { reason }) = &state.planning {
        format!("I can't schedule that: {reason}")
    } else if state.execution_decision == Some(ExecutionDecision::DryRun) {
        match state.plan() {
            Some(plan) => format!(
                "Nothing booked, as asked. The plan would be: {}. Say \"book it\" in a new request to schedule it.",
                describe_plan(plan, ctx)
            ),
            None => "Nothing booked, as asked.".to_owned(),
        }
    } else if state.selected_slots.is_empty() {
        match state.plan() {
            Some(plan) => format!(
                "I couldn't find a free {} slot for {} in the time available.",
                format_minutes(i64::from(plan.duration_minutes())),
                plan.name()
            ),
            None => "I couldn't find a free slot in the time available.".to_owned(),
        }
    } else {
        "I stopped without booking anything.".to_owned()
    };

    info!(node = "explanation", "run explained");
    Ok(StateDelta::say(text))
}

/// Ask for what is missing, or for what the user wants at all.
pub fn clarification(_ctx: &StepContext<'_>, state: &RunState) -> Result<StateDelta> {
    let text = match (&state.intent, &state.planning) {
        (_, Some(PlanOutcome::NeedsClarification { questions })) if !questions.is_empty() => {
            let mut text = "I need a bit more detail:".to_owned();
            for q in questions {
                text.push_str("\n  - ");
                text.push_str(q);
            }
            text
        }
        (Some(Intent::Unknown) | None, _) => "I can schedule a recurring habit (\"30 minutes of exercise every evening\"), find time for a task with a deadline (\"2 hours for the report before Friday\"), or tell you how busy your calendar is. What would you like to do?".to_owned(),
        _ => "Could you tell me a bit more about what you'd like to schedule?".to_owned(),
    };

    info!(node = "clarification", "clarification requested");
    Ok(StateDelta::say(text))
}

/// Stopped on purpose: passed deadline or rejected proposal.
pub fn cancellation(ctx: &StepContext<'_>, state: &RunState) -> Result<StateDelta> {
    let text = if state.approval_state == Some(ApprovalState::Rejected) {
        "OK, I won't book anything.".to_owned()
    } else {
        match state.plan() {
            Some(Plan::Task(task)) if state.execution_decision == Some(ExecutionDecision::Cancel) => {
                format!(
                    "The deadline for {} ({}) has already passed, so I haven't scheduled anything.",
                    task.name,
                    task.deadline
                        .with_timezone(&ctx.tz())
                        .format("%a %-d %b %H:%M")
                )
            }
            _ => "Cancelled; nothing was booked.".to_owned(),
        }
    };

    info!(node = "cancellation", "run cancelled");
    Ok(StateDelta::say(text))
}

fn describe_plan(plan: &Plan, ctx: &StepContext<'_>) -> String {
    match plan {
        Plan::Habit(h) => {
            let per = match h.frequency.per {
                crate::state::Period::Day => "day",
                crate::state::Period::Week => "week",
            };
            format!(
                "{}, {} × {} per {per} over the next {} days",
                h.name,
                h.frequency.times,
                format_minutes(i64::from(h.duration_minutes)),
                h.horizon_days
            )
        }
        Plan::Task(t) => format!(
            "{}, {} before {}",
            t.name,
            format_minutes(i64::from(t.duration_minutes)),
            t.deadline.with_timezone(&ctx.tz()).format("%a %-d %b %H:%M")
        ),
    }
}
