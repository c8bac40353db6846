//! The approval gate. Running it marks the run `PENDING` and asks the user;
//! the router then pauses.

use serde_json::json;
use tracing::info;

use super::StepContext;
use crate::error::{Result, WorkflowError};
use crate::state::{ApprovalState, RunState, StateDelta, Turn};
use crate::time::format_span;

pub fn request_approval(ctx: &StepContext<'_>, state: &RunState) -> Result<StateDelta> {
    let plan = state
        .plan()
        .ok_or_else(|| WorkflowError::contract("approval_gate", "reached without a ready plan"))?;
    if state.selected_slots.is_empty() {
        return Err(WorkflowError::contract(
            "approval_gate",
            "reached with no selected slots",
        ));
    }

    let mut text = if state.revision_count > 0 {
        format!("Here is the updated proposal for {}:\n", plan.name())
    } else {
        format!("Here is what I found for {}:\n", plan.name())
    };
    for slot in &state.selected_slots {
        text.push_str(&format!(
            "  {}. {}\n",
            slot.slot_number,
            format_span(ctx.tz(), slot.start, slot.end())
        ));
    }
    for note in &state.selection_notes {
        text.push_str(note);
        text.push('\n');
    }
    text.push_str(
        "Reply \"yes\" to book, \"no\" to cancel, or tell me what to change (for example \"move slot 2 later\").",
    );

    let payload = json!({ "selected_slots": state.selected_slots });

    info!(
        node = "approval_gate",
        slots = state.selected_slots.len(),
        revision = state.revision_count,
        "awaiting approval"
    );
    Ok(StateDelta {
        append_turns: vec![Turn::assistant(text).with_payload(payload)],
        approval_state: Some(ApprovalState::Pending),
        ..StateDelta::default()
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use slotwise_adapters::InMemoryCalendar;

    use super::*;
    use crate::config::EngineConfig;
    use crate::extract::ScriptedExtractor;
    use crate::state::{
        Frequency, HabitDefinition, Period, Plan, PlanOutcome, Priority, SelectedSlot,
    };

    #[test]
    fn lists_slots_by_ordinal_and_pends() {
        let config = EngineConfig::default();
        let extractor = ScriptedExtractor::new();
        let calendar = InMemoryCalendar::new();
        let ctx = StepContext {
            config: &config,
            extractor: &extractor,
            calendar: &calendar,
            now: Utc.with_ymd_and_hms(2026, 3, 2, 5, 0, 0).unwrap(),
            intent_hint: None,
        };

        let mut state = RunState::new();
        state.planning = Some(PlanOutcome::PlanReady {
            plan: Plan::Habit(HabitDefinition {
                name: "Stretching".into(),
                duration_minutes: 15,
                frequency: Frequency {
                    times: 1,
                    per: Period::Day,
                },
                time_of_day: vec![],
                preferred_time: None,
                excluded_days: vec![],
                energy: None,
                priority: Priority::Medium,
                horizon_days: 2,
                min_gap_hours: None,
            }),
        });
        state.selected_slots = vec![
            SelectedSlot {
                slot_number: 1,
                start: Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap(),
                duration_minutes: 15,
            },
            SelectedSlot {
                slot_number: 2,
                start: Utc.with_ymd_and_hms(2026, 3, 3, 6, 0, 0).unwrap(),
                duration_minutes: 15,
            },
        ];

        let delta = request_approval(&ctx, &state).unwrap();
        assert_eq!(delta.approval_state, Some(ApprovalState::Pending));
        let text = &delta.append_turns[0].text;
        assert!(text.contains("1. Mon 2 Mar 06:00-06:15"));
        assert!(text.contains("2. Tue 3 Mar 06:00-06:15"));
        assert!(delta.append_turns[0].payload.is_some());
    }

    #[test]
    fn refuses_without_slots() {
        let config = EngineConfig::default();
        let extractor = ScriptedExtractor::new();
        let calendar = InMemoryCalendar::new();
        let ctx = StepContext {
            config: &config,
            extractor: &extractor,
            calendar: &calendar,
            now: Utc::now(),
            intent_hint: None,
        };
        assert!(request_approval(&ctx, &RunState::new()).is_err());
    }
}
