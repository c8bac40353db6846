//! Habit-only narrowing of free slots to the habit's bands and days.

use chrono::{Datelike, Duration};
use chrono_tz::Tz;
use slotwise_adapters::TimeWindow;
use tracing::info;

use super::StepContext;
use super::planner::habit_bands;
use crate::error::{Result, WorkflowError};
use crate::feedback::Feedback;
use crate::state::{
    ApprovalState, HabitDefinition, Plan, PlanOutcome, RunState, StateDelta,
};
use crate::time::{at_local_hour, local_dates, merge_bands};

pub fn filter_slots(ctx: &StepContext<'_>, state: &RunState) -> Result<StateDelta> {
    let mut habit = state
        .plan()
        .and_then(Plan::as_habit)
        .cloned()
        .ok_or_else(|| WorkflowError::contract("slot_filter", "reached without a habit plan"))?;

    let mut delta = StateDelta::default();

    // Days excluded in a change request become part of the plan.
    if state.approval_state == Some(ApprovalState::ChangesRequested)
        && let Some(text) = &state.approval_feedback
    {
        let mut changed = false;
        for day in Feedback::parse(text).excluded_days {
            if !habit.excluded_days.contains(&day) {
                habit.excluded_days.push(day);
                changed = true;
            }
        }
        if changed {
            delta.planning = Some(PlanOutcome::PlanReady {
                plan: Plan::Habit(habit.clone()),
            });
        }
    }

    let filtered = filter_for_habit(&state.free_slots, &habit, ctx.tz());
    info!(
        node = "slot_filter",
        free = state.free_slots.len(),
        filtered = filtered.len(),
        "slots filtered"
    );

    if filtered.is_empty() {
        delta.planning = Some(PlanOutcome::infeasible(format!(
            "there is no free {} stretch {} in the next {} days.",
            crate::time::format_minutes(i64::from(habit.duration_minutes)),
            describe_bands(&habit),
            habit.horizon_days
        )));
    }
    delta.filtered_slots = Some(filtered);
    Ok(delta)
}

/// Clip free windows to the habit's bands on allowed days, keeping pieces
/// long enough for one session. Output is ordered by start.
pub fn filter_for_habit(free: &[TimeWindow], habit: &HabitDefinition, tz: Tz) -> Vec<TimeWindow> {
    let ranges = merge_bands(&habit_bands(habit));
    let min_len = Duration::minutes(i64::from(habit.duration_minutes));

    let mut out = Vec::new();
    for window in free {
        for date in local_dates(tz, window) {
            if habit.excluded_days.contains(&date.weekday()) {
                continue;
            }
            for (start_hour, end_hour) in &ranges {
                let band = TimeWindow::new(
                    at_local_hour(tz, date, *start_hour),
                    at_local_hour(tz, date, *end_hour),
                );
                if let Some(piece) = window.intersect(&band)
                    && piece.duration() >= min_len
                {
                    out.push(piece);
                }
            }
        }
    }
    out.sort_by_key(|w| w.start);
    out.dedup();
    out
}

fn describe_bands(habit: &HabitDefinition) -> String {
    let bands = habit_bands(habit);
    let mut text = if bands.len() == 4 {
        "at any time of day".to_owned()
    } else {
        let labels: Vec<&str> = bands.iter().map(|b| b.label()).collect();
        format!("in the {}", labels.join(" or "))
    };
    if !habit.excluded_days.is_empty() {
        let days: Vec<String> = habit.excluded_days.iter().map(|d| d.to_string()).collect();
        text.push_str(&format!(" outside {}", days.join(", ")));
    }
    text
}
