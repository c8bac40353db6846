//! Event creation. One `create_event` per uncommitted slot; successes are
//! kept even when later slots fail.

use slotwise_adapters::NewEvent;
use tracing::{info, warn};

use super::StepContext;
use crate::error::{Result, WorkflowError};
use crate::state::{CommitFailure, CommittedEvent, Period, Plan, RunState, StateDelta};

pub async fn create_events(ctx: &StepContext<'_>, state: &RunState) -> Result<StateDelta> {
    let plan = state
        .plan()
        .ok_or_else(|| WorkflowError::contract("event_creation", "reached without a ready plan"))?;
    let committed = state.committed_slot_numbers();

    let (description, location) = match plan {
        Plan::Habit(h) => {
            let per = match h.frequency.per {
                Period::Day => "day",
                Period::Week => "week",
            };
            (
                format!(
                    "{} × {} min per {per}, scheduled by Slotwise",
                    h.frequency.times, h.duration_minutes
                ),
                None,
            )
        }
        Plan::Task(t) => {
            let mut text = format!("Due {}, scheduled by Slotwise", t.deadline.to_rfc3339());
            if !t.constraints.is_empty() {
                text.push_str(&format!("\nConstraints: {}", t.constraints.join("; ")));
            }
            (text, t.location.clone())
        }
    };

    let mut created = Vec::new();
    let mut failures = Vec::new();
    for slot in &state.selected_slots {
        if committed.contains(&slot.slot_number) {
            info!(node = "event_creation", slot = slot.slot_number, "already committed");
            continue;
        }

        let event = NewEvent {
            summary: plan.name().to_owned(),
            start: slot.start,
            end: slot.end(),
            description: Some(description.clone()),
            location: location.clone(),
        };
        match ctx.calendar.create_event(&ctx.config.calendar_id, &event).await {
            Ok(event) => {
                info!(
                    node = "event_creation",
                    slot = slot.slot_number,
                    id = %event.id,
                    "event created"
                );
                created.push(CommittedEvent {
                    slot_number: slot.slot_number,
                    event,
                });
            }
            Err(e) => {
                let failure = WorkflowError::CalendarWriteFailure {
                    slot_number: slot.slot_number,
                    reason: e.to_string(),
                };
                warn!(node = "event_creation", error = %failure, "event creation failed");
                failures.push(CommitFailure {
                    slot_number: slot.slot_number,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(StateDelta {
        append_created_events: created,
        commit_failures: Some(failures),
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
    use crate::state::{PlanOutcome, Priority, SelectedSlot, TaskDefinition};

    fn state() -> RunState {
        let mut state = RunState::new();
        state.planning = Some(PlanOutcome::PlanReady {
            plan: Plan::Task(TaskDefinition {
                name: "Report".into(),
                duration_minutes: 60,
                deadline: Utc.with_ymd_and_hms(2026, 3, 6, 17, 0, 0).unwrap(),
                constraints: vec!["quiet room".into()],
                location: Some("Office".into()),
                preferred_time: None,
                priority: Priority::High,
            }),
        });
        state.selected_slots = (1..=3)
            .map(|n| SelectedSlot {
                slot_number: n,
                start: Utc.with_ymd_and_hms(2026, 3, 2 + n, 9, 0, 0).unwrap(),
                duration_minutes: 60,
            })
            .collect();
        state
    }

    async fn commit(calendar: &InMemoryCalendar, state: &RunState) -> StateDelta {
        let config = EngineConfig::default();
        let extractor = ScriptedExtractor::new();
        let ctx = StepContext {
            config: &config,
            extractor: &extractor,
            calendar,
            now: Utc.with_ymd_and_hms(2026, 3, 2, 5, 0, 0).unwrap(),
            intent_hint: None,
        };
        create_events(&ctx, state).await.unwrap()
    }

    #[tokio::test]
    async fn partial_failure_keeps_successes() {
        let calendar = InMemoryCalendar::new();
        calendar.fail_create_attempts([2]);
        let delta = commit(&calendar, &state()).await;

        assert_eq!(calendar.create_calls(), 3);
        let numbers: Vec<u32> = delta.append_created_events.iter().map(|c| c.slot_number).collect();
        assert_eq!(numbers, vec![1, 3]);
        let failures = delta.commit_failures.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].slot_number, 2);
        assert_eq!(calendar.created()[0].summary, "Report");
    }

    #[tokio::test]
    async fn second_commit_creates_nothing() {
        let calendar = InMemoryCalendar::new();
        let mut state = state();
        let first = commit(&calendar, &state).await;
        state.apply(first);
        assert_eq!(state.created_events.len(), 3);

        let second = commit(&calendar, &state).await;
        assert!(second.append_created_events.is_empty());
        assert_eq!(calendar.create_calls(), 3);
    }
}
