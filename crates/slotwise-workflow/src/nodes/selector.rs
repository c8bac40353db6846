//! Final slot selection for both paths, and revision after a change request.
//!
//! Candidates are start times aligned to the granularity inside the
//! candidate windows. Habits pick `times` occurrences per period (day, or
//! 7-day block from the start of the horizon) with a minimum gap between
//! occurrences; tasks pick one slot on the earliest day that has room.
//! Within a period or day, candidates closest to the preferred time win,
//! then the earliest.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use slotwise_adapters::TimeWindow;
use tracing::{debug, info};

use super::StepContext;
use crate::config::EngineConfig;
use crate::error::{Result, WorkflowError};
use crate::feedback::{Adjustment, Feedback};
use crate::state::{
    ApprovalState, HabitDefinition, Period, Plan, RunState, SelectedSlot, StateDelta,
    TaskDefinition,
};
use crate::time::{
    align_up, at_local_hour, format_day, format_span, local_date, local_time, minutes_apart,
};

pub fn select_slots(ctx: &StepContext<'_>, state: &RunState) -> Result<StateDelta> {
    let plan = state
        .plan()
        .ok_or_else(|| WorkflowError::contract("slot_selector", "reached without a ready plan"))?;
    let horizon = state.planning_horizon.ok_or_else(|| {
        WorkflowError::contract("slot_selector", "reached without a planning horizon")
    })?;

    let selector = Selector::new(ctx.config, plan, horizon);
    let windows = match plan {
        Plan::Habit(_) => &state.filtered_slots,
        Plan::Task(_) => &state.free_slots,
    };
    let candidates = selector.candidates(windows);

    let revising = state.approval_state == Some(ApprovalState::ChangesRequested)
        && !state.selected_slots.is_empty();
    let feedback = state
        .approval_feedback
        .as_deref()
        .map(Feedback::parse)
        .unwrap_or_default();

    let (selected, notes) = if revising && feedback.adjustment.is_some() {
        selector.revise(&candidates, &state.selected_slots, &feedback)
    } else {
        selector.fresh(&candidates)
    };

    info!(
        node = "slot_selector",
        candidates = candidates.len(),
        selected = selected.len(),
        revising,
        "slots selected"
    );
    Ok(StateDelta {
        selected_slots: Some(selected),
        selection_notes: Some(notes),
        ..StateDelta::default()
    })
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Candidate {
    fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }
}

struct Selector<'a> {
    config: &'a EngineConfig,
    plan: &'a Plan,
    horizon: TimeWindow,
    duration: Duration,
}

impl<'a> Selector<'a> {
    fn new(config: &'a EngineConfig, plan: &'a Plan, horizon: TimeWindow) -> Self {
        Self {
            config,
            plan,
            horizon,
            duration: Duration::minutes(i64::from(plan.duration_minutes())),
        }
    }

    fn tz(&self) -> Tz {
        self.config.timezone
    }

    fn preferred(&self) -> Option<NaiveTime> {
        match self.plan {
            Plan::Habit(h) => h.preferred_time,
            Plan::Task(t) => t.preferred_time,
        }
    }

    /// Every aligned start whose session fits its window.
    fn candidates(&self, windows: &[TimeWindow]) -> Vec<Candidate> {
        let step = self.config.granularity;
        let mut out = Vec::new();
        for window in windows {
            let mut start = align_up(window.start, step);
            while start + self.duration <= window.end {
                let candidate = Candidate {
                    start,
                    end: start + self.duration,
                };
                if self.admissible(&candidate) {
                    out.push(candidate);
                }
                start += step;
            }
        }
        out.sort_by_key(|c| c.start);
        out.dedup();
        out
    }

    fn admissible(&self, c: &Candidate) -> bool {
        match self.plan {
            Plan::Habit(_) => true,
            Plan::Task(task) => {
                let date = local_date(self.tz(), c.start);
                c.start >= at_local_hour(self.tz(), date, self.config.day_start_hour)
                    && c.end <= at_local_hour(self.tz(), date, self.config.day_end_hour)
                    && c.end <= task.deadline
            }
        }
    }

    /// Sort key: distance from the preferred time of day, then start.
    fn rank(&self, c: &Candidate) -> (i64, DateTime<Utc>) {
        let distance = self
            .preferred()
            .map(|p| minutes_apart(local_time(self.tz(), c.start), p))
            .unwrap_or(0);
        (distance, c.start)
    }

    fn best<'c>(&self, pool: impl Iterator<Item = &'c Candidate>) -> Option<Candidate> {
        pool.min_by_key(|c| self.rank(c)).copied()
    }

    fn fresh(&self, candidates: &[Candidate]) -> (Vec<SelectedSlot>, Vec<String>) {
        let (picked, notes) = match self.plan {
            Plan::Habit(habit) => self.fresh_habit(habit, candidates),
            Plan::Task(task) => (self.fresh_task(task, candidates), Vec::new()),
        };
        let mut picked = picked;
        picked.sort_by_key(|c| c.start);
        let slots = picked
            .into_iter()
            .enumerate()
            .map(|(i, c)| SelectedSlot {
                slot_number: i as u32 + 1,
                start: c.start,
                duration_minutes: self.plan.duration_minutes(),
            })
            .collect();
        (slots, notes)
    }

    fn fresh_task(&self, _task: &TaskDefinition, candidates: &[Candidate]) -> Vec<Candidate> {
        let Some(first_day) = candidates.first().map(|c| local_date(self.tz(), c.start)) else {
            return Vec::new();
        };
        self.best(
            candidates
                .iter()
                .filter(|c| local_date(self.tz(), c.start) == first_day),
        )
        .into_iter()
        .collect()
    }

    fn fresh_habit(
        &self,
        habit: &HabitDefinition,
        candidates: &[Candidate],
    ) -> (Vec<Candidate>, Vec<String>) {
        let gap = min_gap(habit, self.config);
        let mut chosen: Vec<Candidate> = Vec::new();
        let mut notes = Vec::new();

        for period in 0..self.period_count(habit) {
            let mut in_period = 0;
            for _ in 0..habit.frequency.times {
                let pick = self.best(candidates.iter().filter(|c| {
                    self.period_of(habit, c) == period && fits_with(c, &chosen, gap)
                }));
                match pick {
                    Some(c) => {
                        chosen.push(c);
                        in_period += 1;
                    }
                    None => break,
                }
            }
            if in_period < habit.frequency.times {
                notes.push(format!(
                    "Only found room for {in_period} of {} session(s) {}.",
                    habit.frequency.times,
                    self.period_label(habit, period)
                ));
            }
        }
        debug!(chosen = chosen.len(), gap_hours = gap.num_hours(), "habit selection");
        (chosen, notes)
    }

    // -- Periods ------------------------------------------------------------

    fn first_day(&self) -> NaiveDate {
        local_date(self.tz(), self.horizon.start)
    }

    fn period_of(&self, habit: &HabitDefinition, c: &Candidate) -> i64 {
        let offset = (local_date(self.tz(), c.start) - self.first_day()).num_days();
        match habit.frequency.per {
            Period::Day => offset,
            Period::Week => offset.div_euclid(7),
        }
    }

    fn period_count(&self, habit: &HabitDefinition) -> i64 {
        let days = i64::from(habit.horizon_days.max(1));
        match habit.frequency.per {
            Period::Day => days,
            Period::Week => (days + 6) / 7,
        }
    }

    fn period_label(&self, habit: &HabitDefinition, period: i64) -> String {
        match habit.frequency.per {
            Period::Day => format!("on {}", format_day(self.first_day() + Duration::days(period))),
            Period::Week => format!(
                "in the week from {}",
                format_day(self.first_day() + Duration::days(period * 7))
            ),
        }
    }

    // -- Revision -----------------------------------------------------------

    /// Move the targeted slots as the feedback asks, keeping ordinals. A slot
    /// with no qualifying candidate stays where it was, except on an excluded
    /// day: there it is reselected within its period or dropped.
    fn revise(
        &self,
        candidates: &[Candidate],
        previous: &[SelectedSlot],
        feedback: &Feedback,
    ) -> (Vec<SelectedSlot>, Vec<String>) {
        let excluded: &[chrono::Weekday] = match self.plan {
            Plan::Habit(h) => &h.excluded_days,
            Plan::Task(_) => &[],
        };
        let on_excluded_day = |s: &SelectedSlot| {
            use chrono::Datelike;
            excluded.contains(&local_date(self.tz(), s.start).weekday())
        };
        let gap = match self.plan {
            Plan::Habit(h) => min_gap(h, self.config),
            Plan::Task(_) => Duration::zero(),
        };

        let mut result: Vec<SelectedSlot> = previous.to_vec();
        let mut notes = Vec::new();
        let mut relocated = Vec::new();
        let mut dropped = false;

        let mut index = 0;
        while index < result.len() {
            if !on_excluded_day(&result[index]) {
                index += 1;
                continue;
            }
            let prev = result[index].clone();
            let prev_candidate = Candidate {
                start: prev.start,
                end: prev.end(),
            };
            let others = others(&result, index);
            let pick = self.best(candidates.iter().filter(|c| {
                self.same_period(&prev_candidate, c) && fits_with(c, &others, gap)
            }));
            match pick {
                Some(c) => {
                    result[index].start = c.start;
                    relocated.push(prev.slot_number);
                    index += 1;
                }
                None => {
                    notes.push(format!(
                        "Dropped the session on {} because that day is excluded.",
                        format_span(self.tz(), prev.start, prev.end())
                    ));
                    result.remove(index);
                    dropped = true;
                }
            }
        }

        let targeted: Vec<usize> = result
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                feedback.targets(s.slot_number) && !relocated.contains(&s.slot_number)
            })
            .map(|(i, _)| i)
            .collect();
        let adjustment = feedback.adjustment.unwrap_or(Adjustment::Different);

        for index in targeted {
            let prev = result[index].clone();
            let prev_candidate = Candidate {
                start: prev.start,
                end: prev.end(),
            };
            let others = others(&result, index);

            let pool: Vec<&Candidate> = candidates
                .iter()
                .filter(|c| match adjustment {
                    Adjustment::Earlier => c.start < prev.start,
                    Adjustment::Later => c.start > prev.start,
                    Adjustment::Different => c.start != prev.start,
                })
                .filter(|c| self.same_period(&prev_candidate, c))
                .filter(|c| fits_with(c, &others, gap))
                .collect();

            let pick = match adjustment {
                // Prefer a slot clear of the old one, nearest to it.
                Adjustment::Earlier => pool
                    .iter()
                    .filter(|c| c.end <= prev.start)
                    .max_by_key(|c| c.start)
                    .or_else(|| pool.iter().max_by_key(|c| c.start))
                    .map(|c| **c),
                Adjustment::Later => pool
                    .iter()
                    .filter(|c| c.start >= prev.end())
                    .min_by_key(|c| c.start)
                    .or_else(|| pool.iter().min_by_key(|c| c.start))
                    .map(|c| **c),
                Adjustment::Different => self.best(pool.into_iter()),
            };

            match pick {
                Some(c) => result[index].start = c.start,
                None => notes.push(format!(
                    "I couldn't find {} time for slot {}, so it stays at {}.",
                    match adjustment {
                        Adjustment::Earlier => "an earlier",
                        Adjustment::Later => "a later",
                        Adjustment::Different => "another",
                    },
                    prev.slot_number,
                    format_span(self.tz(), prev.start, prev.end())
                )),
            }
        }

        result.sort_by_key(|s| s.slot_number);
        if dropped {
            for (i, slot) in result.iter_mut().enumerate() {
                slot.slot_number = i as u32 + 1;
            }
        }
        (result, notes)
    }

    /// Habits move within their period; tasks anywhere in the horizon.
    fn same_period(&self, prev: &Candidate, c: &Candidate) -> bool {
        match self.plan {
            Plan::Habit(h) => self.period_of(h, prev) == self.period_of(h, c),
            Plan::Task(_) => true,
        }
    }
}

/// Minimum spacing between the starts of two occurrences.
pub fn min_gap(habit: &HabitDefinition, config: &EngineConfig) -> Duration {
    if let Some(hours) = habit.min_gap_hours.or(config.habit_min_gap_hours) {
        return Duration::hours(i64::from(hours));
    }
    match (habit.frequency.per, habit.frequency.times) {
        (Period::Day, 1) => Duration::hours(12),
        (Period::Week, times) if times <= 7 => Duration::hours(20),
        _ => Duration::minutes(i64::from(habit.duration_minutes)) + Duration::hours(1),
    }
}

/// Every selected slot except the one at `skip`, as candidates.
fn others(slots: &[SelectedSlot], skip: usize) -> Vec<Candidate> {
    slots
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != skip)
        .map(|(_, s)| Candidate {
            start: s.start,
            end: s.end(),
        })
        .collect()
}

fn fits_with(c: &Candidate, chosen: &[Candidate], gap: Duration) -> bool {
    chosen.iter().all(|other| {
        !c.window().overlaps(&other.window()) && (c.start - other.start).abs() >= gap
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
