//! The planner pair: one contract, two extraction schemas.
//!
//! [`HabitPlanner`] and [`TaskAnalyzer`] only differ in what they extract
//! and what they require. Both report through [`PlanOutcome`]; path
//! divergence after planning (filter or no filter) belongs to the router.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde_json::Value;
use slotwise_adapters::TimeWindow;
use tracing::{info, warn};

use super::{StepContext, value_str, value_strings, value_time, value_u32};
use crate::config::MAX_HORIZON_DAYS;
use crate::error::{Result, WorkflowError};
use crate::extract::ExtractionSchema;
use crate::state::{
    Energy, Frequency, HabitDefinition, Period, Plan, PlanOutcome, Priority, RunState,
    StateDelta, TaskDefinition, TimeBand,
};
use crate::time::{format_minutes, local_date, local_midnight, local_to_utc, merge_bands};

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// What a planner made of one extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Drafted {
    pub outcome: PlanOutcome,
    /// Set only for ready plans.
    pub horizon: Option<TimeWindow>,
}

impl Drafted {
    fn clarify(questions: Vec<String>) -> Self {
        Self {
            outcome: PlanOutcome::NeedsClarification { questions },
            horizon: None,
        }
    }

    fn infeasible(reason: impl Into<String>) -> Self {
        Self {
            outcome: PlanOutcome::infeasible(reason),
            horizon: None,
        }
    }
}

pub trait Planner: Send + Sync {
    fn name(&self) -> &'static str;

    fn schema(&self) -> ExtractionSchema;

    /// Asked when extraction produced nothing usable.
    fn fallback_question(&self) -> &'static str;

    /// Turn an extracted JSON object into a verdict.
    fn interpret(&self, draft: &Value, ctx: &StepContext<'_>) -> Drafted;
}

/// Run one planner against the conversation so far.
pub async fn run_planner(
    planner: &dyn Planner,
    ctx: &StepContext<'_>,
    state: &RunState,
) -> Result<StateDelta> {
    let request = ctx.extraction_request(planner.schema(), state);
    let drafted = match ctx.extractor.extract(&request).await {
        Ok(value) => planner.interpret(&value, ctx),
        Err(e) => {
            warn!(node = planner.name(), error = %e, "plan extraction failed");
            Drafted::clarify(vec![planner.fallback_question().to_owned()])
        }
    };

    info!(
        node = planner.name(),
        status = ?drafted.outcome.status(),
        "planning finished"
    );

    Ok(StateDelta {
        planning: Some(drafted.outcome),
        planning_horizon: drafted.horizon,
        ..StateDelta::default()
    })
}

// ---------------------------------------------------------------------------
// Habits
// ---------------------------------------------------------------------------

pub struct HabitPlanner;

impl Planner for HabitPlanner {
    fn name(&self) -> &'static str {
        "habit_planner"
    }

    fn schema(&self) -> ExtractionSchema {
        ExtractionSchema::Habit
    }

    fn fallback_question(&self) -> &'static str {
        "Which habit should I schedule, how long is each session, and how often should it happen?"
    }

    fn interpret(&self, draft: &Value, ctx: &StepContext<'_>) -> Drafted {
        let duration = value_u32(&draft["duration_minutes"]);
        let frequency = parse_frequency(&draft["frequency"]);

        let mut questions = Vec::new();
        if duration.is_none() {
            questions.push("How long should each session be?".to_owned());
        }
        if frequency.is_none() {
            questions.push("How often should it happen (for example daily, or 3 times a week)?".to_owned());
        }
        let (Some(duration_minutes), Some(frequency)) = (duration, frequency) else {
            return Drafted::clarify(questions);
        };

        let horizon_days = value_u32(&draft["horizon_days"])
            .unwrap_or(ctx.config.default_horizon_days)
            .min(MAX_HORIZON_DAYS);

        let habit = HabitDefinition {
            name: value_str(&draft["name"]).unwrap_or("Habit").to_owned(),
            duration_minutes,
            frequency,
            time_of_day: parse_bands(&draft["time_of_day"]),
            preferred_time: value_time(&draft["preferred_time"]),
            excluded_days: parse_weekdays(&draft["excluded_days"]),
            energy: value_str(&draft["energy"]).and_then(parse_energy),
            priority: value_str(&draft["priority"])
                .and_then(parse_priority)
                .unwrap_or_default(),
            horizon_days,
            min_gap_hours: value_u32(&draft["min_gap_hours"]),
        };

        if let Err(err) = habit_capacity_check(&habit) {
            info!(node = "planner", error = %err, "habit rejected before fetching");
            return Drafted::infeasible(match err {
                WorkflowError::InfeasiblePlan { reason } => reason,
                other => other.to_string(),
            });
        }

        let today = local_date(ctx.tz(), ctx.now);
        let end_date = today + Duration::days(i64::from(habit.horizon_days));
        let horizon = TimeWindow::new(ctx.now, local_midnight(ctx.tz(), end_date));

        Drafted {
            outcome: PlanOutcome::PlanReady {
                plan: Plan::Habit(habit),
            },
            horizon: Some(horizon),
        }
    }
}

/// The bands a habit may use: explicit ones, else those implied by its
/// energy level, else the whole day.
pub fn habit_bands(habit: &HabitDefinition) -> Vec<TimeBand> {
    if !habit.time_of_day.is_empty() {
        habit.time_of_day.clone()
    } else if let Some(energy) = habit.energy {
        energy.bands()
    } else {
        vec![
            TimeBand::Morning,
            TimeBand::Afternoon,
            TimeBand::Evening,
            TimeBand::Night,
        ]
    }
}

/// Reject habits no calendar could hold, before any I/O.
fn habit_capacity_check(habit: &HabitDefinition) -> Result<()> {
    let infeasible = |reason: String| -> Result<()> {
        Err(WorkflowError::InfeasiblePlan { reason })
    };

    let allowed_days = 7 - habit.excluded_days.len().min(7) as u64;
    if allowed_days == 0 {
        return infeasible(
            "every day of the week is excluded, so there is nowhere to put it.".into(),
        );
    }

    let ranges = merge_bands(&habit_bands(habit));
    let longest = ranges.iter().map(|(s, e)| (e - s) * 60).max().unwrap_or(0);
    let daily = ranges
        .iter()
        .map(|(s, e)| u64::from((e - s) * 60))
        .sum::<u64>();
    let duration = habit.duration_minutes;

    if duration > longest {
        return infeasible(format!(
            "a {} session does not fit in the chosen time of day (the longest window is {}).",
            format_minutes(i64::from(duration)),
            format_minutes(i64::from(longest))
        ));
    }

    // u32 × u32 always fits in u64.
    let needed = u64::from(habit.frequency.times) * u64::from(duration);
    let (capacity, period) = match habit.frequency.per {
        Period::Day => (daily, "day"),
        Period::Week => (daily * allowed_days, "week"),
    };
    if needed > capacity {
        return infeasible(format!(
            "{} × {} per {period} needs {}, but only {} per {period} is available in the chosen time of day.",
            habit.frequency.times,
            format_minutes(i64::from(duration)),
            format_minutes(i64::try_from(needed).unwrap_or(i64::MAX)),
            format_minutes(i64::try_from(capacity).unwrap_or(i64::MAX))
        ));
    }
    Ok(())
}

fn parse_frequency(value: &Value) -> Option<Frequency> {
    if let Some(label) = value_str(value) {
        return match label.to_ascii_lowercase().as_str() {
            "daily" | "every day" | "day" => Some(Frequency {
                times: 1,
                per: Period::Day,
            }),
            "weekly" | "every week" | "week" => Some(Frequency {
                times: 1,
                per: Period::Week,
            }),
            _ => None,
        };
    }
    let times = value_u32(&value["times"])?;
    let per = match value_str(&value["per"])?.to_ascii_lowercase().as_str() {
        "day" | "daily" => Period::Day,
        "week" | "weekly" => Period::Week,
        _ => return None,
    };
    Some(Frequency { times, per })
}

fn parse_bands(value: &Value) -> Vec<TimeBand> {
    let mut bands: Vec<TimeBand> = value_strings(value)
        .into_iter()
        .filter_map(TimeBand::from_label)
        .collect();
    bands.sort();
    bands.dedup();
    bands
}

fn parse_weekdays(value: &Value) -> Vec<Weekday> {
    let mut days = Vec::new();
    for label in value_strings(value) {
        if let Ok(day) = label.parse::<Weekday>()
            && !days.contains(&day)
        {
            days.push(day);
        }
    }
    days
}

fn parse_energy(label: &str) -> Option<Energy> {
    match label.to_ascii_lowercase().as_str() {
        "low" => Some(Energy::Low),
        "medium" | "moderate" => Some(Energy::Medium),
        "high" => Some(Energy::High),
        _ => None,
    }
}

fn parse_priority(label: &str) -> Option<Priority> {
    match label.to_ascii_lowercase().as_str() {
        "low" => Some(Priority::Low),
        "medium" | "normal" => Some(Priority::Medium),
        "high" | "urgent" => Some(Priority::High),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

pub struct TaskAnalyzer;

impl Planner for TaskAnalyzer {
    fn name(&self) -> &'static str {
        "task_analyzer"
    }

    fn schema(&self) -> ExtractionSchema {
        ExtractionSchema::Task
    }

    fn fallback_question(&self) -> &'static str {
        "Which task should I schedule, how long will it take, and when is it due?"
    }

    fn interpret(&self, draft: &Value, ctx: &StepContext<'_>) -> Drafted {
        let duration = value_u32(&draft["duration_minutes"]);
        let deadline = value_str(&draft["deadline"]).and_then(|s| parse_deadline(s, ctx));

        let mut questions = Vec::new();
        if duration.is_none() {
            questions.push("How long will the task take?".to_owned());
        }
        if deadline.is_none() {
            questions.push("When is it due?".to_owned());
        }
        let (Some(duration_minutes), Some(deadline)) = (duration, deadline) else {
            return Drafted::clarify(questions);
        };

        let day_minutes = (ctx.config.day_end_hour - ctx.config.day_start_hour) * 60;
        if duration_minutes > day_minutes {
            return Drafted::infeasible(format!(
                "{} is longer than the {}:00-{}:00 working day, so it cannot be booked as one block.",
                format_minutes(i64::from(duration_minutes)),
                ctx.config.day_start_hour,
                ctx.config.day_end_hour
            ));
        }

        // A past deadline still yields a plan; the decider cancels it.
        let horizon = (deadline > ctx.now).then(|| {
            let cap = ctx.now + Duration::days(i64::from(MAX_HORIZON_DAYS));
            TimeWindow::new(ctx.now, deadline.min(cap))
        });
        if let Some(window) = &horizon
            && window.duration() < Duration::minutes(i64::from(duration_minutes))
        {
            return Drafted::infeasible(format!(
                "there is less than {} left before the deadline.",
                format_minutes(i64::from(duration_minutes))
            ));
        }

        let task = TaskDefinition {
            name: value_str(&draft["name"]).unwrap_or("Task").to_owned(),
            duration_minutes,
            deadline,
            constraints: value_strings(&draft["constraints"])
                .into_iter()
                .map(str::to_owned)
                .collect(),
            location: value_str(&draft["location"]).map(str::to_owned),
            preferred_time: value_time(&draft["preferred_time"]),
            priority: value_str(&draft["priority"])
                .and_then(parse_priority)
                .unwrap_or_default(),
        };

        Drafted {
            outcome: PlanOutcome::PlanReady {
                plan: Plan::Task(task),
            },
            horizon,
        }
    }
}

/// RFC 3339, a local date-time, or a bare date (end of that day).
fn parse_deadline(text: &str, ctx: &StepContext<'_>) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(local) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(local_to_utc(ctx.tz(), local));
        }
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 0)?;
    Some(local_to_utc(ctx.tz(), date.and_time(end_of_day)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
