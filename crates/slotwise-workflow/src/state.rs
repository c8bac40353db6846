//! The Run State record and the merge-only deltas steps return.
//!
//! One [`RunState`] is threaded through every step of an invocation. Steps
//! never mutate it directly: each returns a [`StateDelta`] naming only the
//! fields it sets, and the engine merges it with [`RunState::apply`]. A
//! `None` in a delta means "leave alone", so a step cannot clear a field it
//! does not own.
//!
//! The whole record (turns included) is serialized when the engine pauses
//! at the approval gate; the caller hands it back to resume.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use slotwise_adapters::{CreatedEvent, RawEvent, TimeWindow};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    Tool,
}

/// One exchange in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
            payload: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

// ---------------------------------------------------------------------------
// Closed decision sets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    HabitSchedule,
    TaskSchedule,
    CalendarAnalysis,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 4] = [
        Intent::HabitSchedule,
        Intent::TaskSchedule,
        Intent::CalendarAnalysis,
        Intent::Unknown,
    ];

    /// Lenient parse of an intent label as a model or caller may write it.
    pub fn from_label(label: &str) -> Option<Self> {
        let norm: String = label
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match norm.as_str() {
            "habitschedule" | "habit" => Some(Self::HabitSchedule),
            "taskschedule" | "task" => Some(Self::TaskSchedule),
            "calendaranalysis" | "analysis" | "insight" | "insights" => {
                Some(Self::CalendarAnalysis)
            }
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Habit and task intents go through planning and approval.
    pub fn is_scheduling(self) -> bool {
        matches!(self, Self::HabitSchedule | Self::TaskSchedule)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    PlanReady,
    NeedsClarification,
    PlanInfeasible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionDecision {
    Execute,
    DryRun,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalState {
    Pending,
    Approved,
    Rejected,
    ChangesRequested,
}

impl ApprovalState {
    pub const ALL: [ApprovalState; 4] = [
        ApprovalState::Pending,
        ApprovalState::Approved,
        ApprovalState::Rejected,
        ApprovalState::ChangesRequested,
    ];
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBand {
    Morning,
    Afternoon,
    Evening,
    Night,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Energy {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Day,
    Week,
}

/// Target occurrences per period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frequency {
    pub times: u32,
    pub per: Period,
}

/// A recurring request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitDefinition {
    pub name: String,
    pub duration_minutes: u32,
    pub frequency: Frequency,
    /// Allowed bands; empty means "derive from energy, else any band".
    #[serde(default)]
    pub time_of_day: Vec<TimeBand>,
    #[serde(default)]
    pub preferred_time: Option<NaiveTime>,
    #[serde(default)]
    pub excluded_days: Vec<Weekday>,
    #[serde(default)]
    pub energy: Option<Energy>,
    #[serde(default)]
    pub priority: Priority,
    pub horizon_days: u32,
    #[serde(default)]
    pub min_gap_hours: Option<u32>,
}

/// A one-off request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    pub duration_minutes: u32,
    pub deadline: DateTime<Utc>,
    /// Hard constraints stated by the user, verbatim.
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub preferred_time: Option<NaiveTime>,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Plan {
    Habit(HabitDefinition),
    Task(TaskDefinition),
}

impl Plan {
    pub fn name(&self) -> &str {
        match self {
            Self::Habit(h) => &h.name,
            Self::Task(t) => &t.name,
        }
    }

    pub fn duration_minutes(&self) -> u32 {
        match self {
            Self::Habit(h) => h.duration_minutes,
            Self::Task(t) => t.duration_minutes,
        }
    }

    pub fn as_habit(&self) -> Option<&HabitDefinition> {
        match self {
            Self::Habit(h) => Some(h),
            Self::Task(_) => None,
        }
    }

    pub fn as_task(&self) -> Option<&TaskDefinition> {
        match self {
            Self::Task(t) => Some(t),
            Self::Habit(_) => None,
        }
    }
}

/// The planner's verdict. A plan exists only in the ready variant, which
/// makes "plan set iff PLAN_READY" hold by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "plan_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanOutcome {
    PlanReady { plan: Plan },
    NeedsClarification { questions: Vec<String> },
    PlanInfeasible { reason: String },
}

impl PlanOutcome {
    pub fn status(&self) -> PlanStatus {
        match self {
            Self::PlanReady { .. } => PlanStatus::PlanReady,
            Self::NeedsClarification { .. } => PlanStatus::NeedsClarification,
            Self::PlanInfeasible { .. } => PlanStatus::PlanInfeasible,
        }
    }

    pub fn infeasible(reason: impl Into<String>) -> Self {
        Self::PlanInfeasible {
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Calendar data and selections
// ---------------------------------------------------------------------------

/// A busy interval aligned to UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub id: String,
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,
}

impl NormalizedEvent {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }
}

/// One proposed occurrence with its stable ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedSlot {
    /// 1-based, stable across revisions.
    pub slot_number: u32,
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
}

impl SelectedSlot {
    pub fn end(&self) -> DateTime<Utc> {
        self.start + chrono::Duration::minutes(i64::from(self.duration_minutes))
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end())
    }
}

/// An event committed for a selected slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedEvent {
    pub slot_number: u32,
    pub event: CreatedEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitFailure {
    pub slot_number: u32,
    pub reason: String,
}

/// What the analysis branch was asked to look at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightRequest {
    pub window: TimeWindow,
    pub focus: InsightFocus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightFocus {
    #[default]
    Overview,
    Busy,
    Free,
}

/// Deterministic summary of a calendar window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightReport {
    pub event_count: usize,
    pub busy_minutes: i64,
    pub busiest_day: Option<chrono::NaiveDate>,
    pub days: Vec<DayLoad>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayLoad {
    pub date: chrono::NaiveDate,
    pub event_count: usize,
    pub busy_minutes: i64,
    /// Free minutes inside the working-day window.
    pub free_minutes: i64,
    pub longest_free_minutes: i64,
}

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

/// The single record threaded through one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Stable across pause/resume of one conversation.
    pub conversation_id: Uuid,
    #[serde(default)]
    pub turns: Vec<Turn>,
    #[serde(default)]
    pub intent: Option<Intent>,
    /// Planner verdict, serialized with a `plan_status` tag.
    #[serde(default)]
    pub planning: Option<PlanOutcome>,
    #[serde(default)]
    pub execution_decision: Option<ExecutionDecision>,
    #[serde(default)]
    pub planning_horizon: Option<TimeWindow>,
    #[serde(default)]
    pub raw_events: Vec<RawEvent>,
    #[serde(default)]
    pub normalized_events: Vec<NormalizedEvent>,
    #[serde(default)]
    pub free_slots: Vec<TimeWindow>,
    #[serde(default)]
    pub filtered_slots: Vec<TimeWindow>,
    #[serde(default)]
    pub selected_slots: Vec<SelectedSlot>,
    /// Remarks from the last selection (e.g. a requested move that found no
    /// candidate), shown with the approval request.
    #[serde(default)]
    pub selection_notes: Vec<String>,
    #[serde(default)]
    pub approval_state: Option<ApprovalState>,
    #[serde(default)]
    pub approval_feedback: Option<String>,
    #[serde(default)]
    pub revision_count: u32,
    #[serde(default)]
    pub created_events: Vec<CommittedEvent>,
    #[serde(default)]
    pub commit_failures: Vec<CommitFailure>,
    #[serde(default)]
    pub insight_request: Option<InsightRequest>,
    #[serde(default)]
    pub insight_report: Option<InsightReport>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            conversation_id: Uuid::now_v7(),
            turns: Vec::new(),
            intent: None,
            planning: None,
            execution_decision: None,
            planning_horizon: None,
            raw_events: Vec::new(),
            normalized_events: Vec::new(),
            free_slots: Vec::new(),
            filtered_slots: Vec::new(),
            selected_slots: Vec::new(),
            selection_notes: Vec::new(),
            approval_state: None,
            approval_feedback: None,
            revision_count: 0,
            created_events: Vec::new(),
            commit_failures: Vec::new(),
            insight_request: None,
            insight_report: None,
        }
    }

    pub fn plan_status(&self) -> Option<PlanStatus> {
        self.planning.as_ref().map(PlanOutcome::status)
    }

    /// The plan, present only when the planner reported `PLAN_READY`.
    pub fn plan(&self) -> Option<&Plan> {
        match &self.planning {
            Some(PlanOutcome::PlanReady { plan }) => Some(plan),
            _ => None,
        }
    }

    /// Text of the most recent user turn.
    pub fn latest_user_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == TurnRole::User)
            .map(|t| t.text.as_str())
    }

    /// Slot numbers that already have a committed event.
    pub fn committed_slot_numbers(&self) -> Vec<u32> {
        self.created_events.iter().map(|c| c.slot_number).collect()
    }

    /// Merge a delta. Only fields the delta sets are touched; turns and
    /// committed events are appended.
    pub fn apply(&mut self, delta: StateDelta) {
        self.turns.extend(delta.append_turns);
        self.created_events.extend(delta.append_created_events);

        if let Some(v) = delta.intent {
            self.intent = Some(v);
        }
        if let Some(v) = delta.planning {
            self.planning = Some(v);
        }
        if let Some(v) = delta.execution_decision {
            self.execution_decision = Some(v);
        }
        if let Some(v) = delta.planning_horizon {
            self.planning_horizon = Some(v);
        }
        if let Some(v) = delta.raw_events {
            self.raw_events = v;
        }
        if let Some(v) = delta.normalized_events {
            self.normalized_events = v;
        }
        if let Some(v) = delta.free_slots {
            self.free_slots = v;
        }
        if let Some(v) = delta.filtered_slots {
            self.filtered_slots = v;
        }
        if let Some(v) = delta.selected_slots {
            self.selected_slots = v;
        }
        if let Some(v) = delta.selection_notes {
            self.selection_notes = v;
        }
        if let Some(v) = delta.approval_state {
            self.approval_state = Some(v);
        }
        if let Some(v) = delta.approval_feedback {
            self.approval_feedback = Some(v);
        }
        if let Some(v) = delta.revision_count {
            self.revision_count = v;
        }
        if let Some(v) = delta.commit_failures {
            self.commit_failures = v;
        }
        if let Some(v) = delta.insight_request {
            self.insight_request = Some(v);
        }
        if let Some(v) = delta.insight_report {
            self.insight_report = Some(v);
        }
    }
}

// ---------------------------------------------------------------------------
// StateDelta
// ---------------------------------------------------------------------------

/// The fields one step sets. Everything left `None` (or empty, for the
/// append lists) is untouched by [`RunState::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub append_turns: Vec<Turn>,
    pub intent: Option<Intent>,
    pub planning: Option<PlanOutcome>,
    pub execution_decision: Option<ExecutionDecision>,
    pub planning_horizon: Option<TimeWindow>,
    pub raw_events: Option<Vec<RawEvent>>,
    pub normalized_events: Option<Vec<NormalizedEvent>>,
    pub free_slots: Option<Vec<TimeWindow>>,
    pub filtered_slots: Option<Vec<TimeWindow>>,
    pub selected_slots: Option<Vec<SelectedSlot>>,
    pub selection_notes: Option<Vec<String>>,
    pub approval_state: Option<ApprovalState>,
    pub approval_feedback: Option<String>,
    pub revision_count: Option<u32>,
    pub append_created_events: Vec<CommittedEvent>,
    pub commit_failures: Option<Vec<CommitFailure>>,
    pub insight_request: Option<InsightRequest>,
    pub insight_report: Option<InsightReport>,
}

impl StateDelta {
    /// A delta that only adds one assistant message.
    pub fn say(text: impl Into<String>) -> Self {
        Self {
            append_turns: vec![Turn::assistant(text)],
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn habit() -> Plan {
        Plan::Habit(HabitDefinition {
            name: "Stretching".into(),
            duration_minutes: 15,
            frequency: Frequency {
                times: 1,
                per: Period::Day,
            },
            time_of_day: vec![TimeBand::Morning],
            preferred_time: None,
            excluded_days: vec![],
            energy: None,
            priority: Priority::Medium,
            horizon_days: 7,
            min_gap_hours: None,
        })
    }

    #[test]
    fn apply_only_touches_set_fields() {
        let mut state = RunState::new();
        state.intent = Some(Intent::HabitSchedule);
        state.free_slots = vec![TimeWindow::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap(),
        )];

        state.apply(StateDelta {
            approval_state: Some(ApprovalState::Pending),
            ..StateDelta::default()
        });

        assert_eq!(state.intent, Some(Intent::HabitSchedule));
        assert_eq!(state.free_slots.len(), 1);
        assert_eq!(state.approval_state, Some(ApprovalState::Pending));
    }

    #[test]
    fn turns_are_appended() {
        let mut state = RunState::new();
        state.apply(StateDelta {
            append_turns: vec![Turn::user("hi")],
            ..StateDelta::default()
        });
        state.apply(StateDelta::say("hello"));
        assert_eq!(state.turns.len(), 2);
        assert_eq!(state.turns[1].role, TurnRole::Assistant);
    }

    #[test]
    fn plan_only_visible_when_ready() {
        let mut state = RunState::new();
        state.planning = Some(PlanOutcome::PlanReady { plan: habit() });
        assert_eq!(state.plan_status(), Some(PlanStatus::PlanReady));
        assert!(state.plan().is_some());

        state.apply(StateDelta {
            planning: Some(PlanOutcome::infeasible("mornings are full")),
            ..StateDelta::default()
        });
        assert_eq!(state.plan_status(), Some(PlanStatus::PlanInfeasible));
        assert!(state.plan().is_none());
    }

    #[test]
    fn serializes_with_wire_labels() {
        let mut state = RunState::new();
        state.intent = Some(Intent::HabitSchedule);
        state.approval_state = Some(ApprovalState::ChangesRequested);
        state.planning = Some(PlanOutcome::PlanReady { plan: habit() });

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["intent"], "HABIT_SCHEDULE");
        assert_eq!(json["approval_state"], "CHANGES_REQUESTED");
        assert_eq!(json["planning"]["plan_status"], "PLAN_READY");
        assert_eq!(json["planning"]["plan"]["kind"], "habit");

        let back: RunState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn intent_labels_are_lenient() {
        assert_eq!(Intent::from_label("TASK_SCHEDULE"), Some(Intent::TaskSchedule));
        assert_eq!(Intent::from_label("habit"), Some(Intent::HabitSchedule));
        assert_eq!(
            Intent::from_label("calendar-analysis"),
            Some(Intent::CalendarAnalysis)
        );
        assert_eq!(Intent::from_label("weather"), None);
    }
}
