//! The Slotwise scheduling workflow engine.
//!
//! This crate provides:
//!
//! - **Run state**: the single record threaded through a run, and the
//!   merge-only [`StateDelta`] each node returns ([`state`]).
//! - **Routing**: pure functions from state to the next node ([`router`]).
//! - **Nodes**: intent classification, the habit/task planner pair,
//!   execution decision, the calendar pipeline, slot filtering and
//!   selection, the approval gate, event creation, the analysis branch and
//!   the terminal reporters ([`nodes`]).
//! - **Engine**: [`WorkflowEngine::invoke`], which runs nodes until the run
//!   ends or pauses for approval.
//!
//! The engine depends on two ports: [`StructuredExtractor`] (text to JSON)
//! and [`slotwise_adapters::CalendarRepository`].

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod feedback;
pub mod nodes;
pub mod router;
pub mod state;
pub mod time;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{EngineConfig, MAX_HORIZON_DAYS};
pub use engine::{Invocation, InvocationResult, WorkflowEngine};
pub use error::{Result, WorkflowError};
pub use extract::{
    ExtractionFailure, ExtractionRequest, ExtractionSchema, LlmExtractor, ScriptedExtractor,
    StructuredExtractor,
};
pub use feedback::{Adjustment, Feedback, interpret_reply};
pub use nodes::calendar::compute_free_slots;
pub use router::{Route, Step};
pub use state::{
    ApprovalState, CommitFailure, CommittedEvent, ExecutionDecision, Intent, Plan, PlanOutcome,
    PlanStatus, RunState, SelectedSlot, StateDelta, Turn, TurnRole,
};
