//! Workflow error types.
//!
//! All workflow subsystems surface errors through [`WorkflowError`]. Some
//! variants are recovered inside the engine and only ever appear in logs
//! (`ExtractionFailure`, `InfeasiblePlan`, `CalendarWriteFailure`); the rest
//! abort the invocation and reach the caller.

/// Unified error type for the workflow engine.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    // -- Recovered locally ---------------------------------------------------
    /// The Text-to-Structure capability produced nothing usable.
    #[error(transparent)]
    ExtractionFailure(#[from] crate::extract::ExtractionFailure),

    /// The request cannot be satisfied on this calendar.
    #[error("infeasible plan: {reason}")]
    InfeasiblePlan { reason: String },

    /// One event could not be written.
    #[error("failed to create event for slot {slot_number}: {reason}")]
    CalendarWriteFailure { slot_number: u32, reason: String },

    // -- Surfaced to the caller ----------------------------------------------
    /// Reading the calendar failed; nothing computed from it is trusted.
    #[error("calendar fetch failed: {reason}")]
    CalendarFetchFailure { reason: String, retryable: bool },

    /// A router met a state it has no destination for. This is a defect in
    /// the engine, not a user-facing condition.
    #[error("router contract violation in {router}: {detail}")]
    RouterContractViolation { router: &'static str, detail: String },

    /// The prior run state handed back by the caller cannot be resumed.
    #[error("invalid resume: {reason}")]
    InvalidResume { reason: String },

    /// Engine configuration is unusable.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // -- Generic -------------------------------------------------------------
    /// Catch-all for unexpected internal errors.
    #[error("internal workflow error: {0}")]
    Internal(String),
}

impl WorkflowError {
    /// Whether the caller may retry the same invocation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CalendarFetchFailure { retryable: true, .. })
    }

    pub(crate) fn contract(router: &'static str, detail: impl Into<String>) -> Self {
        Self::RouterContractViolation {
            router,
            detail: detail.into(),
        }
    }
}

/// Convenience alias used throughout the workflow crate.
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_fetch_failures_are_retryable() {
        let fetch = WorkflowError::CalendarFetchFailure {
            reason: "timeout".into(),
            retryable: true,
        };
        assert!(fetch.is_retryable());
        assert!(!WorkflowError::contract("route_by_intent", "no intent").is_retryable());
        assert!(
            !WorkflowError::InvalidResume {
                reason: "x".into()
            }
            .is_retryable()
        );
    }
}
