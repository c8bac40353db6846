//! Mapping workflow errors onto HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use slotwise_workflow::WorkflowError;

/// A failed invocation, rendered as `{ "error", "kind", "retryable" }`.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub WorkflowError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            WorkflowError::InvalidResume { .. } => StatusCode::BAD_REQUEST,
            WorkflowError::InvalidConfig { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match &self.0 {
            WorkflowError::ExtractionFailure(_) => "extraction_failure",
            WorkflowError::InfeasiblePlan { .. } => "infeasible_plan",
            WorkflowError::CalendarWriteFailure { .. } => "calendar_write_failure",
            WorkflowError::CalendarFetchFailure { .. } => "calendar_fetch_failure",
            WorkflowError::RouterContractViolation { .. } => "router_contract_violation",
            WorkflowError::InvalidResume { .. } => "invalid_resume",
            WorkflowError::InvalidConfig { .. } => "invalid_config",
            WorkflowError::Json(_) => "json",
            WorkflowError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": self.0.to_string(),
            "kind": self.kind(),
            "retryable": self.0.is_retryable(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_kind() {
        let fetch = ApiError(WorkflowError::CalendarFetchFailure {
            reason: "timeout".into(),
            retryable: true,
        });
        assert_eq!(fetch.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resume = ApiError(WorkflowError::InvalidResume {
            reason: "not paused".into(),
        });
        assert_eq!(resume.status(), StatusCode::BAD_REQUEST);

        let contract = ApiError(WorkflowError::RouterContractViolation {
            router: "route_by_intent",
            detail: "no intent".into(),
        });
        assert_eq!(contract.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(contract.kind(), "router_contract_violation");
    }
}
