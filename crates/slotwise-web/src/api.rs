//! REST API route handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use slotwise_workflow::{Invocation, InvocationResult};

use crate::error::ApiError;
use crate::state::AppState;

/// Attempts for an invocation that fails with a retryable error.
const MAX_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timezone: String,
    pub calendar_backend: String,
    pub calendar_id: String,
    pub max_revisions: u32,
    pub uptime_seconds: u64,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let config = state.engine.config();
    Json(StatusResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timezone: config.timezone.name().to_owned(),
        calendar_backend: state.engine.calendar_backend().to_owned(),
        calendar_id: config.calendar_id.clone(),
        max_revisions: config.max_revisions,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

// ---------------------------------------------------------------------------
// POST /api/chat
// ---------------------------------------------------------------------------

/// Run one invocation. Retryable failures happen before anything is written,
/// so they are retried here with a short backoff before being reported.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(invocation): Json<Invocation>,
) -> Result<Json<InvocationResult>, ApiError> {
    let resuming = invocation.prior_run_state.is_some();
    let mut attempt = 1;
    loop {
        match state.engine.invoke(invocation.clone()).await {
            Ok(result) => {
                tracing::info!(
                    conversation = %result.run_state.conversation_id,
                    resuming,
                    paused = result.is_paused,
                    attempt,
                    "chat request handled"
                );
                return Ok(Json(result));
            }
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                tracing::warn!(attempt, error = %e, "chat request failed, retrying");
                // 100ms, 200ms
                tokio::time::sleep(Duration::from_millis(100 << (attempt - 1))).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(attempt, error = %e, "chat request failed");
                return Err(ApiError(e));
            }
        }
    }
}
