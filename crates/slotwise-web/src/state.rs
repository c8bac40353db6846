//! Shared application state for the web server.
//!
//! [`AppState`] is wrapped in an `Arc` and handed to every handler. The
//! engine keeps nothing between calls, so no locking is needed here.

use std::sync::Arc;
use std::time::Instant;

use slotwise_workflow::WorkflowEngine;

/// Shared state accessible from every Axum handler.
pub struct AppState {
    /// The scheduling workflow, shared by all requests.
    pub engine: Arc<WorkflowEngine>,

    /// When the server came up, for the status endpoint.
    pub started_at: Instant,
}

impl AppState {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            engine,
            started_at: Instant::now(),
        }
    }
}
