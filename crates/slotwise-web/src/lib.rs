//! HTTP interface for Slotwise.
//!
//! One stateless endpoint drives the workflow: `POST /api/chat` takes an
//! invocation (latest message, optional paused run state, optional decision)
//! and returns the engine's result, including the run state the client must
//! send back to resume. `GET /api/status` reports what the server is wired to.

pub mod api;
pub mod error;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::{WebServer, router};
pub use state::AppState;
