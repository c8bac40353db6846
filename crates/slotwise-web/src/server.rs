//! Web server setup and startup.
//!
//! [`WebServer`] composes the Axum router and starts the HTTP listener.

use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::routing::{get, post};
use slotwise_agent::WebSettings;
use slotwise_workflow::WorkflowEngine;
use tower_http::cors::{Any, CorsLayer};

use crate::api;
use crate::state::AppState;

/// Build the router with every route registered.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/api/status", get(api::status))
        .route("/api/chat", post(api::chat))
        .layer(cors)
        .with_state(state)
}

/// The Slotwise HTTP server.
pub struct WebServer {
    settings: WebSettings,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(settings: WebSettings, engine: Arc<WorkflowEngine>) -> Self {
        Self {
            settings,
            state: Arc::new(AppState::new(engine)),
        }
    }

    /// Return the `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.settings.bind_addr, self.settings.port)
    }

    /// Start the server and block until it is shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(self) -> std::io::Result<()> {
        let addr = self.addr();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve(self, listener: tokio::net::TcpListener) -> std::io::Result<()> {
        tracing::info!(
            addr = %listener.local_addr()?,
            backend = self.state.engine.calendar_backend(),
            "starting web server"
        );
        axum::serve(listener, router(self.state)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_joins_host_and_port() {
        let settings = WebSettings {
            bind_addr: "0.0.0.0".into(),
            port: 8080,
        };
        let engine = Arc::new(
            WorkflowEngine::new(
                slotwise_workflow::EngineConfig::default(),
                Arc::new(slotwise_workflow::ScriptedExtractor::new()),
                Arc::new(slotwise_adapters::InMemoryCalendar::new()),
            )
            .unwrap(),
        );
        assert_eq!(WebServer::new(settings, engine).addr(), "0.0.0.0:8080");
    }
}
