//! LLM client and configuration layer for Slotwise.
//!
//! This crate holds the pieces every other Slotwise crate leans on but that
//! know nothing about scheduling:
//!
//! - [`llm`] -- provider-agnostic chat types and an HTTP client for the
//!   Anthropic Messages API and OpenAI-compatible Chat Completions APIs.
//! - [`config`] -- the layered application configuration (TOML/JSON file,
//!   `.env`, then environment variables).
//! - [`error`] -- agent error types.

pub mod config;
pub mod error;
pub mod llm;

pub use config::{
    AppConfig, CalendarSettings, LlmSettings, LoggingSettings, SchedulingSettings, WebSettings,
};
pub use error::{AgentError, Result};
pub use llm::{
    ChatRequest, LlmClient, LlmClientConfig, LlmProvider, LlmResponse, Message, Role, Usage,
};
