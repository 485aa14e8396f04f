//! Crewlink Core - sequential LLM crews over MCP tool providers
//!
//! This crate provides:
//! - Crew definitions (TOML) and built-in presets
//! - Tool-provider lifecycle over MCP stdio
//! - Agents with a bounded tool-calling loop
//! - Sequential crews and the guarded run lifecycle

pub mod agent;
pub mod config;
pub mod crew;
pub mod definition;
pub mod error;
pub mod events;
pub mod mcp_manager;
pub mod presets;
pub mod provider;
pub mod runner;
pub mod task;
pub mod tools;

pub use agent::Agent;
pub use config::{Settings, DEFAULT_LLM, DEFAULT_MAX_ITER};
pub use crew::{Crew, CrewOutput};
pub use definition::{AgentSpec, CrewDefinition, LaunchSpec, ProviderSpec, TaskSpec, ToolCallSpec};
pub use error::{Error, Result, ToolError};
pub use events::{EventReceiver, EventSink, RunEvent};
pub use mcp_manager::{McpServerManager, McpToolProvider, ProviderLauncher, StdioLauncher, ToolProvider};
pub use provider::{
    genai_factory, ChatModel, CompletionResult, GenAIProvider, LlmMessage, LlmSelector,
    ModelFactory, PendingToolCall, ProviderType,
};
pub use runner::{CrewRunner, ProviderTools, RunReport};
pub use task::{Task, TaskContext, TaskOutput};
pub use tools::{Tool, ToolDefinition, ToolOutput, ToolRegistry};
