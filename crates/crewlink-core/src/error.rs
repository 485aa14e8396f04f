//! Error types for crewlink core

use thiserror::Error;

/// Result type alias using crewlink Error
pub type Result<T> = std::result::Result<T, Error>;

/// Crewlink error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Required environment variable {0} is not set")]
    MissingEnv(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid crew definition: {0}")]
    Definition(String),

    #[error("Tool provider '{name}' failed to start: {reason}")]
    ProviderStart { name: String, reason: String },

    #[error("Tool provider '{name}' failed to stop: {reason}")]
    ProviderStop { name: String, reason: String },

    #[error("LLM provider error: {0}")]
    Llm(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Task '{task}' failed: {reason}")]
    Task { task: String, reason: String },

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("MCP error: {0}")]
    Mcp(#[from] crewlink_mcp::McpError),
}

/// Tool-specific errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}
