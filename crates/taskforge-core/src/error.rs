// Error types for agents, tools and orchestration

use thiserror::Error;

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that can occur while running agents
#[derive(Debug, Error)]
pub enum AgentError {
    /// LLM collaborator error (transport, malformed response, timeout)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Tool execution error
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Plan command rejected
    #[error("Plan error: {0}")]
    Plan(String),

    /// Remote tool bridge error
    #[error("Remote tool error: {0}")]
    RemoteTool(String),

    /// Event emission error (usually the client went away)
    #[error("Event emission error: {0}")]
    EventEmission(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Tool arguments could not be interpreted
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// No handler registered for the requested agent type
    #[error("No handler for agent type: {0}")]
    UnknownAgentType(i32),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AgentError {
    /// Create an LLM error
    pub fn llm(msg: impl Into<String>) -> Self {
        AgentError::Llm(msg.into())
    }

    /// Create a tool execution error
    pub fn tool(msg: impl Into<String>) -> Self {
        AgentError::ToolExecution(msg.into())
    }

    /// Create a plan error
    pub fn plan(msg: impl Into<String>) -> Self {
        AgentError::Plan(msg.into())
    }

    /// Create a remote tool error
    pub fn remote(msg: impl Into<String>) -> Self {
        AgentError::RemoteTool(msg.into())
    }

    /// Create an event emission error
    pub fn event(msg: impl Into<String>) -> Self {
        AgentError::EventEmission(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        AgentError::Configuration(msg.into())
    }

    /// Create an invalid arguments error
    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        AgentError::InvalidArguments(msg.into())
    }
}
