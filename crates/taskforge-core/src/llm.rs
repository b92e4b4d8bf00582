// Model completion collaborator
//
// Agents talk to the language model only through `LlmClient`. Concrete
// clients (OpenAI-compatible HTTP, test doubles) live outside the agent code.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::context::AgentContext;
use crate::error::Result;
use crate::message::{Message, ToolCall};
use crate::tools::ToolDefinition;

/// Default timeout for tool-augmented completions
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    None,
    #[default]
    Auto,
    Required,
}

impl ToolChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolChoice::None => "none",
            ToolChoice::Auto => "auto",
            ToolChoice::Required => "required",
        }
    }
}

/// A tool-augmented completion request
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub messages: Vec<Message>,
    pub system_message: Option<Message>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
    pub temperature: Option<f32>,
    pub stream: bool,
    pub timeout: Duration,
}

impl ToolRequest {
    pub fn new(messages: Vec<Message>, tools: Vec<ToolDefinition>) -> Self {
        Self {
            messages,
            system_message: None,
            tools,
            tool_choice: ToolChoice::Auto,
            temperature: None,
            stream: false,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_message = Some(Message::system(system_prompt));
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Model turn returned by a tool-augmented completion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub total_tokens: Option<u32>,
}

impl ToolCallResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: Some("stop".into()),
            ..Default::default()
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            finish_reason: Some("tool_calls".into()),
            ..Default::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ============================================================================
// LlmClient Trait
// ============================================================================

/// Completion client used by every agent
///
/// When `stream` is set, implementations may push partial text to
/// `ctx.printer` under `ctx.stream_message_type()` while the completion runs;
/// the returned value is always the full text.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model identifier, for logs
    fn model_name(&self) -> &str;

    /// Plain completion
    async fn ask(
        &self,
        ctx: &AgentContext,
        messages: &[Message],
        system_messages: &[Message],
        stream: bool,
        temperature: Option<f32>,
    ) -> Result<String>;

    /// Completion that may request tool calls
    async fn ask_tool(&self, ctx: &AgentContext, request: ToolRequest) -> Result<ToolCallResponse>;
}
