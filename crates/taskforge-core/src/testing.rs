// In-process test doubles
//
// Scripted model client, recording printer and a handful of tools. Used by
// the unit tests in this crate and by the integration tests under tests/.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::EngineConfig;
use crate::context::AgentContext;
use crate::error::{AgentError, Result};
use crate::file::File;
use crate::llm::{LlmClient, ToolCallResponse, ToolRequest};
use crate::message::{Message, ToolCall};
use crate::printer::{Printer, PrinterEvent};
use crate::tools::{Tool, ToolExecutionResult};

/// Text returned once every scripted reply has been used
pub const MOCK_FALLBACK_REPLY: &str = "Mock response (no more responses configured)";

// ============================================================================
// MockLlmClient
// ============================================================================

#[derive(Debug, Clone)]
enum ReplyKind {
    Text(String),
    ToolCalls(String, Vec<ToolCall>),
    Error(String),
}

/// One scripted model reply
#[derive(Debug, Clone)]
pub struct MockReply {
    kind: ReplyKind,
    delay: Option<Duration>,
}

impl MockReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Text(content.into()),
            delay: None,
        }
    }

    pub fn tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            kind: ReplyKind::ToolCalls(content.into(), calls),
            delay: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Error(message.into()),
            delay: None,
        }
    }

    /// Hold the reply back for `delay` before returning it
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Scripted LLM client.
///
/// Replies come from routes first: a route matches when any message of the
/// call contains its key. Unmatched calls take the next reply from the
/// default queue, then fall back to [`MOCK_FALLBACK_REPLY`].
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<MockReply>>,
    routes: Mutex<Vec<(String, VecDeque<MockReply>)>>,
    calls: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, reply: MockReply) {
        self.replies.lock().await.push_back(reply);
    }

    pub async fn route(&self, key: impl Into<String>, replies: Vec<MockReply>) {
        self.routes
            .lock()
            .await
            .push((key.into(), replies.into_iter().collect()));
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    /// Every call's message contents, joined by newlines
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn next_reply(&self, transcript: String) -> MockReply {
        let routed = {
            let mut routes = self.routes.lock().await;
            routes
                .iter_mut()
                .find(|(key, queue)| !queue.is_empty() && transcript.contains(key.as_str()))
                .and_then(|(_, queue)| queue.pop_front())
        };
        self.calls.lock().await.push(transcript);

        let reply = match routed {
            Some(reply) => reply,
            None => self
                .replies
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| MockReply::text(MOCK_FALLBACK_REPLY)),
        };
        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }
        reply
    }
}

fn transcript<'a>(messages: impl IntoIterator<Item = &'a Message>) -> String {
    messages
        .into_iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn ask(
        &self,
        _ctx: &AgentContext,
        messages: &[Message],
        system_messages: &[Message],
        _stream: bool,
        _temperature: Option<f32>,
    ) -> Result<String> {
        let text = transcript(system_messages.iter().chain(messages));
        match self.next_reply(text).await.kind {
            ReplyKind::Text(content) | ReplyKind::ToolCalls(content, _) => Ok(content),
            ReplyKind::Error(message) => Err(AgentError::llm(message)),
        }
    }

    async fn ask_tool(&self, _ctx: &AgentContext, request: ToolRequest) -> Result<ToolCallResponse> {
        let text = transcript(request.system_message.iter().chain(&request.messages));
        match self.next_reply(text).await.kind {
            ReplyKind::Text(content) => Ok(ToolCallResponse::text(content)),
            ReplyKind::ToolCalls(content, calls) => {
                Ok(ToolCallResponse::with_tool_calls(content, calls))
            }
            ReplyKind::Error(message) => Err(AgentError::llm(message)),
        }
    }
}

// ============================================================================
// RecordingPrinter
// ============================================================================

/// Printer that keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingPrinter {
    events: Mutex<Vec<PrinterEvent>>,
}

impl RecordingPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<PrinterEvent> {
        self.events.lock().await.clone()
    }

    pub async fn types(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .map(|e| e.message_type.clone())
            .collect()
    }
}

#[async_trait]
impl Printer for RecordingPrinter {
    async fn send(&self, event: PrinterEvent) -> Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

// ============================================================================
// Tools
// ============================================================================

/// Returns its `text` argument
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        })
    }

    async fn execute(&self, _ctx: &AgentContext, arguments: Value) -> ToolExecutionResult {
        match arguments.get("text").and_then(Value::as_str) {
            Some(text) => ToolExecutionResult::success(text),
            None => ToolExecutionResult::tool_error("text is required"),
        }
    }
}

/// Always fails with an internal error
pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "failing_tool"
    }

    fn description(&self) -> &str {
        "A tool that always fails"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _ctx: &AgentContext, _arguments: Value) -> ToolExecutionResult {
        ToolExecutionResult::internal_error_msg("simulated failure")
    }
}

/// Sleeps for `millis` before answering `slept <millis>`
pub struct SleepyTool;

#[async_trait]
impl Tool for SleepyTool {
    fn name(&self) -> &str {
        "sleepy"
    }

    fn description(&self) -> &str {
        "Wait for a while"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"millis": {"type": "integer"}}
        })
    }

    async fn execute(&self, _ctx: &AgentContext, arguments: Value) -> ToolExecutionResult {
        let millis = arguments.get("millis").and_then(Value::as_u64).unwrap_or(10);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        ToolExecutionResult::success(format!("slept {}", millis))
    }
}

/// Records a product file named by `file_name`; `internal: true` marks it
/// as an intermediate artifact
pub struct FileWriterTool;

#[async_trait]
impl Tool for FileWriterTool {
    fn name(&self) -> &str {
        "file_writer"
    }

    fn description(&self) -> &str {
        "Write a file and publish it"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_name": {"type": "string"},
                "description": {"type": "string"},
                "internal": {"type": "boolean"}
            },
            "required": ["file_name"]
        })
    }

    async fn execute(&self, ctx: &AgentContext, arguments: Value) -> ToolExecutionResult {
        let Some(name) = arguments.get("file_name").and_then(Value::as_str) else {
            return ToolExecutionResult::tool_error("file_name is required");
        };
        let description = arguments
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let mut file = File::new(name, description).with_url(format!("https://files.local/{}", name));
        if arguments.get("internal").and_then(Value::as_bool).unwrap_or(false) {
            file = file.internal();
        }
        ctx.add_product_file(file).await;
        ToolExecutionResult::success(format!("wrote {}", name))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Context with no tools and a logging printer
pub fn test_context() -> AgentContext {
    AgentContext::builder("test-request", "test query").build()
}

/// Context with a recording printer and the given tools
pub fn recording_context(
    query: &str,
    tools: crate::tools::ToolCollection,
) -> (Arc<AgentContext>, Arc<RecordingPrinter>) {
    let printer = Arc::new(RecordingPrinter::new());
    let ctx = AgentContext::builder("test-request", query)
        .tools(Arc::new(tools))
        .printer(printer.clone())
        .build();
    (Arc::new(ctx), printer)
}

/// Default configuration without persona generation, so scripted replies
/// are consumed only by the agents under test
pub fn test_config() -> EngineConfig {
    EngineConfig::default().with_digital_employee_prompt("")
}
