// OpenAI-compatible completion client
//
// Implements the core LlmClient trait against a /v1/chat/completions
// endpoint. Works with OpenAI and with gateways that speak its protocol.
//
// Design decisions:
// - One reqwest Client per model; the timeout is applied per request
// - Prompts are truncated to `max_input_tokens` before every call
// - Streaming forwards text deltas to the request's printer as partial
//   events sharing one message id, then sends the full text as final
// - In struct_parse mode tools are described in the system prompt and the
//   model's ```json blocks are parsed back into tool calls

use anyhow::{Context, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use taskforge_core::{
    AgentContext, AgentError, FunctionCallType, LlmClient, LlmSettings, Message, Printer,
    PrinterEvent, ToolCall, ToolCallResponse, ToolDefinition, ToolRequest,
};

use crate::tokens::truncate_messages;
use crate::types::{ChatRequest, OpenAiMessage, OpenAiResponse, OpenAiStreamChunk, OpenAiTool};

/// Opening fence of a struct_parse tool call block
pub const JSON_FENCE: &str = "```json";

const STRUCT_PARSE_PATTERN: &str = r"```json\s*([\s\S]*?)\s*```";

/// Key naming the tool inside a struct_parse block
pub const FUNCTION_NAME_KEY: &str = "function_name";

/// A finished completion, streamed or not
#[derive(Debug, Default)]
struct Completion {
    content: String,
    tool_calls: Vec<ToolCall>,
    finish_reason: Option<String>,
    total_tokens: Option<u32>,
}

/// Tool call assembled from streamed fragments
#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Chat completions client for one model
pub struct OpenAiClient {
    client: Client,
    settings: LlmSettings,
    struct_parse_pattern: Regex,
}

impl OpenAiClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let struct_parse_pattern =
            Regex::new(STRUCT_PARSE_PATTERN).context("Invalid struct_parse pattern")?;
        Ok(Self {
            client: Client::new(),
            settings,
            struct_parse_pattern,
        })
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    /// Full completion endpoint URL
    pub fn endpoint(&self) -> String {
        self.settings.endpoint()
    }

    fn struct_parse(&self) -> bool {
        self.settings.function_call_type == FunctionCallType::StructParse
    }

    /// Wire messages for a call, truncated to the prompt budget
    fn build_messages(&self, system: Option<&Message>, messages: &[Message]) -> Vec<OpenAiMessage> {
        let wire = system
            .into_iter()
            .chain(messages)
            .map(OpenAiMessage::from)
            .collect();
        truncate_messages(wire, self.settings.max_input_tokens)
    }

    fn request(
        &self,
        messages: Vec<OpenAiMessage>,
        temperature: Option<f32>,
        stream: bool,
    ) -> ChatRequest {
        ChatRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: Some(temperature.unwrap_or(self.settings.temperature)),
            max_tokens: Some(self.settings.max_tokens),
            stream,
            tools: None,
            tool_choice: None,
        }
    }

    async fn post(&self, request: &ChatRequest, timeout: Duration) -> Result<reqwest::Response> {
        let mut builder = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(request);
        if !self.settings.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.settings.api_key));
        }

        let response = builder
            .send()
            .await
            .context("Failed to send completion request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Completion request failed with status {}: {}",
                status,
                error_text
            );
        }
        Ok(response)
    }

    /// Non-streaming completion
    async fn complete(&self, request: &ChatRequest, timeout: Duration) -> Result<Completion> {
        let response: OpenAiResponse = self
            .post(request, timeout)
            .await?
            .json()
            .await
            .context("Failed to parse completion response")?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No choices in completion response"))?;

        Ok(Completion {
            content: choice
                .message
                .content
                .map(|c| c.text())
                .unwrap_or_default(),
            tool_calls: choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(ToolCall::from)
                .collect(),
            finish_reason: choice.finish_reason,
            total_tokens: response.usage.map(|u| u.total_tokens),
        })
    }

    /// Streaming completion. Text deltas are forwarded to the printer when
    /// the context names a stream message type.
    async fn complete_stream(
        &self,
        ctx: &AgentContext,
        request: &ChatRequest,
        timeout: Duration,
    ) -> Result<Completion> {
        let response = self.post(request, timeout).await?;
        let mut events = response.bytes_stream().eventsource();

        let message_type = ctx.stream_message_type().await;
        let message_id = Uuid::now_v7().to_string();
        let hide_fenced = self.struct_parse();

        let mut completion = Completion::default();
        let mut calls: Vec<PartialCall> = Vec::new();
        let mut forwarded = 0usize;

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| anyhow::anyhow!("Completion stream error: {}", e))?;
            if event.data == "[DONE]" {
                break;
            }

            let chunk: OpenAiStreamChunk = match serde_json::from_str(&event.data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(request_id = %ctx.request_id, error = %e, "OpenAiClient: skipping unparsable chunk");
                    continue;
                }
            };
            if let Some(usage) = chunk.usage {
                completion.total_tokens = Some(usage.total_tokens);
            }
            let Some(choice) = chunk.choices.into_iter().next() else {
                continue;
            };

            for fragment in choice.delta.tool_calls.unwrap_or_default() {
                let index = fragment.index as usize;
                if calls.len() <= index {
                    calls.resize_with(index + 1, PartialCall::default);
                }
                let call = &mut calls[index];
                if let Some(id) = fragment.id {
                    call.id = id;
                }
                if let Some(function) = fragment.function {
                    if let Some(name) = function.name {
                        call.name = name;
                    }
                    if let Some(arguments) = function.arguments {
                        call.arguments.push_str(&arguments);
                    }
                }
            }

            if let Some(content) = choice.delta.content {
                completion.content.push_str(&content);
                if let Some(message_type) = &message_type {
                    let visible = visible_len(&completion.content, hide_fenced);
                    if visible > forwarded {
                        let delta = &completion.content[forwarded..visible];
                        ctx.printer
                            .send(
                                PrinterEvent::new(message_type.clone(), json!(delta))
                                    .with_message_id(message_id.clone())
                                    .partial(),
                            )
                            .await?;
                        forwarded = visible;
                    }
                }
            }

            if choice.finish_reason.is_some() {
                completion.finish_reason = choice.finish_reason;
            }
        }

        completion.tool_calls = calls
            .into_iter()
            .filter(|c| !c.name.is_empty())
            .map(|c| ToolCall::new(c.id, c.name, c.arguments))
            .collect();

        if let Some(message_type) = &message_type {
            let visible = strip_fenced(&completion.content, hide_fenced);
            if !visible.trim().is_empty() {
                ctx.printer
                    .send(
                        PrinterEvent::new(message_type.clone(), json!(visible))
                            .with_message_id(message_id),
                    )
                    .await?;
            }
        }

        Ok(completion)
    }

    /// Extract struct_parse tool calls and cut the fenced blocks from the text
    pub fn parse_struct_tool_calls(&self, content: &str) -> (String, Vec<ToolCall>) {
        let calls = self
            .struct_parse_pattern
            .captures_iter(content)
            .filter_map(|captures| captures.get(1))
            .filter_map(|block| parse_struct_tool_call(block.as_str()))
            .collect();
        (strip_fenced(content, true).to_string(), calls)
    }

    async fn ask_tool_inner(&self, ctx: &AgentContext, request: ToolRequest) -> Result<ToolCallResponse> {
        let struct_parse = self.struct_parse();

        let system = match (&request.system_message, struct_parse && !request.tools.is_empty()) {
            (Some(system), true) => Some(Message::system(format!(
                "{}{}",
                system.content,
                struct_parse_prompt(&request.tools)
            ))),
            (None, true) => Some(Message::system(struct_parse_prompt(&request.tools))),
            (system, false) => system.clone(),
        };

        let messages = self.build_messages(system.as_ref(), &request.messages);
        let mut chat = self.request(messages, request.temperature, request.stream);
        if !struct_parse && !request.tools.is_empty() {
            chat.tools = Some(request.tools.iter().map(OpenAiTool::from).collect());
            chat.tool_choice = Some(request.tool_choice.as_str().to_string());
        }

        info!(
            request_id = %ctx.request_id,
            model = %self.settings.model,
            messages = chat.messages.len(),
            tools = request.tools.len(),
            stream = request.stream,
            "OpenAiClient: ask_tool"
        );
        debug!(request_id = %ctx.request_id, body = %serde_json::to_string(&chat).unwrap_or_default(), "OpenAiClient: request body");

        let completion = if request.stream {
            self.complete_stream(ctx, &chat, request.timeout).await?
        } else {
            self.complete(&chat, request.timeout).await?
        };

        let (content, tool_calls) = if struct_parse {
            self.parse_struct_tool_calls(&completion.content)
        } else {
            (completion.content, completion.tool_calls)
        };

        info!(
            request_id = %ctx.request_id,
            tool_calls = tool_calls.len(),
            finish_reason = ?completion.finish_reason,
            total_tokens = ?completion.total_tokens,
            "OpenAiClient: ask_tool complete"
        );

        Ok(ToolCallResponse {
            content,
            tool_calls,
            finish_reason: completion.finish_reason,
            total_tokens: completion.total_tokens,
        })
    }

    async fn ask_inner(
        &self,
        ctx: &AgentContext,
        messages: &[Message],
        system_messages: &[Message],
        stream: bool,
        temperature: Option<f32>,
    ) -> Result<String> {
        let wire = system_messages
            .iter()
            .chain(messages)
            .map(OpenAiMessage::from)
            .collect();
        let wire = truncate_messages(wire, self.settings.max_input_tokens);
        let chat = self.request(wire, temperature, stream);

        info!(
            request_id = %ctx.request_id,
            model = %self.settings.model,
            messages = chat.messages.len(),
            stream,
            "OpenAiClient: ask"
        );

        let timeout = self.settings.request_timeout();
        let completion = if stream {
            self.complete_stream(ctx, &chat, timeout).await?
        } else {
            self.complete(&chat, timeout).await?
        };

        let content = completion.content.trim().to_string();
        if content.is_empty() {
            anyhow::bail!("Empty response from model");
        }
        Ok(content)
    }
}

/// Keep event emission errors as they are; everything else is a model error
fn into_agent_error(error: anyhow::Error) -> AgentError {
    match error.downcast::<AgentError>() {
        Ok(agent_error) => agent_error,
        Err(other) => AgentError::llm(format!("{:#}", other)),
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.settings.model
    }

    async fn ask(
        &self,
        ctx: &AgentContext,
        messages: &[Message],
        system_messages: &[Message],
        stream: bool,
        temperature: Option<f32>,
    ) -> taskforge_core::Result<String> {
        self.ask_inner(ctx, messages, system_messages, stream, temperature)
            .await
            .map_err(into_agent_error)
    }

    async fn ask_tool(
        &self,
        ctx: &AgentContext,
        request: ToolRequest,
    ) -> taskforge_core::Result<ToolCallResponse> {
        self.ask_tool_inner(ctx, request)
            .await
            .map_err(into_agent_error)
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("model", &self.settings.model)
            .field("endpoint", &self.endpoint())
            .field("function_call_type", &self.settings.function_call_type)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// struct_parse helpers
// ============================================================================

/// Tool instructions appended to the system prompt in struct_parse mode
pub fn struct_parse_prompt(tools: &[ToolDefinition]) -> String {
    let mut prompt = String::from(
        "\n\n# Tools\nTo call a tool, reply with a ```json block holding one object. \
         Its `function_name` field names the tool; every other field is an argument.\n",
    );
    for tool in tools {
        prompt.push_str(&format!(
            "- {}: {}\n  parameters: {}\n",
            tool.name, tool.description, tool.parameters
        ));
    }
    prompt
}

fn parse_struct_tool_call(block: &str) -> Option<ToolCall> {
    let mut value: Value = match serde_json::from_str(block) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "OpenAiClient: unparsable tool call block");
            return None;
        }
    };
    let name = value
        .as_object_mut()
        .and_then(|obj| obj.remove(FUNCTION_NAME_KEY))
        .and_then(|name| name.as_str().map(str::to_string));
    match name {
        Some(name) => Some(ToolCall::with_value(Uuid::now_v7().to_string(), name, &value)),
        None => {
            warn!("OpenAiClient: tool call block without function_name");
            None
        }
    }
}

/// Text before the first ```json fence (the whole text when `hide` is off)
fn strip_fenced(content: &str, hide: bool) -> &str {
    if !hide {
        return content;
    }
    match content.find(JSON_FENCE) {
        Some(pos) => &content[..pos],
        None => content,
    }
}

/// Length of the prefix of `content` that is safe to show: everything
/// before a ```json fence, holding back a trailing partial fence.
fn visible_len(content: &str, hide: bool) -> usize {
    if !hide {
        return content.len();
    }
    if let Some(pos) = content.find(JSON_FENCE) {
        return pos;
    }
    let held = (1..JSON_FENCE.len())
        .rev()
        .find(|&k| content.ends_with(&JSON_FENCE[..k]))
        .unwrap_or(0);
    content.len() - held
}
