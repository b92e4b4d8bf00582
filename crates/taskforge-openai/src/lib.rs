// OpenAI-compatible Completion Client
//
// This crate provides the model collaborator for taskforge agents. It
// implements the LlmClient trait from taskforge-core over the chat
// completions protocol, so agents can run against OpenAI or any gateway
// that speaks the same wire format.

mod client;
mod tokens;
mod types;


pub use client::{struct_parse_prompt, OpenAiClient, FUNCTION_NAME_KEY, JSON_FENCE};
pub use tokens::{count_message_tokens, truncate_messages};
pub use types::{ChatRequest, OpenAiContent, OpenAiMessage, OpenAiTool};

// Re-export core types for convenience
pub use taskforge_core::{LlmClient, LlmSettings};
