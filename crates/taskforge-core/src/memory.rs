// Agent memory
//
// Append-only ordered log of messages owned by exactly one agent. Sub-task
// executors get a deep copy via `Clone`; merging back is done by the
// orchestrator using `len()` as the shared starting point and `since()` for
// the suffix each copy produced.

use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    messages: Vec<Message>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn add(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut Message> {
        self.messages.last_mut()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages appended after `index` (empty when `index` is past the end)
    pub fn since(&self, index: usize) -> &[Message] {
        self.messages.get(index..).unwrap_or(&[])
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Drop tool turns appended at or after `from`: tool results, assistant
    /// turns that requested tools, and injected next-step prompts starting
    /// with `next_step_marker`. Messages before `from` are left untouched.
    pub fn clear_tool_context(&mut self, from: usize, next_step_marker: &str) {
        let marker = next_step_marker.trim();
        let from = from.min(self.messages.len());
        let produced = self.messages.split_off(from);
        self.messages.extend(produced.into_iter().filter(|msg| {
            if msg.role == Role::Tool {
                return false;
            }
            if msg.role == Role::Assistant && msg.has_tool_calls() {
                return false;
            }
            !(!marker.is_empty() && msg.role == Role::User && msg.content.starts_with(marker))
        }));
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
