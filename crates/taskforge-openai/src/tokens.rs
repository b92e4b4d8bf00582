// Prompt budget accounting
//
// Token counts are approximated by character counts plus a fixed overhead
// per message. Truncation keeps the system message and the most recent
// turns that fit, and never starts the kept history on a non-user turn.

use crate::types::{ContentPart, OpenAiContent, OpenAiMessage};

/// Fixed overhead charged for every message
pub const BASE_MESSAGE_TOKENS: usize = 4;

/// Charge for one inline image
pub const IMAGE_TOKENS: usize = 85;

fn count_text(text: &str) -> usize {
    text.chars().count()
}

fn count_content(content: &OpenAiContent) -> usize {
    match content {
        OpenAiContent::Text(text) => count_text(text),
        OpenAiContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => count_text(text),
                ContentPart::ImageUrl { .. } => IMAGE_TOKENS,
            })
            .sum(),
    }
}

/// Approximate token cost of one message
pub fn count_message_tokens(message: &OpenAiMessage) -> usize {
    let mut tokens = BASE_MESSAGE_TOKENS + count_text(&message.role);
    if let Some(content) = &message.content {
        tokens += count_content(content);
    }
    if let Some(calls) = &message.tool_calls {
        tokens += calls
            .iter()
            .map(|c| count_text(&c.function.name) + count_text(&c.function.arguments))
            .sum::<usize>();
    }
    if let Some(id) = &message.tool_call_id {
        tokens += count_text(id);
    }
    tokens
}

/// Drop the oldest turns until the prompt fits `max_input_tokens`.
///
/// A leading system message is always kept and charged first. A budget of
/// zero disables truncation.
pub fn truncate_messages(messages: Vec<OpenAiMessage>, max_input_tokens: usize) -> Vec<OpenAiMessage> {
    if messages.is_empty() || max_input_tokens == 0 {
        return messages;
    }

    let mut iter = messages.into_iter().peekable();
    let system = iter.next_if(|m| m.role == "system");
    let mut remaining = max_input_tokens
        .saturating_sub(system.as_ref().map(count_message_tokens).unwrap_or(0));

    let history: Vec<OpenAiMessage> = iter.filter(|m| m.role != "system").collect();
    let mut kept = Vec::new();
    for message in history.into_iter().rev() {
        let cost = count_message_tokens(&message);
        if cost > remaining {
            break;
        }
        remaining -= cost;
        kept.push(message);
    }
    kept.reverse();

    let first_user = kept.iter().position(|m| m.role == "user").unwrap_or(kept.len());
    kept.drain(..first_user);

    system.into_iter().chain(kept).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskforge_core::{Message, ToolCall};

    fn wire(messages: &[Message]) -> Vec<OpenAiMessage> {
        messages.iter().map(OpenAiMessage::from).collect()
    }

    #[test]
    fn test_count_message_tokens() {
        let message = OpenAiMessage::from(&Message::user("hello"));
        // 4 overhead + "user" + "hello"
        assert_eq!(count_message_tokens(&message), 4 + 4 + 5);

        let image = OpenAiMessage::from(&Message::user("hi").with_image("AAAA"));
        assert_eq!(count_message_tokens(&image), 4 + 4 + 2 + IMAGE_TOKENS);
    }

    #[test]
    fn test_truncate_keeps_system_and_recent_turns() {
        let messages = wire(&[
            Message::system("sys"),
            Message::user(&"a".repeat(100)),
            Message::assistant(&"b".repeat(100)),
            Message::user("recent question"),
            Message::assistant("recent answer"),
        ]);

        let kept = truncate_messages(messages, 80);
        let roles: Vec<&str> = kept.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert_eq!(kept[1].content.as_ref().unwrap().text(), "recent question");
    }

    #[test]
    fn test_truncate_drops_leading_tool_turns() {
        let call = ToolCall::new("c1", "echo", "{}");
        let messages = wire(&[
            Message::user(&"q".repeat(200)),
            Message::from_tool_calls("", vec![call]),
            Message::tool("result", "c1"),
            Message::assistant("done"),
        ]);

        // the user turn does not fit, so the orphaned tool turns go too
        let kept = truncate_messages(messages, 100);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_zero_budget_disables_truncation() {
        let messages = wire(&[Message::user(&"x".repeat(1000))]);
        assert_eq!(truncate_messages(messages.clone(), 0), messages);
    }
}
