// Prompt templates
//
// Templates use `{{name}}` placeholders. Unknown placeholders are left in
// place so a misconfigured template is visible in the transcript.

/// Separator between parallel sub-tasks inside one plan step
pub const TASK_SEPARATOR: &str = "<sep>";

/// Separator between the summary text and the attributed file names
pub const SUMMARY_SEPARATOR: &str = "$$$";

/// Separator between attributed file names
pub const FILE_NAME_SEPARATOR: &str = "、";

/// Substitute every `{{key}}` in `template`
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("{{{{{}}}}}", key);
        if out.contains(&placeholder) {
            out = out.replace(&placeholder, value);
        }
    }
    out
}

/// Text inside the first ```json fence, or the whole input when there is none
pub fn strip_json_fence(text: &str) -> &str {
    let Some(start) = text.find("```json") else {
        return text.trim();
    };
    let body = &text[start + "```json".len()..];
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

pub const PLANNER_SYSTEM_PROMPT: &str = r#"You are a planning expert. Today is {{date}}.

Break the user's request into a short, ordered plan and keep it up to date with the `planning` tool.

Rules:
- Write each step as `执行顺序<N>.<stage>：<what to do>`.
- Sub-tasks of one step that can run in parallel are separated by <sep>.
- Keep the plan small: prefer three to five steps.
- Mark a step completed only when its result is in the conversation.

Standard operating procedure:
{{sopPrompt}}

Available executor tools:
{{tools}}

Files available:
{{files}}

User request: {{query}}"#;

pub const PLANNER_NEXT_STEP_PROMPT: &str = r#"Review the progress so far. If the plan does not exist yet, create it. Otherwise update step statuses with the `planning` tool, or finish the plan when every step is done."#;

pub const EXECUTOR_SYSTEM_PROMPT: &str = r#"You are a diligent executor working on one sub-task of a larger request. Today is {{date}}.

Use the tools below to complete the current task. When the task is done, reply with a concise summary of what you produced and do not call any tool.

{{sopPrompt}}
{{executorSopPrompt}}

Tools:
{{tools}}

Files available:
{{files}}

Original request: {{query}}"#;

pub const EXECUTOR_NEXT_STEP_PROMPT: &str = r#"Decide the next action for the current task. Call a tool if more work is needed, otherwise summarize the result."#;

pub const REACT_SYSTEM_PROMPT: &str = r#"You are a helpful assistant that reasons step by step and uses tools when they help. Today is {{date}}.

{{basePrompt}}

Tools:
{{tools}}

Files available:
{{files}}

User request: {{query}}"#;

pub const REACT_NEXT_STEP_PROMPT: &str = r#"Think about what to do next. Call a tool if you need more information, otherwise give the final answer."#;

pub const SUMMARY_SYSTEM_PROMPT: &str = r#"Summarize the work below for the user.

Request: {{query}}

Work history:
{{taskHistory}}

Files produced (name : description):
{{fileNameDesc}}

Reply with the summary, then `$$$`, then the names of the files the user should receive separated by `、`. Omit `$$$` if no file is relevant."#;

pub const DIGITAL_EMPLOYEE_PROMPT: &str = r#"Assign a short persona title to each tool for the task below, for example "Research analyst" for a search tool.

Task: {{task}}
Request: {{query}}

Tools:
{{ToolsDesc}}

Reply with a JSON object mapping tool name to persona title inside a ```json block."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let out = render(
            "Q: {{query}} / {{query}} on {{date}} {{unknown}}",
            &[("query", "x"), ("date", "today")],
        );
        assert_eq!(out, "Q: x / x on today {{unknown}}");
    }

    #[test]
    fn test_strip_json_fence() {
        assert_eq!(
            strip_json_fence("sure\n```json\n{\"a\": 1}\n```\nbye"),
            "{\"a\": 1}"
        );
        assert_eq!(strip_json_fence(" {\"a\": 1} "), "{\"a\": 1}");
    }
}
