// Streaming surface
//
// Agents emit PrinterEvents; the streaming printer turns each one into an
// AgentResponse; the incremental builder folds those into ordered, replayable
// GptProcessResult packets for the client.

pub mod builder;
pub mod event_result;
pub mod response;

pub use builder::{failure, heartbeat, GptProcessResult, IncrementalResultBuilder};
pub use event_result::{EventMessage, EventResult, ReplayEntry};
pub use response::{format_steps, strip_step_prefix, AgentResponse, PlanView, ToolResultView};

/// Message type tags carried by events
pub mod message_type {
    pub const PLAN: &str = "plan";
    pub const PLAN_THOUGHT: &str = "plan_thought";
    pub const TASK: &str = "task";
    pub const TASK_SUMMARY: &str = "task_summary";
    pub const TOOL_THOUGHT: &str = "tool_thought";
    pub const TOOL_RESULT: &str = "tool_result";
    pub const AGENT_STREAM: &str = "agent_stream";
    pub const RESULT: &str = "result";
    pub const BROWSER: &str = "browser";
    pub const CODE: &str = "code";
    pub const HTML: &str = "html";
    pub const MARKDOWN: &str = "markdown";
    pub const PPT: &str = "ppt";
    pub const FILE: &str = "file";
    pub const KNOWLEDGE: &str = "knowledge";
    pub const DEEP_SEARCH: &str = "deep_search";

    /// Tool output types whose payload is forwarded as a JSON map
    pub const RICH: [&str; 8] = [
        BROWSER,
        CODE,
        HTML,
        MARKDOWN,
        PPT,
        FILE,
        KNOWLEDGE,
        DEEP_SEARCH,
    ];

    /// Types streamed in many partial messages under a single task
    pub const STREAM_TASK: [&str; 4] = [HTML, MARKDOWN, DEEP_SEARCH, TOOL_THOUGHT];

    /// Tools whose results are not echoed as `tool_result` events; they
    /// report through their own rich message types
    pub const SILENT_TOOLS: [&str; 4] = ["code_interpreter", "report_tool", "file_tool", "deep_search"];

    pub fn is_rich(message_type: &str) -> bool {
        RICH.contains(&message_type)
    }

    pub fn is_stream_task(message_type: &str) -> bool {
        STREAM_TASK.contains(&message_type)
    }
}
