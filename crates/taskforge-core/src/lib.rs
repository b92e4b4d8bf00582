// Agent Orchestration Core
//
// This crate drives LLM agents through a think/act state machine, plans
// multi-step work, fans parallel sub-tasks out to executors and streams
// every intermediate result as ordered, replayable events.
//
// Key design decisions:
// - Transport-agnostic: model calls go through LlmClient, events through Printer
// - Agents compose a BaseAgent field and share one step loop
// - Handler dispatch is an enum-keyed registry built once at startup
// - Tool failures are scoped to the call; model failures stop the owning agent
// - Event order counters are the only externally visible ordering contract

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod file;
pub mod handler;
pub mod llm;
pub mod mcp;
pub mod memory;
pub mod message;
pub mod plan;
pub mod printer;
pub mod prompt;
pub mod stream;
pub mod tools;

// Test doubles shared with the integration tests and downstream crates' tests
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports for convenience
pub use agent::{
    Agent, AgentState, BaseAgent, PlanningAgent, PlanningTool, ReactAgent, ReactMode,
    SummaryAgent, TaskSummary,
};
pub use config::{AgentPrompts, EngineConfig, FunctionCallType, LlmSettings};
pub use context::{AgentContext, AgentContextBuilder};
pub use error::{AgentError, Result};
pub use file::File;
pub use handler::{AgentHandler, AgentModels, AgentType, HandlerRegistry};
pub use llm::{LlmClient, ToolCallResponse, ToolChoice, ToolRequest};
pub use mcp::{McpClient, McpToolInfo};
pub use memory::Memory;
pub use message::{Message, Role, ToolCall};
pub use plan::{Plan, StepStatus};
pub use printer::{LogPrinter, Printer, PrinterEvent, StreamPrinter};
pub use stream::{
    failure, heartbeat, AgentResponse, EventMessage, EventResult, GptProcessResult,
    IncrementalResultBuilder, ReplayEntry,
};
pub use tools::{Tool, ToolCollection, ToolCollectionBuilder, ToolDefinition, ToolExecutionResult};
