// Agent state machine
//
// Every agent composes a `BaseAgent` (memory, state, step counter, shared
// context, LLM client) and implements `think`/`act`. The step loop in
// `run_loop` is shared by all of them.
//
// Design decisions:
// - Composition over inheritance: concrete agents own a BaseAgent field and
//   expose it through `Agent::base`/`base_mut`
// - Reaching max_steps is a soft stop (state Idle), not an error
// - Any error escaping think/act sets state Error and propagates
// - Tool batches run concurrently with join_all; results are keyed by call id

pub mod planning;
pub mod react;
pub mod summary;

pub use planning::{PlanningAgent, PlanningTool, PLANNING_TOOL_NAME};
pub use react::{ReactAgent, ReactMode};
pub use summary::{SummaryAgent, TaskSummary};

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::context::AgentContext;
use crate::error::Result;
use crate::llm::LlmClient;
use crate::memory::Memory;
use crate::message::{Message, ToolCall};
use crate::tools::tool_error_marker;

/// Step result when `think` decided no action was needed
pub const THINK_ONLY_RESULT: &str = "Thinking complete - no action needed";

/// Result of `run` when the loop never stepped
pub const NO_STEPS_RESULT: &str = "No steps executed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    Idle,
    Running,
    Finished,
    Error,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentState::Idle => "IDLE",
            AgentState::Running => "RUNNING",
            AgentState::Finished => "FINISHED",
            AgentState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

// ============================================================================
// BaseAgent
// ============================================================================

/// State shared by every agent kind
pub struct BaseAgent {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub next_step_prompt: String,
    pub memory: Memory,
    pub state: AgentState,
    pub max_steps: usize,
    pub current_step: usize,
    /// Maximum characters of one tool observation kept in memory
    pub max_observe: usize,
    pub context: Arc<AgentContext>,
    pub llm: Arc<dyn LlmClient>,
    /// Set when a model call failed and the agent stopped itself
    pub model_failure: Option<String>,
}

impl BaseAgent {
    pub fn new(
        name: impl Into<String>,
        context: Arc<AgentContext>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            system_prompt: String::new(),
            next_step_prompt: String::new(),
            memory: Memory::new(),
            state: AgentState::Idle,
            max_steps: 10,
            current_step: 0,
            max_observe: usize::MAX,
            context,
            llm,
            model_failure: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_observe(mut self, max_observe: usize) -> Self {
        self.max_observe = max_observe;
        self
    }

    /// Append the next-step prompt unless the last message is already from the user
    pub fn ensure_user_turn(&mut self) {
        let last_is_user = self
            .memory
            .last()
            .map(|m| m.role == crate::message::Role::User)
            .unwrap_or(false);
        if !last_is_user {
            self.memory.add(Message::user(self.next_step_prompt.clone()));
        }
    }

    /// Record a failed model call: the error goes into memory and the agent stops
    pub fn record_model_failure(&mut self, err: &crate::error::AgentError) {
        error!(
            agent = %self.name,
            request_id = %self.context.request_id,
            error = %err,
            "Agent: model call failed, stopping"
        );
        self.memory.add(Message::assistant(format!(
            "Error encountered while processing: {}",
            err
        )));
        self.model_failure = Some(err.to_string());
        self.state = AgentState::Finished;
    }

    /// Cut an observation down to `max_observe` characters
    pub fn truncate_observation(&self, observation: String) -> String {
        if observation.chars().count() <= self.max_observe {
            observation
        } else {
            observation.chars().take(self.max_observe).collect()
        }
    }

    /// Execute one call through the tool registry. Never fails: argument and
    /// tool errors become the `Tool <name> Error.` marker.
    pub async fn execute_tool(&self, call: &ToolCall) -> String {
        let arguments = match call.parsed_arguments() {
            Ok(args) => args,
            Err(e) => {
                warn!(
                    tool = %call.name,
                    tool_call_id = %call.id,
                    error = %e,
                    "Agent: could not parse tool arguments"
                );
                return tool_error_marker(&call.name);
            }
        };

        let ctx = &self.context;
        info!(
            agent = %self.name,
            request_id = %ctx.request_id,
            tool = %call.name,
            tool_call_id = %call.id,
            "Agent: executing tool"
        );
        ctx.tool_collection
            .execute(ctx, &call.name, arguments)
            .await
            .into_observation(&call.name, &call.id)
    }

    /// Execute a batch of calls concurrently; results are keyed by call id
    pub async fn execute_tools(&self, calls: &[ToolCall]) -> HashMap<String, String> {
        let futures = calls.iter().map(|call| async move {
            let result = self.execute_tool(call).await;
            (call.id.clone(), result)
        });
        join_all(futures).await.into_iter().collect()
    }
}

impl std::fmt::Debug for BaseAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseAgent")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("current_step", &self.current_step)
            .field("max_steps", &self.max_steps)
            .field("memory_len", &self.memory.len())
            .field("model", &self.llm.model_name())
            .finish()
    }
}

// ============================================================================
// Agent Trait
// ============================================================================

#[async_trait]
pub trait Agent: Send {
    fn base(&self) -> &BaseAgent;

    fn base_mut(&mut self) -> &mut BaseAgent;

    /// Decide what to do next; `true` means `act` should run
    async fn think(&mut self) -> Result<bool>;

    /// Carry out the decision and return the step's text
    async fn act(&mut self) -> Result<String>;

    /// Think, then act if thinking asked for it
    async fn step(&mut self) -> Result<String> {
        if self.think().await? {
            self.act().await
        } else {
            Ok(THINK_ONLY_RESULT.to_string())
        }
    }

    async fn run(&mut self, query: &str) -> Result<String> {
        run_loop(self, query).await
    }

    fn state(&self) -> AgentState {
        self.base().state
    }

    fn memory(&self) -> &Memory {
        &self.base().memory
    }
}

/// The shared step loop behind `Agent::run`
pub async fn run_loop<A: Agent + ?Sized>(agent: &mut A, query: &str) -> Result<String> {
    {
        let base = agent.base_mut();
        base.state = AgentState::Running;
        if !query.is_empty() {
            base.memory.add(Message::user(query));
        }
    }

    let mut results = Vec::new();
    loop {
        let base = agent.base_mut();
        if base.current_step >= base.max_steps || base.state == AgentState::Finished {
            break;
        }
        base.current_step += 1;
        info!(
            agent = %base.name,
            request_id = %base.context.request_id,
            step = base.current_step,
            max_steps = base.max_steps,
            "Agent: executing step"
        );

        match agent.step().await {
            Ok(result) => results.push(result),
            Err(e) => {
                let base = agent.base_mut();
                error!(
                    agent = %base.name,
                    request_id = %base.context.request_id,
                    step = base.current_step,
                    error = %e,
                    "Agent: step failed"
                );
                base.state = AgentState::Error;
                return Err(e);
            }
        }
    }

    let base = agent.base_mut();
    if base.current_step >= base.max_steps && base.state != AgentState::Finished {
        warn!(
            agent = %base.name,
            request_id = %base.context.request_id,
            max_steps = base.max_steps,
            "Agent: reached max steps"
        );
        base.current_step = 0;
        base.state = AgentState::Idle;
        results.push(format!("Terminated: Reached max steps ({})", base.max_steps));
    }

    Ok(results
        .pop()
        .unwrap_or_else(|| NO_STEPS_RESULT.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_context, EchoTool, FailingTool, MockLlmClient};
    use crate::tools::ToolCollection;
    use serde_json::json;

    /// Agent whose think always asks to act
    struct Busy {
        base: BaseAgent,
        acts: usize,
    }

    #[async_trait]
    impl Agent for Busy {
        fn base(&self) -> &BaseAgent {
            &self.base
        }
        fn base_mut(&mut self) -> &mut BaseAgent {
            &mut self.base
        }
        async fn think(&mut self) -> Result<bool> {
            Ok(true)
        }
        async fn act(&mut self) -> Result<String> {
            self.acts += 1;
            Ok(format!("act {}", self.acts))
        }
    }

    fn busy(max_steps: usize) -> Busy {
        let base = BaseAgent::new("busy", Arc::new(test_context()), Arc::new(MockLlmClient::new()))
            .with_max_steps(max_steps);
        Busy { base, acts: 0 }
    }

    #[tokio::test]
    async fn test_step_limit_resets_to_idle() {
        let mut agent = busy(3);
        let result = agent.run("go").await.unwrap();

        assert_eq!(agent.acts, 3);
        assert_eq!(agent.state(), AgentState::Idle);
        assert_eq!(agent.base().current_step, 0);
        assert_eq!(result, "Terminated: Reached max steps (3)");
    }

    #[tokio::test]
    async fn test_zero_steps() {
        let mut agent = busy(0);
        let result = agent.run("").await.unwrap();
        assert_eq!(agent.acts, 0);
        assert!(agent.memory().is_empty());
        assert_eq!(result, "Terminated: Reached max steps (0)");
    }

    struct Broken {
        base: BaseAgent,
    }

    #[async_trait]
    impl Agent for Broken {
        fn base(&self) -> &BaseAgent {
            &self.base
        }
        fn base_mut(&mut self) -> &mut BaseAgent {
            &mut self.base
        }
        async fn think(&mut self) -> Result<bool> {
            Err(crate::error::AgentError::tool("exploded"))
        }
        async fn act(&mut self) -> Result<String> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_error_sets_state_and_propagates() {
        let base = BaseAgent::new("broken", Arc::new(test_context()), Arc::new(MockLlmClient::new()))
            .with_max_steps(5);
        let mut agent = Broken { base };

        let err = agent.run("go").await.unwrap_err();
        assert!(err.to_string().contains("exploded"));
        assert_eq!(agent.state(), AgentState::Error);
        assert_eq!(agent.base().current_step, 1);
    }

    #[tokio::test]
    async fn test_execute_tools_maps_by_id() {
        let tools = ToolCollection::builder().tool(EchoTool).tool(FailingTool).build();
        let ctx = crate::context::AgentContext::builder("req", "q")
            .tools(Arc::new(tools))
            .build();
        let base = BaseAgent::new("exec", Arc::new(ctx), Arc::new(MockLlmClient::new()));

        let calls = vec![
            ToolCall::with_value("c1", "echo", &json!({"text": "ok"})),
            ToolCall::with_value("c2", "failing_tool", &json!({})),
            ToolCall::new("c3", "echo", "{not json"),
        ];
        let results = base.execute_tools(&calls).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results["c1"], "ok");
        assert_eq!(results["c2"], "Tool failing_tool Error.");
        assert_eq!(results["c3"], "Tool echo Error.");
    }

    #[test]
    fn test_truncate_observation_counts_chars() {
        let base = BaseAgent::new("t", Arc::new(test_context()), Arc::new(MockLlmClient::new()))
            .with_max_observe(3);
        assert_eq!(base.truncate_observation("数据分析".into()), "数据分");
        assert_eq!(base.truncate_observation("ab".into()), "ab");
    }
}
