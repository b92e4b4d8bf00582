// PlanningAgent and the `planning` tool
//
// The planner owns exactly one Plan, held by its PlanningTool. The model
// manipulates the plan through tool calls (`create`, `update`, `mark_step`,
// `finish`); the agent turns the plan state into the next sub-task.
//
// Design decisions:
// - With `planning_close_update` on, the model is consulted only until a
//   plan exists; afterwards each run simply advances the plan
// - The planning tool is the only tool offered to the model
// - A malformed plan command is answered with a descriptive tool error and
//   leaves the existing plan untouched

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{run_loop, Agent, AgentState, BaseAgent};
use crate::config::{EngineConfig, FunctionCallType};
use crate::context::AgentContext;
use crate::error::{AgentError, Result};
use crate::file::format_file_info;
use crate::llm::{LlmClient, ToolChoice, ToolRequest};
use crate::message::{Message, ToolCall};
use crate::plan::{Plan, StepStatus};
use crate::prompt::{render, TASK_SEPARATOR};
use crate::stream::message_type;
use crate::tools::{tool_error_marker, Tool, ToolExecutionResult};

pub const PLANNING_TOOL_NAME: &str = "planning";

/// Returned by the planner once every step is completed
pub const FINISH_SENTINEL: &str = "finish";

// ============================================================================
// PlanningTool
// ============================================================================

#[derive(Debug, Default)]
pub struct PlanningTool {
    plan: Mutex<Option<Plan>>,
}

impl PlanningTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current plan
    pub async fn plan(&self) -> Option<Plan> {
        self.plan.lock().await.clone()
    }

    pub async fn has_plan(&self) -> bool {
        self.plan.lock().await.is_some()
    }

    /// Advance the plan by one step, if a plan exists
    pub async fn step_plan(&self) {
        if let Some(plan) = self.plan.lock().await.as_mut() {
            plan.advance();
        }
    }

    /// Apply one planning command
    pub async fn apply(&self, args: &Value) -> Result<String> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AgentError::plan("Command is required"))?;

        let mut guard = self.plan.lock().await;
        match command {
            "create" => {
                let title = args.get("title").and_then(Value::as_str).unwrap_or_default();
                let steps = string_list(args.get("steps"));
                if title.is_empty() || steps.as_ref().map_or(true, Vec::is_empty) {
                    return Err(AgentError::plan(
                        "title and steps are required for create command",
                    ));
                }
                if guard.is_some() {
                    return Err(AgentError::plan(
                        "A plan already exists. Use update to modify it.",
                    ));
                }
                *guard = Some(Plan::create(title, steps.unwrap_or_default()));
                Ok("Plan created".to_string())
            }
            "update" => {
                let plan = guard
                    .as_mut()
                    .ok_or_else(|| AgentError::plan("No plan exists. Create a plan first."))?;
                let title = args
                    .get("title")
                    .and_then(Value::as_str)
                    .filter(|t| !t.is_empty())
                    .map(String::from);
                plan.update(title, string_list(args.get("steps")));
                Ok("Plan updated".to_string())
            }
            "mark_step" => {
                let plan = guard
                    .as_mut()
                    .ok_or_else(|| AgentError::plan("No plan exists. Create a plan first."))?;
                let raw_index = args
                    .get("step_index")
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| AgentError::plan("step_index is required for mark_step command"))?;
                let index = raw_index
                    .as_u64()
                    .map(|i| i as usize)
                    .ok_or_else(|| AgentError::plan(format!("Invalid step_index: {}", raw_index)))?;
                let status = match args.get("step_status").and_then(Value::as_str) {
                    Some(s) => Some(
                        StepStatus::parse(s)
                            .ok_or_else(|| AgentError::plan(format!("Invalid step_status: {}", s)))?,
                    ),
                    None => None,
                };
                let note = args
                    .get("step_notes")
                    .and_then(Value::as_str)
                    .map(String::from);
                plan.update_step_status(index, status, note)?;
                Ok(format!(
                    "Step {} marked as {}",
                    index,
                    status.map(|s| s.as_str()).unwrap_or("unchanged")
                ))
            }
            "finish" => {
                match guard.as_mut() {
                    Some(plan) => plan.finish(),
                    None => *guard = Some(Plan::default()),
                }
                Ok("Plan finished".to_string())
            }
            other => Err(AgentError::plan(format!("Unknown command: {}", other))),
        }
    }
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    value.and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect()
    })
}

#[async_trait]
impl Tool for PlanningTool {
    fn name(&self) -> &str {
        PLANNING_TOOL_NAME
    }

    fn description(&self) -> &str {
        "A planning tool that lets the agent create and manage plans for complex tasks: \
         create a plan, update its steps and track progress."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "enum": ["create", "update", "mark_step", "finish"],
                    "description": "The command to execute. Available commands: create, update, mark_step, finish"
                },
                "title": {
                    "type": "string",
                    "description": "Title for the plan. Required for create command, optional for update command."
                },
                "steps": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "List of plan steps. Required for create command, optional for update command."
                },
                "step_index": {
                    "type": "integer",
                    "description": "Index of the step to update (0-based). Required for mark_step command."
                },
                "step_status": {
                    "type": "string",
                    "enum": ["not_started", "in_progress", "completed", "blocked"],
                    "description": "Status to set for a step. Used with mark_step command."
                },
                "step_notes": {
                    "type": "string",
                    "description": "Additional notes for a step. Optional for mark_step command."
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, _ctx: &AgentContext, arguments: Value) -> ToolExecutionResult {
        match self.apply(&arguments).await {
            Ok(text) => ToolExecutionResult::success(text),
            Err(e) => ToolExecutionResult::tool_error(e.to_string()),
        }
    }
}

// ============================================================================
// PlanningAgent
// ============================================================================

pub struct PlanningAgent {
    base: BaseAgent,
    tool: PlanningTool,
    tool_calls: Vec<ToolCall>,
    system_template: String,
    next_step_template: String,
    close_update: bool,
    struct_parse: bool,
    plan_pre_prompt: String,
}

impl PlanningAgent {
    pub fn new(context: Arc<AgentContext>, llm: Arc<dyn LlmClient>, config: &EngineConfig) -> Self {
        let catalogue = context.tool_collection.catalogue();
        let vars = [
            ("tools", catalogue.as_str()),
            ("query", context.query.as_str()),
            ("date", context.date_info.as_str()),
            ("sopPrompt", context.sop_prompt.as_str()),
        ];
        let system_template = render(config.planner.system(), &vars);
        let next_step_template = render(config.planner.next_step(), &vars);

        let base = BaseAgent::new("planning", context, llm)
            .with_description("An agent that creates and manages plans to solve tasks")
            .with_max_steps(config.planner_max_steps)
            .with_max_observe(config.max_observe);

        Self {
            base,
            tool: PlanningTool::new(),
            tool_calls: Vec::new(),
            system_template,
            next_step_template,
            close_update: config.planning_close_update,
            struct_parse: config.planner_llm.function_call_type == FunctionCallType::StructParse,
            plan_pre_prompt: config.plan_pre_prompt.clone(),
        }
    }

    pub fn planning_tool(&self) -> &PlanningTool {
        &self.tool
    }

    pub async fn plan(&self) -> Option<Plan> {
        self.tool.plan().await
    }

    async fn refresh_prompts(&mut self) {
        let files = self.base.context.product_files().await;
        let files = format_file_info(&files, false);
        self.base.system_prompt = render(&self.system_template, &[("files", &files)]);
        self.base.next_step_prompt = render(&self.next_step_template, &[("files", &files)]);
    }

    async fn execute_planning_call(&self, call: &ToolCall) -> String {
        if call.name != PLANNING_TOOL_NAME {
            warn!(tool = %call.name, "PlanningAgent: model called a tool it was not offered");
            return tool_error_marker(&call.name);
        }
        match call.parsed_arguments() {
            Ok(args) => self
                .tool
                .execute(&self.base.context, args)
                .await
                .into_observation(&call.name, &call.id),
            Err(e) => {
                warn!(tool_call_id = %call.id, error = %e, "PlanningAgent: could not parse planning arguments");
                tool_error_marker(&call.name)
            }
        }
    }

    /// Turn the plan state into the planner's answer: `finish`, the current
    /// step (possibly several `<sep>`-separated sub-tasks), or empty.
    async fn next_task(&mut self) -> Result<String> {
        let Some(mut plan) = self.tool.plan().await else {
            return Ok(String::new());
        };
        let ctx = self.base.context.clone();

        if plan.is_complete() {
            self.base.state = AgentState::Finished;
            ctx.printer
                .send_message(message_type::PLAN, serde_json::to_value(&plan)?)
                .await?;
            info!(request_id = %ctx.request_id, "PlanningAgent: plan complete");
            return Ok(FINISH_SENTINEL.to_string());
        }

        if plan.current_index().is_none() {
            self.tool.step_plan().await;
            plan = self.tool.plan().await.unwrap_or(plan);
        }

        let Some(current) = plan.current_step().map(String::from) else {
            return Ok(String::new());
        };
        self.base.state = AgentState::Finished;
        ctx.printer
            .send_message(message_type::PLAN, serde_json::to_value(&plan)?)
            .await?;
        for task in split_sub_tasks(&current) {
            ctx.printer
                .send_message(message_type::TASK, Value::String(task))
                .await?;
        }
        info!(
            request_id = %ctx.request_id,
            step = plan.current_index().unwrap_or_default(),
            "PlanningAgent: next step selected"
        );
        Ok(current)
    }
}

/// Split a plan step into its parallel sub-tasks
pub fn split_sub_tasks(step: &str) -> Vec<String> {
    step.split(TASK_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[async_trait]
impl Agent for PlanningAgent {
    fn base(&self) -> &BaseAgent {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseAgent {
        &mut self.base
    }

    async fn think(&mut self) -> Result<bool> {
        self.refresh_prompts().await;

        if self.close_update && self.tool.has_plan().await {
            self.tool.step_plan().await;
            return Ok(true);
        }

        self.base.ensure_user_turn();
        let ctx = self.base.context.clone();
        ctx.set_stream_message_type(message_type::PLAN_THOUGHT).await;

        let request = ToolRequest::new(
            self.base.memory.messages().to_vec(),
            vec![self.tool.to_definition()],
        )
        .with_system(self.base.system_prompt.clone())
        .with_tool_choice(ToolChoice::Auto)
        .with_stream(ctx.is_stream);

        let response = match self.base.llm.ask_tool(&ctx, request).await {
            Ok(response) => response,
            Err(e) => {
                self.base.record_model_failure(&e);
                return Ok(false);
            }
        };
        self.tool_calls = response.tool_calls.clone();

        if !ctx.is_stream && !response.content.is_empty() {
            ctx.printer
                .send_message(message_type::PLAN_THOUGHT, json!(response.content))
                .await?;
        }
        info!(
            request_id = %ctx.request_id,
            tool_calls = self.tool_calls.len(),
            "PlanningAgent: model replied"
        );

        let turn = if response.has_tool_calls() && !self.struct_parse {
            Message::from_tool_calls(response.content, response.tool_calls)
        } else {
            Message::assistant(response.content)
        };
        self.base.memory.add(turn);
        Ok(true)
    }

    async fn act(&mut self) -> Result<String> {
        if self.close_update && self.tool.has_plan().await && self.tool_calls.is_empty() {
            return self.next_task().await;
        }

        let calls = std::mem::take(&mut self.tool_calls);
        let mut results = Vec::with_capacity(calls.len());
        for call in &calls {
            let result = self.base.truncate_observation(self.execute_planning_call(call).await);
            if self.struct_parse {
                if let Some(last) = self.base.memory.last_mut() {
                    last.content.push_str("\n 工具执行结果为:\n");
                    last.content.push_str(&result);
                }
            } else {
                self.base
                    .memory
                    .add(Message::tool(result.clone(), call.id.clone()));
            }
            results.push(result);
        }

        if self.tool.has_plan().await {
            if self.close_update {
                self.tool.step_plan().await;
            }
            return self.next_task().await;
        }
        Ok(results.join("\n\n"))
    }

    async fn run(&mut self, query: &str) -> Result<String> {
        let request = if self.tool.has_plan().await {
            query.to_string()
        } else {
            format!("{}{}", self.plan_pre_prompt, query)
        };
        run_loop(self, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, MockLlmClient, MockReply, RecordingPrinter};

    fn create_call(steps: &[&str]) -> ToolCall {
        ToolCall::with_value(
            "plan_1",
            PLANNING_TOOL_NAME,
            &json!({"command": "create", "title": "Compare", "steps": steps}),
        )
    }

    fn planner(llm: Arc<MockLlmClient>, config: &EngineConfig) -> (PlanningAgent, Arc<RecordingPrinter>) {
        let printer = Arc::new(RecordingPrinter::new());
        let ctx = Arc::new(
            AgentContext::builder("req-plan", "compare X and Y")
                .printer(printer.clone())
                .build(),
        );
        (PlanningAgent::new(ctx, llm, config), printer)
    }

    #[tokio::test]
    async fn test_plan_tool_errors_leave_plan_untouched() {
        let tool = PlanningTool::new();

        let err = tool.apply(&json!({})).await.unwrap_err();
        assert!(err.to_string().contains("Command is required"));

        let err = tool
            .apply(&json!({"command": "mark_step", "step_index": 0}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No plan exists"));

        tool.apply(&json!({"command": "create", "title": "t", "steps": ["a", "b"]}))
            .await
            .unwrap();
        let before = tool.plan().await;

        for bad in [
            json!({"command": "create", "title": "t", "steps": ["x"]}),
            json!({"command": "mark_step"}),
            json!({"command": "mark_step", "step_index": 7, "step_status": "completed"}),
            json!({"command": "mark_step", "step_index": 0, "step_status": "done"}),
            json!({"command": "delete"}),
        ] {
            assert!(tool.apply(&bad).await.is_err(), "{} should fail", bad);
        }
        assert_eq!(tool.plan().await, before);
    }

    #[tokio::test]
    async fn test_plan_tool_commands() {
        let tool = PlanningTool::new();
        tool.apply(&json!({"command": "create", "title": "t", "steps": ["a", "b"]}))
            .await
            .unwrap();
        tool.apply(&json!({"command": "mark_step", "step_index": 0, "step_status": "completed", "step_notes": "ok"}))
            .await
            .unwrap();
        tool.apply(&json!({"command": "update", "steps": ["a", "c"]}))
            .await
            .unwrap();

        let plan = tool.plan().await.unwrap();
        assert_eq!(plan.steps(), &["a", "c"]);
        assert_eq!(plan.step_status()[0], StepStatus::Completed);
        assert_eq!(plan.notes()[0], "ok");

        tool.apply(&json!({"command": "finish"})).await.unwrap();
        assert!(tool.plan().await.unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_planner_creates_plan_and_returns_first_step() {
        let llm = Arc::new(MockLlmClient::new());
        llm.push(MockReply::tool_calls(
            "I will research both.",
            vec![create_call(&["执行顺序1.调研：research X<sep>research Y", "执行顺序2.总结：write"])],
        ))
        .await;

        let (mut agent, printer) = planner(llm.clone(), &test_config());
        let result = agent.run("compare X and Y").await.unwrap();

        assert_eq!(result, "执行顺序1.调研：research X<sep>research Y");
        assert_eq!(agent.state(), AgentState::Finished);
        assert_eq!(
            agent.memory().messages()[0].content,
            "分析问题并制定计划：compare X and Y"
        );
        assert_eq!(
            printer.types().await,
            vec!["plan_thought", "plan", "task", "task"]
        );

        // next run advances without asking the model
        let next = agent.run("both researched").await.unwrap();
        assert_eq!(next, "执行顺序2.总结：write");
        let done = agent.run("written").await.unwrap();
        assert_eq!(done, FINISH_SENTINEL);
        assert_eq!(llm.call_count().await, 1);
        assert!(agent.plan().await.unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_dynamic_mode_consults_model_each_run() {
        let llm = Arc::new(MockLlmClient::new());
        llm.push(MockReply::tool_calls("", vec![create_call(&["a", "b"])]))
            .await;
        llm.push(MockReply::tool_calls(
            "",
            vec![ToolCall::with_value(
                "p2",
                PLANNING_TOOL_NAME,
                &json!({"command": "finish"}),
            )],
        ))
        .await;

        let config = test_config().with_planning_close_update(false);
        let (mut agent, _printer) = planner(llm.clone(), &config);

        assert_eq!(agent.run("q").await.unwrap(), "a");
        assert_eq!(agent.run("a done").await.unwrap(), FINISH_SENTINEL);
        assert_eq!(llm.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_planner_model_failure_is_recorded() {
        let llm = Arc::new(MockLlmClient::new());
        llm.push(MockReply::error("timeout")).await;

        let (mut agent, _printer) = planner(llm, &test_config());
        agent.run("q").await.unwrap();

        assert_eq!(agent.state(), AgentState::Finished);
        assert!(agent.base().model_failure.is_some());
        assert!(agent.plan().await.is_none());
    }

    #[test]
    fn test_split_sub_tasks() {
        assert_eq!(split_sub_tasks(" a <sep>b<sep> "), vec!["a", "b"]);
        assert_eq!(split_sub_tasks("single"), vec!["single"]);
    }
}
