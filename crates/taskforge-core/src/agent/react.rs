// ReactAgent: tool-calling reason/act loop
//
// One type covers both tool-calling loops:
// - `ReactMode::Standalone`: the single-loop strategy answering the query
//   directly; finishing returns the model's last message verbatim
// - `ReactMode::PlanStep`: the executor of one plan sub-task; it frames the
//   task, assigns tool personas, reports `task_summary` on completion and
//   compacts tool turns out of memory
//
// Design decisions:
// - Prompt templates are rendered once at construction; only `{{files}}`
//   is re-rendered on every think because tools keep producing files
// - Observations are truncated to max_observe before entering memory
// - In struct-parse mode tool results are appended to the assistant turn
//   that requested them, since there are no tool-role turns on the wire

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{run_loop, Agent, BaseAgent};
use crate::config::{EngineConfig, FunctionCallType};
use crate::context::AgentContext;
use crate::error::Result;
use crate::file::format_file_info;
use crate::llm::{LlmClient, ToolChoice, ToolRequest};
use crate::message::{Message, ToolCall};
use crate::printer::PrinterEvent;
use crate::prompt::{self, render};
use crate::stream::message_type;
use crate::stream::response::value_text;
use crate::tools::tool_error_marker;

/// Joins a tool result onto the assistant turn in struct-parse mode
const STRUCT_PARSE_RESULT_PREFIX: &str = "\n 工具执行结果为:\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactMode {
    /// Answers the user query in a single loop
    Standalone,
    /// Executes one sub-task of a plan
    PlanStep,
}

pub struct ReactAgent {
    base: BaseAgent,
    mode: ReactMode,
    tool_calls: Vec<ToolCall>,
    system_template: String,
    next_step_template: String,
    struct_parse: bool,
    task_pre_prompt: String,
    task_complete_desc: String,
    clear_tool_message: bool,
    digital_employee_prompt: String,
    /// Memory length when the current `run` started
    run_start: usize,
}

impl ReactAgent {
    /// Executor for plan sub-tasks
    pub fn executor(
        context: Arc<AgentContext>,
        llm: Arc<dyn LlmClient>,
        config: &EngineConfig,
    ) -> Self {
        let catalogue = context.tool_collection.catalogue();
        let vars = [
            ("tools", catalogue.as_str()),
            ("query", context.query.as_str()),
            ("date", context.date_info.as_str()),
            ("sopPrompt", context.sop_prompt.as_str()),
            ("executorSopPrompt", config.executor.sop()),
        ];
        let system_template = render(config.executor.system(), &vars);
        let next_step_template = render(config.executor.next_step(), &vars);

        let base = BaseAgent::new("executor", context, llm)
            .with_description("an agent that can execute tool calls.")
            .with_max_steps(config.executor_max_steps)
            .with_max_observe(config.max_observe);

        Self {
            base,
            mode: ReactMode::PlanStep,
            tool_calls: Vec::new(),
            system_template,
            next_step_template,
            struct_parse: config.executor_llm.function_call_type == FunctionCallType::StructParse,
            task_pre_prompt: config.task_pre_prompt.clone(),
            task_complete_desc: config.task_complete_desc.clone(),
            clear_tool_message: config.clear_tool_message,
            digital_employee_prompt: config.digital_employee_prompt.clone(),
            run_start: 0,
        }
    }

    /// Standalone reason/act agent
    pub fn react(
        context: Arc<AgentContext>,
        llm: Arc<dyn LlmClient>,
        config: &EngineConfig,
    ) -> Self {
        let catalogue = context.tool_collection.catalogue();
        let vars = [
            ("tools", catalogue.as_str()),
            ("query", context.query.as_str()),
            ("date", context.date_info.as_str()),
            ("basePrompt", context.base_prompt.as_str()),
        ];
        let system_template = render(config.react.system(), &vars);
        let next_step_template = render(config.react.next_step(), &vars);

        let base = BaseAgent::new("react", context, llm)
            .with_description("an agent that can execute tool calls.")
            .with_max_steps(config.react_max_steps)
            .with_max_observe(config.max_observe);

        Self {
            base,
            mode: ReactMode::Standalone,
            tool_calls: Vec::new(),
            system_template,
            next_step_template,
            struct_parse: config.react_llm.function_call_type == FunctionCallType::StructParse,
            task_pre_prompt: String::new(),
            task_complete_desc: String::new(),
            clear_tool_message: false,
            digital_employee_prompt: String::new(),
            run_start: 0,
        }
    }

    pub fn mode(&self) -> ReactMode {
        self.mode
    }

    /// Tool calls requested by the latest model turn
    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.tool_calls
    }

    /// A fresh agent with the same configuration, starting from a copy of
    /// this agent's memory and state. Used for parallel sub-tasks.
    pub fn fork(&self) -> Self {
        let mut base = BaseAgent::new(
            self.base.name.clone(),
            self.base.context.clone(),
            self.base.llm.clone(),
        )
        .with_description(self.base.description.clone())
        .with_max_steps(self.base.max_steps)
        .with_max_observe(self.base.max_observe);
        base.state = self.base.state;
        base.memory = self.base.memory.clone();

        Self {
            base,
            mode: self.mode,
            tool_calls: Vec::new(),
            system_template: self.system_template.clone(),
            next_step_template: self.next_step_template.clone(),
            struct_parse: self.struct_parse,
            task_pre_prompt: self.task_pre_prompt.clone(),
            task_complete_desc: self.task_complete_desc.clone(),
            clear_tool_message: self.clear_tool_message,
            digital_employee_prompt: self.digital_employee_prompt.clone(),
            run_start: self.run_start,
        }
    }

    /// Leading text of the next-step prompt, identical on every render
    fn next_step_marker(&self) -> &str {
        self.next_step_template
            .split("{{files}}")
            .next()
            .unwrap_or_default()
    }

    async fn refresh_prompts(&mut self) {
        let files = self.base.context.product_files().await;
        let files = format_file_info(&files, true);
        self.base.system_prompt = render(&self.system_template, &[("files", &files)]);
        self.base.next_step_prompt = render(&self.next_step_template, &[("files", &files)]);
    }

    /// Ask the model for tool persona titles for `task`. Failures are logged
    /// and leave the previous assignment in place.
    pub async fn generate_digital_employee(&self, task: &str) {
        if task.is_empty() || self.digital_employee_prompt.trim().is_empty() {
            return;
        }
        let ctx = &self.base.context;
        let catalogue = ctx.tool_collection.catalogue();
        let prompt = render(
            &self.digital_employee_prompt,
            &[
                ("task", task),
                ("ToolsDesc", catalogue.as_str()),
                ("query", ctx.query.as_str()),
            ],
        );

        let reply = match self
            .base
            .llm
            .ask(ctx, &[Message::user(prompt)], &[], false, Some(0.01))
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                error!(request_id = %ctx.request_id, error = %e, "ReactAgent: digital employee generation failed");
                return;
            }
        };

        match parse_digital_employees(&reply) {
            Some(personas) => {
                info!(request_id = %ctx.request_id, personas = ?personas, "ReactAgent: digital employees assigned");
                ctx.tool_collection.update_digital_employees(personas).await;
                ctx.tool_collection.set_current_task(task).await;
            }
            None => {
                warn!(request_id = %ctx.request_id, reply = %reply, "ReactAgent: unparsable digital employee reply");
            }
        }
    }

    async fn report_tool_result(&self, call: &ToolCall, result: &str) -> Result<()> {
        if message_type::SILENT_TOOLS.contains(&call.name.as_str()) {
            return Ok(());
        }
        let ctx = &self.base.context;
        let tool_param = call
            .parsed_arguments()
            .unwrap_or_else(|_| Value::String(call.arguments.clone()));
        let persona = ctx.tool_collection.digital_employee(&call.name).await;
        ctx.printer
            .send(
                PrinterEvent::new(
                    message_type::TOOL_RESULT,
                    json!({
                        "toolName": call.name,
                        "toolParam": tool_param,
                        "toolResult": result,
                    }),
                )
                .with_digital_employee(persona),
            )
            .await
    }
}

/// Parse `{tool: persona}` from a reply that may wrap it in a ```json fence
pub fn parse_digital_employees(reply: &str) -> Option<HashMap<String, String>> {
    let parsed: serde_json::Map<String, Value> =
        serde_json::from_str(prompt::strip_json_fence(reply)).ok()?;
    Some(
        parsed
            .into_iter()
            .map(|(tool, persona)| (tool, value_text(&persona)))
            .collect(),
    )
}

#[async_trait]
impl Agent for ReactAgent {
    fn base(&self) -> &BaseAgent {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseAgent {
        &mut self.base
    }

    async fn think(&mut self) -> Result<bool> {
        self.refresh_prompts().await;
        self.base.ensure_user_turn();

        let ctx = self.base.context.clone();
        let stream = match self.mode {
            ReactMode::Standalone => {
                ctx.set_stream_message_type(message_type::TOOL_THOUGHT).await;
                ctx.is_stream
            }
            ReactMode::PlanStep => false,
        };

        let request = ToolRequest::new(
            self.base.memory.messages().to_vec(),
            ctx.tool_collection.definitions(),
        )
        .with_system(self.base.system_prompt.clone())
        .with_tool_choice(ToolChoice::Auto)
        .with_stream(stream);

        let response = match self.base.llm.ask_tool(&ctx, request).await {
            Ok(response) => response,
            Err(e) => {
                self.base.record_model_failure(&e);
                return Ok(false);
            }
        };
        self.tool_calls = response.tool_calls.clone();

        if !response.content.trim().is_empty() {
            match self.mode {
                ReactMode::PlanStep if self.tool_calls.is_empty() => {
                    let files = ctx.task_product_files().await;
                    ctx.printer
                        .send_message(
                            message_type::TASK_SUMMARY,
                            json!({
                                "taskSummary": response.content,
                                "fileList": files,
                            }),
                        )
                        .await?;
                }
                ReactMode::PlanStep => {
                    ctx.printer
                        .send_message(message_type::TOOL_THOUGHT, json!(response.content))
                        .await?;
                }
                ReactMode::Standalone if !stream => {
                    ctx.printer
                        .send_message(message_type::TOOL_THOUGHT, json!(response.content))
                        .await?;
                }
                ReactMode::Standalone => {}
            }
        }

        let turn = if response.has_tool_calls() && !self.struct_parse {
            Message::from_tool_calls(response.content, response.tool_calls)
        } else {
            Message::assistant(response.content)
        };
        self.base.memory.add(turn);
        Ok(true)
    }

    async fn act(&mut self) -> Result<String> {
        if self.tool_calls.is_empty() {
            self.base.state = super::AgentState::Finished;
            if self.mode == ReactMode::PlanStep {
                if self.clear_tool_message {
                    let marker = self.next_step_marker().to_string();
                    self.base.memory.clear_tool_context(self.run_start, &marker);
                }
                if !self.task_complete_desc.is_empty() {
                    return Ok(self.task_complete_desc.clone());
                }
            }
            return Ok(self
                .base
                .memory
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default());
        }

        let calls = self.tool_calls.clone();
        let mut results = self.base.execute_tools(&calls).await;
        let mut outputs = Vec::with_capacity(calls.len());

        for call in &calls {
            let result = results
                .remove(&call.id)
                .unwrap_or_else(|| tool_error_marker(&call.name));
            self.report_tool_result(call, &result).await?;

            let result = self.base.truncate_observation(result);
            if self.struct_parse {
                if let Some(last) = self.base.memory.last_mut() {
                    last.content.push_str(STRUCT_PARSE_RESULT_PREFIX);
                    last.content.push_str(&result);
                }
            } else {
                self.base
                    .memory
                    .add(Message::tool(result.clone(), call.id.clone()));
            }
            outputs.push(result);
        }

        Ok(outputs.join("\n\n"))
    }

    async fn run(&mut self, query: &str) -> Result<String> {
        self.run_start = self.base.memory.len();
        match self.mode {
            ReactMode::Standalone => run_loop(self, query).await,
            ReactMode::PlanStep => {
                self.generate_digital_employee(query).await;
                let request = format!("{}{}", self.task_pre_prompt, query);
                self.base.context.set_task(request.clone()).await;
                run_loop(self, &request).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentState;
    use crate::message::Role;
    use crate::testing::{test_config, EchoTool, MockLlmClient, MockReply, RecordingPrinter};
    use crate::tools::ToolCollection;

    fn context(printer: Arc<RecordingPrinter>) -> Arc<AgentContext> {
        let tools = ToolCollection::builder().tool(EchoTool).build();
        Arc::new(
            AgentContext::builder("req-react", "what is 2+2?")
                .tools(Arc::new(tools))
                .printer(printer)
                .build(),
        )
    }

    #[tokio::test]
    async fn test_react_finishes_with_last_message_verbatim() {
        let printer = Arc::new(RecordingPrinter::new());
        let llm = Arc::new(MockLlmClient::new());
        llm.push(MockReply::text("The answer is 4.")).await;

        let mut agent = ReactAgent::react(context(printer.clone()), llm, &test_config());
        let result = agent.run("what is 2+2?").await.unwrap();

        assert_eq!(result, "The answer is 4.");
        assert_eq!(agent.state(), AgentState::Finished);
        assert_eq!(agent.base().current_step, 1);
        assert_eq!(printer.types().await, vec!["tool_thought"]);
    }

    #[tokio::test]
    async fn test_react_tool_round_trip() {
        let printer = Arc::new(RecordingPrinter::new());
        let llm = Arc::new(MockLlmClient::new());
        llm.push(MockReply::tool_calls(
            "",
            vec![ToolCall::with_value("call_1", "echo", &json!({"text": "4"}))],
        ))
        .await;
        llm.push(MockReply::text("It is 4.")).await;

        let mut agent = ReactAgent::react(context(printer.clone()), llm.clone(), &test_config());
        let result = agent.run("what is 2+2?").await.unwrap();
        assert_eq!(result, "It is 4.");

        let roles: Vec<_> = agent.memory().messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::Tool, Role::User, Role::Assistant]
        );
        let tool_msg = &agent.memory().messages()[2];
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_msg.content, "4");

        let events = printer.events().await;
        let tool_result = events
            .iter()
            .find(|e| e.message_type == "tool_result")
            .unwrap();
        assert_eq!(tool_result.message["toolName"], "echo");
        assert_eq!(tool_result.message["toolParam"]["text"], "4");
        assert_eq!(llm.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_executor_reports_task_summary_and_compacts() {
        let printer = Arc::new(RecordingPrinter::new());
        let llm = Arc::new(MockLlmClient::new());
        llm.push(MockReply::tool_calls(
            "let me check",
            vec![ToolCall::with_value("c1", "echo", &json!({"text": "data"}))],
        ))
        .await;
        llm.push(MockReply::text("collected the data")).await;

        let config = test_config();
        let mut agent = ReactAgent::executor(context(printer.clone()), llm, &config);
        let result = agent.run("collect data").await.unwrap();

        assert_eq!(result, config.task_complete_desc);
        assert_eq!(agent.state(), AgentState::Finished);
        assert!(agent
            .memory()
            .messages()
            .iter()
            .all(|m| m.role != Role::Tool && !m.has_tool_calls()));
        assert_eq!(
            agent.memory().messages()[0].content,
            format!("{}collect data", config.task_pre_prompt)
        );
        assert_eq!(
            agent.base().context.task().await,
            format!("{}collect data", config.task_pre_prompt)
        );

        let types = printer.types().await;
        assert_eq!(types, vec!["tool_thought", "tool_result", "task_summary"]);
        let summary = printer.events().await.pop().unwrap();
        assert_eq!(summary.message["taskSummary"], "collected the data");
    }

    #[tokio::test]
    async fn test_model_failure_finishes_with_error_message() {
        let printer = Arc::new(RecordingPrinter::new());
        let llm = Arc::new(MockLlmClient::new());
        llm.push(MockReply::error("connection reset")).await;

        let mut agent = ReactAgent::react(context(printer), llm, &test_config());
        let result = agent.run("hi").await.unwrap();

        assert_eq!(result, crate::agent::THINK_ONLY_RESULT);
        assert_eq!(agent.state(), AgentState::Finished);
        assert!(agent.base().model_failure.is_some());
        let last = agent.memory().last().unwrap();
        assert!(last
            .content
            .starts_with("Error encountered while processing:"));
    }

    #[tokio::test]
    async fn test_observation_truncated() {
        let printer = Arc::new(RecordingPrinter::new());
        let llm = Arc::new(MockLlmClient::new());
        llm.push(MockReply::tool_calls(
            "",
            vec![ToolCall::with_value("c1", "echo", &json!({"text": "abcdefgh"}))],
        ))
        .await;
        llm.push(MockReply::text("done")).await;

        let config = test_config().with_max_observe(3);
        let mut agent = ReactAgent::react(context(printer.clone()), llm, &config);
        agent.run("q").await.unwrap();

        assert_eq!(agent.memory().messages()[2].content, "abc");
        // the client still sees the full result
        let events = printer.events().await;
        let tool_result = events.iter().find(|e| e.message_type == "tool_result").unwrap();
        assert_eq!(tool_result.message["toolResult"], "abcdefgh");
    }

    #[tokio::test]
    async fn test_digital_employee_generation() {
        let printer = Arc::new(RecordingPrinter::new());
        let ctx = context(printer);
        let llm = Arc::new(MockLlmClient::new());
        llm.push(MockReply::text("```json\n{\"echo\": \"Parrot\"}\n```")).await;

        let config = test_config().with_digital_employee_prompt("personas for {{task}}: {{ToolsDesc}}");
        let agent = ReactAgent::executor(ctx.clone(), llm.clone(), &config);
        agent.generate_digital_employee("repeat things").await;

        assert_eq!(
            ctx.tool_collection.digital_employee("echo").await.as_deref(),
            Some("Parrot")
        );
        assert_eq!(ctx.tool_collection.current_task().await, "repeat things");
        let calls = llm.calls().await;
        assert!(calls[0].contains("personas for repeat things"));
    }

    #[test]
    fn test_parse_digital_employees() {
        let parsed = parse_digital_employees("{\"search\": \"Analyst\", \"n\": 1}").unwrap();
        assert_eq!(parsed["search"], "Analyst");
        assert_eq!(parsed["n"], "1");
        assert!(parse_digital_employees("not json").is_none());
    }
}
