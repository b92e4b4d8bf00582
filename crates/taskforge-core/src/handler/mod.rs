// Handler dispatch by agent type
//
// A request names an agent type; the registry maps that type to the
// strategy that drives the agents for the request. The registry is built
// once at startup and shared.
//
// Design decisions:
// - Enum-keyed map instead of name-based lookup
// - Types without a handler fail with UnknownAgentType, never a panic
// - Every handler ends a request with exactly one `result` event

pub mod plan_solve;
pub mod react;

pub use plan_solve::PlanSolveHandler;
pub use react::ReactHandler;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::agent::TaskSummary;
use crate::config::EngineConfig;
use crate::context::AgentContext;
use crate::error::{AgentError, Result};
use crate::llm::LlmClient;
use crate::stream::message_type;

/// Terminal text when an agent hits its step limit
pub const MAX_ITERATIONS_MESSAGE: &str = "达到最大迭代次数，任务终止。";

/// Terminal text when an agent fails
pub const TASK_ERROR_MESSAGE: &str = "任务执行异常，请联系管理员，任务终止。";

// ============================================================================
// AgentType
// ============================================================================

/// Agent type codes carried on requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentType {
    Comprehensive,
    Workflow,
    PlanSolve,
    Router,
    React,
}

impl AgentType {
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            1 => Ok(AgentType::Comprehensive),
            2 => Ok(AgentType::Workflow),
            3 => Ok(AgentType::PlanSolve),
            4 => Ok(AgentType::Router),
            5 => Ok(AgentType::React),
            other => Err(AgentError::UnknownAgentType(other)),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            AgentType::Comprehensive => 1,
            AgentType::Workflow => 2,
            AgentType::PlanSolve => 3,
            AgentType::Router => 4,
            AgentType::React => 5,
        }
    }
}

impl Serialize for AgentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for AgentType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = i32::deserialize(deserializer)?;
        AgentType::from_code(code).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Models
// ============================================================================

/// Model clients for each agent role
#[derive(Clone)]
pub struct AgentModels {
    pub planner: Arc<dyn LlmClient>,
    pub executor: Arc<dyn LlmClient>,
    pub react: Arc<dyn LlmClient>,
    pub summary: Arc<dyn LlmClient>,
}

impl AgentModels {
    /// Same client for every role
    pub fn uniform(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            planner: llm.clone(),
            executor: llm.clone(),
            react: llm.clone(),
            summary: llm,
        }
    }
}

impl std::fmt::Debug for AgentModels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentModels")
            .field("planner", &self.planner.model_name())
            .field("executor", &self.executor.model_name())
            .field("react", &self.react.model_name())
            .field("summary", &self.summary.model_name())
            .finish()
    }
}

// ============================================================================
// Handler trait and registry
// ============================================================================

#[async_trait]
pub trait AgentHandler: Send + Sync {
    fn agent_type(&self) -> AgentType;

    /// Drive the agents for one request. `query` is the user's query before
    /// any output-style suffix; the agents read the styled query from the
    /// context.
    async fn handle(&self, ctx: Arc<AgentContext>, query: &str) -> Result<()>;
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<AgentType, Arc<dyn AgentHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the plan-solve and react handlers
    pub fn with_defaults(config: Arc<EngineConfig>, models: AgentModels) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PlanSolveHandler::new(config.clone(), models.clone())));
        registry.register(Arc::new(ReactHandler::new(config, models)));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn AgentHandler>) {
        self.handlers.insert(handler.agent_type(), handler);
    }

    pub fn get(&self, agent_type: AgentType) -> Result<Arc<dyn AgentHandler>> {
        self.handlers
            .get(&agent_type)
            .cloned()
            .ok_or(AgentError::UnknownAgentType(agent_type.code()))
    }

    /// Look up the handler for the context's agent type and run it
    pub async fn dispatch(&self, ctx: Arc<AgentContext>, query: &str) -> Result<()> {
        let handler = self.get(ctx.agent_type)?;
        info!(
            request_id = %ctx.request_id,
            agent_type = ctx.agent_type.code(),
            "HandlerRegistry: dispatching request"
        );
        handler.handle(ctx, query).await
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<i32> = self.handlers.keys().map(AgentType::code).collect();
        types.sort_unstable();
        f.debug_struct("HandlerRegistry").field("agent_types", &types).finish()
    }
}

// ============================================================================
// Terminal events
// ============================================================================

/// `{taskSummary, fileList}`: the summary's own files, else every
/// deliverable product file, most recent first
pub async fn task_result(ctx: &AgentContext, summary: TaskSummary) -> Value {
    let files = if summary.files.is_empty() {
        ctx.deliverable_files().await
    } else {
        summary.files
    };
    json!({
        "taskSummary": summary.summary,
        "fileList": files,
    })
}

pub(crate) async fn send_task_result(ctx: &AgentContext, summary: TaskSummary) -> Result<()> {
    let result = task_result(ctx, summary).await;
    ctx.printer.send_message(message_type::RESULT, result).await
}

pub(crate) async fn send_terminal(ctx: &AgentContext, text: &str) -> Result<()> {
    info!(request_id = %ctx.request_id, message = %text, "Handler: terminal message");
    ctx.printer
        .send_message(message_type::RESULT, Value::String(text.to_string()))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::File;
    use crate::testing::{test_config, MockLlmClient};

    #[test]
    fn test_agent_type_codes() {
        for code in 1..=5 {
            assert_eq!(AgentType::from_code(code).unwrap().code(), code);
        }
        assert!(matches!(
            AgentType::from_code(9),
            Err(AgentError::UnknownAgentType(9))
        ));
        assert_eq!(serde_json::to_value(AgentType::React).unwrap(), json!(5));
        let parsed: AgentType = serde_json::from_value(json!(3)).unwrap();
        assert_eq!(parsed, AgentType::PlanSolve);
        assert!(serde_json::from_value::<AgentType>(json!(0)).is_err());
    }

    #[test]
    fn test_registry_rejects_types_without_handler() {
        let models = AgentModels::uniform(Arc::new(MockLlmClient::new()));
        let registry = HandlerRegistry::with_defaults(Arc::new(test_config()), models);

        assert!(registry.get(AgentType::PlanSolve).is_ok());
        assert!(registry.get(AgentType::React).is_ok());
        for missing in [AgentType::Comprehensive, AgentType::Workflow, AgentType::Router] {
            match registry.get(missing) {
                Err(AgentError::UnknownAgentType(code)) => assert_eq!(code, missing.code()),
                _ => panic!("{:?} should have no handler", missing),
            }
        }
    }

    #[tokio::test]
    async fn test_task_result_falls_back_to_deliverables() {
        let ctx = AgentContext::builder("req", "q").build();
        ctx.add_product_file(File::new("a.md", "")).await;
        ctx.add_product_file(File::new("raw.txt", "").internal()).await;
        ctx.add_product_file(File::new("b.md", "")).await;

        let value = task_result(&ctx, TaskSummary::text("done")).await;
        assert_eq!(value["taskSummary"], "done");
        let names: Vec<&str> = value["fileList"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["fileName"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["b.md", "a.md"]);

        let own = TaskSummary {
            summary: "done".into(),
            files: vec![File::new("a.md", "")],
        };
        let value = task_result(&ctx, own).await;
        assert_eq!(value["fileList"].as_array().unwrap().len(), 1);
    }
}
