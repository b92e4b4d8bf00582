// Single reason/act loop followed by a summary

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use super::{send_task_result, send_terminal, AgentHandler, AgentModels, AgentType, TASK_ERROR_MESSAGE};
use crate::agent::{Agent, ReactAgent, SummaryAgent};
use crate::config::EngineConfig;
use crate::context::AgentContext;
use crate::error::Result;
use crate::prompt::render;

pub struct ReactHandler {
    config: Arc<EngineConfig>,
    models: AgentModels,
}

impl ReactHandler {
    pub fn new(config: Arc<EngineConfig>, models: AgentModels) -> Self {
        Self { config, models }
    }
}

#[async_trait]
impl AgentHandler for ReactHandler {
    fn agent_type(&self) -> AgentType {
        AgentType::React
    }

    async fn handle(&self, ctx: Arc<AgentContext>, query: &str) -> Result<()> {
        let mut agent = ReactAgent::react(ctx.clone(), self.models.react.clone(), &self.config);
        let summary = SummaryAgent::new(
            ctx.clone(),
            self.models.summary.clone(),
            render(&self.config.summary_system_prompt, &[("query", query)]),
            self.config.message_size_limit,
        );

        if let Err(e) = agent.run(&ctx.query).await {
            error!(request_id = %ctx.request_id, error = %e, "React: run failed");
            return send_terminal(&ctx, TASK_ERROR_MESSAGE).await;
        }
        info!(
            request_id = %ctx.request_id,
            state = %agent.state(),
            steps = agent.base().current_step,
            "React: loop finished"
        );

        let result = summary
            .summary_task_result(agent.memory().messages(), query)
            .await;
        send_task_result(&ctx, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, MockLlmClient, MockReply, RecordingPrinter};
    use serde_json::json;

    #[tokio::test]
    async fn test_react_answers_then_summarizes() {
        let llm = Arc::new(MockLlmClient::new());
        llm.push(MockReply::text("The answer is 42.")).await;
        llm.push(MockReply::text("42")).await;

        let printer = Arc::new(RecordingPrinter::new());
        let ctx = Arc::new(
            AgentContext::builder("req-react", "what is six times seven")
                .agent_type(AgentType::React)
                .printer(printer.clone())
                .build(),
        );
        let handler = ReactHandler::new(Arc::new(test_config()), AgentModels::uniform(llm.clone()));
        handler.handle(ctx, "what is six times seven").await.unwrap();

        assert_eq!(printer.types().await, vec!["tool_thought", "result"]);
        let events = printer.events().await;
        assert_eq!(
            events[1].message,
            json!({"taskSummary": "42", "fileList": []})
        );
        assert_eq!(llm.call_count().await, 2);
        assert!(llm.calls().await[1].contains("role:assistant content:The answer is 42."));
    }
}
