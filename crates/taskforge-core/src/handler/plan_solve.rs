// Plan-solve orchestration
//
// The planner produces a step; the executor works it (fanning out when the
// step holds several `<sep>`-separated sub-tasks); the executor's output
// goes back to the planner. When the planner answers `finish`, the summary
// agent condenses the executor transcript into the final result.
//
// Design decisions:
// - Parallel sub-tasks run on forks of the primary executor, each with a
//   private copy of its memory; forks are merged back in dispatch order
// - Fan-out joins every fork before the first failure is propagated
// - Any error ends the request with the error terminal message

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{
    send_task_result, send_terminal, AgentHandler, AgentModels, AgentType,
    MAX_ITERATIONS_MESSAGE, TASK_ERROR_MESSAGE,
};
use crate::agent::planning::{split_sub_tasks, FINISH_SENTINEL};
use crate::agent::{Agent, AgentState, PlanningAgent, ReactAgent, SummaryAgent};
use crate::config::EngineConfig;
use crate::context::AgentContext;
use crate::error::Result;
use crate::prompt::render;

/// Prefix put in front of every sub-task handed to an executor
pub const SUB_TASK_PREFIX: &str = "你的任务是：";

pub struct PlanSolveHandler {
    config: Arc<EngineConfig>,
    models: AgentModels,
}

enum Outcome {
    Finished,
    StepLimit,
    Failed,
}

impl PlanSolveHandler {
    pub fn new(config: Arc<EngineConfig>, models: AgentModels) -> Self {
        Self { config, models }
    }

    async fn orchestrate(&self, ctx: Arc<AgentContext>, query: &str) -> Result<Outcome> {
        let mut planner = PlanningAgent::new(ctx.clone(), self.models.planner.clone(), &self.config);
        let mut executor = ReactAgent::executor(ctx.clone(), self.models.executor.clone(), &self.config);
        let summary = SummaryAgent::new(
            ctx.clone(),
            self.models.summary.clone(),
            render(&self.config.summary_system_prompt, &[("query", query)]),
            self.config.message_size_limit,
        );

        let mut planning_result = planner.run(&ctx.query).await?;
        if planner.base().model_failure.is_some() {
            return Ok(Outcome::Failed);
        }

        for iteration in 0..=self.config.planner_max_steps {
            let tasks: Vec<String> = split_sub_tasks(&planning_result)
                .into_iter()
                .map(|task| format!("{}{}", SUB_TASK_PREFIX, task))
                .collect();
            info!(
                request_id = %ctx.request_id,
                iteration,
                sub_tasks = tasks.len(),
                "PlanSolve: dispatching step"
            );

            ctx.clear_task_product_files().await;
            let executor_result = match tasks.as_slice() {
                [single] => executor.run(single).await?,
                _ => fan_out(&mut executor, &tasks).await?,
            };

            planning_result = planner.run(&executor_result).await?;
            if planner.base().model_failure.is_some() {
                return Ok(Outcome::Failed);
            }

            if planning_result == FINISH_SENTINEL {
                let result = summary
                    .summary_task_result(executor.memory().messages(), query)
                    .await;
                send_task_result(&ctx, result).await?;
                return Ok(Outcome::Finished);
            }
            if planner.state() == AgentState::Idle || executor.state() == AgentState::Idle {
                return Ok(Outcome::StepLimit);
            }
            if planner.state() == AgentState::Error || executor.state() == AgentState::Error {
                return Ok(Outcome::Failed);
            }
        }

        warn!(request_id = %ctx.request_id, "PlanSolve: iteration budget exhausted");
        Ok(Outcome::StepLimit)
    }
}

/// Run each sub-task on a fork of `executor` and merge the forks' new
/// messages back in dispatch order. Returns the sub-task results joined by
/// newlines, also in dispatch order.
pub async fn fan_out(executor: &mut ReactAgent, tasks: &[String]) -> Result<String> {
    let memory_index = executor.memory().len();
    let mut forks: Vec<ReactAgent> = tasks.iter().map(|_| executor.fork()).collect();

    let results = join_all(
        forks
            .iter_mut()
            .zip(tasks)
            .map(|(fork, task)| fork.run(task)),
    )
    .await;

    for fork in &forks {
        let produced = fork.memory().since(memory_index).to_vec();
        executor.base_mut().memory.extend(produced);
        executor.base_mut().state = fork.state();
    }
    drop(forks);

    let mut outputs = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(output) => outputs.push(output),
            Err(e) => {
                executor.base_mut().state = AgentState::Error;
                return Err(e);
            }
        }
    }
    Ok(outputs.join("\n"))
}

#[async_trait]
impl AgentHandler for PlanSolveHandler {
    fn agent_type(&self) -> AgentType {
        AgentType::PlanSolve
    }

    async fn handle(&self, ctx: Arc<AgentContext>, query: &str) -> Result<()> {
        let outcome = match self.orchestrate(ctx.clone(), query).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(request_id = %ctx.request_id, error = %e, "PlanSolve: run failed");
                Outcome::Failed
            }
        };
        match outcome {
            Outcome::Finished => Ok(()),
            Outcome::StepLimit => send_terminal(&ctx, MAX_ITERATIONS_MESSAGE).await,
            Outcome::Failed => send_terminal(&ctx, TASK_ERROR_MESSAGE).await,
        }
    }
}
