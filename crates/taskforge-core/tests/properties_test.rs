//! Behavioral properties of the agent loop, plans, tool batches and the
//! event ordering ledger
//!
//! Run with: cargo test -p taskforge-core --test properties_test

use std::sync::Arc;

use serde_json::json;

use taskforge_core::agent::PLANNING_TOOL_NAME;
use taskforge_core::handler::{AgentHandler, PlanSolveHandler};
use taskforge_core::stream::IncrementalResultBuilder;
use taskforge_core::testing::{
    recording_context, test_config, EchoTool, FailingTool, MockLlmClient, MockReply, SleepyTool,
};
use taskforge_core::{
    Agent, AgentContext, AgentModels, AgentState, AgentType, BaseAgent, EventResult, Plan,
    ReactAgent, StepStatus, StreamPrinter, ToolCall, ToolCollection,
};

#[tokio::test]
async fn test_react_agent_stops_at_step_limit() {
    let llm = Arc::new(MockLlmClient::new());
    for i in 0..10 {
        llm.push(MockReply::tool_calls(
            "",
            vec![ToolCall::with_value(format!("c{}", i), "echo", &json!({"text": "again"}))],
        ))
        .await;
    }
    let tools = ToolCollection::builder().tool(EchoTool).build();
    let (ctx, _printer) = recording_context("loop", tools);
    let config = test_config().with_max_steps(10, 10, 3);

    let mut agent = ReactAgent::react(ctx, llm.clone(), &config);
    let result = agent.run("loop").await.unwrap();

    assert_eq!(result, "Terminated: Reached max steps (3)");
    assert_eq!(agent.state(), AgentState::Idle);
    assert_eq!(agent.base().current_step, 0);
    // step 4 never ran
    assert_eq!(llm.call_count().await, 3);
}

#[test]
fn test_plan_advance_k_times() {
    for k in 1..6 {
        let steps = (0..k).map(|i| format!("step {}", i)).collect();
        let mut plan = Plan::create("t", steps);

        // the first advance starts step 0; k more complete the plan
        plan.advance();
        assert_eq!(plan.current_index(), Some(0));
        for _ in 0..k {
            plan.advance();
        }
        assert_eq!(plan.step_status()[k - 1], StepStatus::Completed);
        assert!(plan.is_complete());
        assert!(plan.current_index().is_none());

        let snapshot = plan.clone();
        plan.advance();
        assert_eq!(plan, snapshot);
    }
}

#[test]
fn test_order_counters_are_per_key() {
    let mut ledger = EventResult::new();
    let mut a = Vec::new();
    let mut b = Vec::new();
    for i in 0..20 {
        a.push(ledger.get_and_incr_order("tool_thought"));
        if i % 3 == 0 {
            b.push(ledger.get_and_incr_order("markdown"));
        }
    }
    assert_eq!(a, (1..=20).collect::<Vec<u64>>());
    assert_eq!(b, (1..=7).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_tool_batch_isolates_failures() {
    let tools = ToolCollection::builder()
        .tool(EchoTool)
        .tool(FailingTool)
        .tool(SleepyTool)
        .build();
    let ctx = AgentContext::builder("req-batch", "q")
        .tools(Arc::new(tools))
        .build();
    let base = BaseAgent::new("batch", Arc::new(ctx), Arc::new(MockLlmClient::new()));

    let results = base
        .execute_tools(&[
            ToolCall::with_value("c1", "echo", &json!({"text": "ok"})),
            ToolCall::with_value("c2", "failing_tool", &json!({})),
            ToolCall::with_value("c3", "sleepy", &json!({"millis": 5})),
            ToolCall::with_value("c4", "not_registered", &json!({})),
        ])
        .await;

    assert_eq!(results["c1"], "ok");
    assert_eq!(results["c2"], "Tool failing_tool Error.");
    assert_eq!(results["c3"], "slept 5");
    assert_eq!(results["c4"], "Tool not_registered Error.");
}

#[tokio::test]
async fn test_streamed_plan_solve_is_replayable() {
    let llm = Arc::new(MockLlmClient::new());
    llm.push(MockReply::tool_calls(
        "plan it",
        vec![ToolCall::with_value(
            "p1",
            PLANNING_TOOL_NAME,
            &json!({"command": "create", "title": "t", "steps": ["执行顺序1.查询：look up"]}),
        )],
    ))
    .await;
    llm.push(MockReply::tool_calls(
        "",
        vec![ToolCall::with_value("c1", "echo", &json!({"text": "found"}))],
    ))
    .await;
    llm.push(MockReply::text("looked up")).await;
    llm.push(MockReply::text("All done.")).await;

    let (printer, mut rx) = StreamPrinter::channel("req-stream", AgentType::PlanSolve, 64);
    let printer = Arc::new(printer);
    let tools = ToolCollection::builder().tool(EchoTool).build();
    let ctx = Arc::new(
        AgentContext::builder("req-stream", "look it up")
            .tools(Arc::new(tools))
            .printer(printer.clone())
            .build(),
    );

    let handler = PlanSolveHandler::new(Arc::new(test_config()), AgentModels::uniform(llm));
    let run = tokio::spawn(async move { handler.handle(ctx, "look it up").await });

    let mut builder = IncrementalResultBuilder::new("req-stream");
    let mut packets = Vec::new();
    while let Some(response) = rx.recv().await {
        let packet = builder.build(&response);
        let finished = packet.finished;
        packets.push(packet);
        if finished {
            break;
        }
    }
    run.await.unwrap().unwrap();

    let last = packets.last().unwrap();
    assert!(last.finished);
    assert_eq!(last.status, "success");
    assert_eq!(last.response, "All done.");

    // every packet carries its own message id
    let mut ids: Vec<String> = packets
        .iter()
        .filter_map(|p| p.result_map.as_ref())
        .map(|r| r.event_data.message_id.clone())
        .collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);

    let ledger = builder.event_result();
    assert_eq!(ledger.message_count as usize, packets.len());
    let replay = ledger.replay_from(2);
    assert_eq!(replay.len(), packets.len() - 2);
    assert_eq!(replay[0].seq, 3);

    let cached = ledger.result_map();
    assert!(cached.contains_key("plan"));
    assert!(cached.contains_key("plan_thought"));
    assert_eq!(ledger.tasks().len(), 1);
}
