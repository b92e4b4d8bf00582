// HTTP surface tests: requests run against scripted models through the real router

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use taskforge_api::{build_router, AppState, ServerConfig};
use taskforge_core::testing::{test_config, EchoTool, MockLlmClient, MockReply};
use taskforge_core::{AgentModels, Tool, ToolCall};

fn app(llm: Arc<MockLlmClient>) -> Router {
    let state = AppState::new(test_config(), ServerConfig::default(), AgentModels::uniform(llm));
    build_router(state)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Packets carried by the SSE `data` lines
fn sse_packets(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

fn sse_ids(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("id:"))
        .map(|id| id.trim().to_string())
        .collect()
}

#[tokio::test]
async fn test_health() {
    let response = app(Arc::new(MockLlmClient::new()))
        .oneshot(get("/web/health"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn test_auto_agent_streams_until_result() {
    let llm = Arc::new(MockLlmClient::new());
    llm.push(MockReply::text("The answer is 42.")).await;
    llm.push(MockReply::text("42")).await;

    let response = app(llm.clone())
        .oneshot(post_json(
            "/AutoAgent",
            json!({
                "requestId": "req-api",
                "query": "what is six times seven",
                "agentType": 5
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_text(response).await;
    let packets: Vec<Value> = sse_packets(&body)
        .into_iter()
        .filter(|p| p["packageType"] != "heartbeat")
        .collect();
    assert_eq!(packets.len(), 2);
    assert!(packets.iter().all(|p| p["reqId"] == "req-api"));

    let last = packets.last().unwrap();
    assert_eq!(last["finished"], true);
    assert_eq!(last["status"], "success");
    assert_eq!(last["response"], "42");
    assert_eq!(last["resultMap"]["eventData"]["messageType"], "task");

    let ids = sse_ids(&body);
    assert_eq!(ids.len(), 2);
    assert!(ids.iter().all(|id| id.split(':').count() == 3));
    assert_eq!(llm.call_count().await, 2);
}

#[tokio::test]
async fn test_local_tools_reach_the_agent() {
    let llm = Arc::new(MockLlmClient::new());
    llm.push(MockReply::tool_calls(
        "",
        vec![ToolCall::with_value("call_1", "echo", &json!({"text": "4"}))],
    ))
    .await;
    llm.push(MockReply::text("It is 4.")).await;
    llm.push(MockReply::text("4")).await;

    let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(EchoTool)];
    let state = AppState::new(test_config(), ServerConfig::default(), AgentModels::uniform(llm))
        .with_tools(tools);

    let response = build_router(state)
        .oneshot(post_json(
            "/AutoAgent",
            json!({"requestId": "req-tools", "query": "what is 2+2", "agentType": 5}),
        ))
        .await
        .unwrap();

    let packets = sse_packets(&body_text(response).await);
    let tool_packet = packets
        .iter()
        .find(|p| p["resultMap"]["eventData"]["resultMap"]["messageType"] == "tool_result")
        .expect("tool_result packet");
    assert_eq!(
        tool_packet["resultMap"]["eventData"]["resultMap"]["toolResult"]["toolName"],
        "echo"
    );
    assert_eq!(packets.last().unwrap()["response"], "4");
}

#[tokio::test]
async fn test_unregistered_agent_type_fails() {
    let llm = Arc::new(MockLlmClient::new());
    let response = app(llm.clone())
        .oneshot(post_json(
            "/AutoAgent",
            json!({"requestId": "req-workflow", "query": "hello", "agentType": 4}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let packets = sse_packets(&body_text(response).await);
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0]["status"], "failed");
    assert_eq!(packets[0]["finished"], true);
    assert_eq!(packets[0]["errorMsg"], "No handler for agent type: 4");
    assert_eq!(llm.call_count().await, 0);
}

#[tokio::test]
async fn test_unknown_agent_code_fails() {
    let response = app(Arc::new(MockLlmClient::new()))
        .oneshot(post_json(
            "/AutoAgent",
            json!({"requestId": "req-bad", "query": "hello", "agentType": 42}),
        ))
        .await
        .unwrap();

    let packets = sse_packets(&body_text(response).await);
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0]["status"], "failed");
}

#[tokio::test]
async fn test_empty_query_is_rejected() {
    let response = app(Arc::new(MockLlmClient::new()))
        .oneshot(post_json("/AutoAgent", json!({"query": "  ", "agentType": 5})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_query_incr_runs_react_without_deep_think() {
    let llm = Arc::new(MockLlmClient::new());
    llm.push(MockReply::text("Paris.")).await;
    llm.push(MockReply::text("Paris")).await;

    let response = app(llm.clone())
        .oneshot(post_json(
            "/web/api/v1/gpt/queryAgentStreamIncr",
            json!({
                "query": "capital of France",
                "sessionId": "s-1",
                "traceId": "trace-1",
                "deepThink": 0
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let packets = sse_packets(&body_text(response).await);
    let last = packets.last().unwrap();
    assert_eq!(last["reqId"], "trace-1");
    assert_eq!(last["finished"], true);
    assert_eq!(last["response"], "Paris");
    assert_eq!(last["resultMap"]["agentType"], "5");
}

#[tokio::test]
async fn test_replay_after_stream() {
    let llm = Arc::new(MockLlmClient::new());
    llm.push(MockReply::text("The answer is 42.")).await;
    llm.push(MockReply::text("42")).await;
    let app = app(llm);

    let response = app
        .clone()
        .oneshot(post_json(
            "/AutoAgent",
            json!({"requestId": "req-replay", "query": "six times seven", "agentType": 5}),
        ))
        .await
        .unwrap();
    body_text(response).await;

    let response = app
        .clone()
        .oneshot(get("/web/api/v1/gpt/replay/req-replay"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let replay: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(replay["requestId"], "req-replay");
    assert_eq!(replay["messageCount"], 2);
    assert_eq!(replay["messages"].as_array().unwrap().len(), 2);

    let response = app
        .oneshot(get("/web/api/v1/gpt/replay/req-replay?fromOrder=1"))
        .await
        .unwrap();
    let replay: Value = serde_json::from_str(&body_text(response).await).unwrap();
    let messages = replay["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["seq"], 2);
}

#[tokio::test]
async fn test_replay_unknown_request() {
    let response = app(Arc::new(MockLlmClient::new()))
        .oneshot(get("/web/api/v1/gpt/replay/missing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_prefix_applies_to_agent_routes() {
    let server = ServerConfig {
        api_prefix: "/api".to_string(),
        ..ServerConfig::default()
    };
    let state = AppState::new(
        test_config(),
        server,
        AgentModels::uniform(Arc::new(MockLlmClient::new())),
    );
    let app = build_router(state);

    let empty = json!({"query": "", "agentType": 5});
    let response = app
        .clone()
        .oneshot(post_json("/api/AutoAgent", empty.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(post_json("/AutoAgent", empty))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get("/web/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
