// Agent request HTTP routes (SSE)
//
// Both endpoints stream GptProcessResult packets as SSE `data` frames. The
// SSE `id` is the packet's `<taskId>:<taskOrder>:<messageOrder>` event id;
// heartbeats and failure packets carry no id.

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event as SseEvent, Sse},
    routing::post,
    Json, Router,
};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::convert::Infallible;

use taskforge_core::GptProcessResult;

use crate::dto::{AgentRequest, GptQueryReq};
use crate::services::start_run;
use crate::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/AutoAgent", post(auto_agent))
        .route("/web/api/v1/gpt/queryAgentStreamIncr", post(query_agent_stream_incr))
        .with_state(state)
}

/// POST /AutoAgent - Run an agent request and stream its packets
pub async fn auto_agent(
    State(state): State<AppState>,
    Json(request): Json<AgentRequest>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    if request.query.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    tracing::info!(
        request_id = ?request.request_id,
        agent_type = request.agent_type,
        "AutoAgent: received request"
    );

    let packets = start_run(&state, request).await;
    Ok(to_sse(packets))
}

/// POST /web/api/v1/gpt/queryAgentStreamIncr - Simplified query surface
///
/// `deepThink == 0` runs the react agent, anything else plan-solve.
pub async fn query_agent_stream_incr(
    State(state): State<AppState>,
    Json(query): Json<GptQueryReq>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    if query.query.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    tracing::info!(
        session_id = ?query.session_id,
        trace_id = ?query.trace_id,
        deep_think = query.deep_think,
        user = ?query.user,
        "queryAgentStreamIncr: received request"
    );

    let request = query.into_agent_request(&state.config);
    let packets = start_run(&state, request).await;
    Ok(to_sse(packets))
}

fn to_sse(
    packets: BoxStream<'static, GptProcessResult>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let events = packets.map(|packet| {
        let json = serde_json::to_string(&packet).unwrap_or_else(|_| "{}".to_string());
        let event = SseEvent::default().data(json);
        Ok(match packet.event_id() {
            Some(id) => event.id(id),
            None => event,
        })
    });
    Sse::new(events)
}
