// Run service: starts one agent request and turns its events into packets
//
// Design decisions:
// - The handler runs on its own task; the caller only sees a packet stream
// - Packets are built in arrival order by the request's IncrementalResultBuilder
// - While the request is idle a heartbeat packet is emitted every interval
// - A request whose agent type has no handler yields one failed packet

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use taskforge_core::{
    failure, heartbeat, AgentContext, AgentResponse, AgentType, GptProcessResult, Printer,
    StreamPrinter, ToolCollection,
};

use super::registry::SharedBuilder;
use crate::dto::AgentRequest;
use crate::AppState;

/// Error text of the packet sent when the event channel closes before a result
pub const INCOMPLETE_MESSAGE: &str = "request ended without a result";

/// Start `request` and return the packets it produces
pub async fn start_run(state: &AppState, request: AgentRequest) -> BoxStream<'static, GptProcessResult> {
    let request_id = request
        .request_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    let agent_type = match AgentType::from_code(request.agent_type)
        .and_then(|agent_type| state.handlers.get(agent_type).map(|_| agent_type))
    {
        Ok(agent_type) => agent_type,
        Err(e) => {
            warn!(request_id = %request_id, agent_type = request.agent_type, error = %e, "Run: rejected request");
            return stream::once(async move { failure(&request_id, e.to_string()) }).boxed();
        }
    };

    info!(
        request_id = %request_id,
        agent_type = agent_type.code(),
        is_stream = request.is_stream,
        "Run: starting request"
    );

    let builder = state.requests.start(&request_id);
    let (printer, rx) = StreamPrinter::channel(&request_id, agent_type, state.server.channel_capacity);
    let printer: Arc<dyn Printer> = Arc::new(printer);
    let tools = build_tools(state).await;

    let styled_query = state
        .config
        .styled_query(&request.query, request.output_style.as_deref());
    let ctx = Arc::new(
        AgentContext::builder(&request_id, styled_query)
            .session_id(&request_id)
            .stream(request.is_stream)
            .sop_prompt(request.sop_prompt)
            .base_prompt(request.base_prompt)
            .output_style(request.output_style)
            .agent_type(agent_type)
            .tools(Arc::new(tools))
            .printer(printer.clone())
            .build(),
    );

    let handlers = state.handlers.clone();
    let raw_query = request.query;
    tokio::spawn(async move {
        if let Err(e) = handlers.dispatch(ctx.clone(), &raw_query).await {
            error!(request_id = %ctx.request_id, error = %e, "Run: handler failed");
        }
        if let Err(e) = printer.close().await {
            warn!(request_id = %ctx.request_id, error = %e, "Run: failed to close printer");
        }
    });

    packet_stream(request_id, rx, builder, state.config.heartbeat_interval())
}

/// Local tools plus every configured remote server
async fn build_tools(state: &AppState) -> ToolCollection {
    let mut builder = ToolCollection::builder();
    for tool in state.local_tools.iter() {
        builder = builder.arc(tool.clone());
    }
    if let Some(client) = &state.mcp_client {
        builder = builder.mcp_client(client.clone());
        for server in &state.config.mcp_server_urls {
            builder = builder.mcp_server(server);
        }
    }
    builder.connect().await
}

struct PacketState {
    request_id: String,
    rx: mpsc::Receiver<AgentResponse>,
    builder: SharedBuilder,
    ticker: Interval,
    done: bool,
}

/// Drain `rx` into packets, interleaving heartbeats while idle.
///
/// The stream ends after the first finished packet. If the channel closes
/// first, a failed packet is emitted instead.
pub fn packet_stream(
    request_id: String,
    rx: mpsc::Receiver<AgentResponse>,
    builder: SharedBuilder,
    heartbeat_interval: Duration,
) -> BoxStream<'static, GptProcessResult> {
    let period = heartbeat_interval.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let state = PacketState {
        request_id,
        rx,
        builder,
        ticker,
        done: false,
    };

    stream::unfold(state, |mut s| async move {
        if s.done {
            return None;
        }
        tokio::select! {
            received = s.rx.recv() => {
                let packet = match received {
                    Some(response) => s.builder.lock().await.build(&response),
                    None => {
                        warn!(request_id = %s.request_id, "Run: event channel closed before result");
                        failure(&s.request_id, INCOMPLETE_MESSAGE)
                    }
                };
                s.ticker.reset();
                s.done = packet.finished;
                Some((packet, s))
            }
            _ = s.ticker.tick() => {
                let packet = heartbeat(&s.request_id);
                Some((packet, s))
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskforge_core::{IncrementalResultBuilder, PrinterEvent};
    use tokio::sync::Mutex;

    fn response(message_type: &str, message: serde_json::Value) -> AgentResponse {
        AgentResponse::from_event("req-1", 5, PrinterEvent::new(message_type, message))
    }

    fn shared_builder() -> SharedBuilder {
        Arc::new(Mutex::new(IncrementalResultBuilder::new("req-1")))
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_while_idle() {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            tx.send(response("result", json!("done"))).await.unwrap();
        });

        let packets: Vec<GptProcessResult> =
            packet_stream("req-1".into(), rx, shared_builder(), Duration::from_secs(10))
                .collect()
                .await;

        let heartbeats: Vec<bool> = packets.iter().map(GptProcessResult::is_heartbeat).collect();
        assert_eq!(heartbeats, vec![true, true, false]);
        let last = packets.last().unwrap();
        assert!(last.finished);
        assert_eq!(last.response, "done");
    }

    #[tokio::test]
    async fn test_stops_after_finished_packet() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(response("tool_thought", json!("thinking"))).await.unwrap();
        tx.send(response("result", json!("done"))).await.unwrap();
        tx.send(response("tool_thought", json!("late"))).await.unwrap();

        let builder = shared_builder();
        let packets: Vec<GptProcessResult> =
            packet_stream("req-1".into(), rx, builder.clone(), Duration::from_secs(60))
                .collect()
                .await;

        assert_eq!(packets.len(), 2);
        assert!(!packets[0].finished);
        assert!(packets[1].finished);
        assert_eq!(builder.lock().await.event_result().message_count, 2);
    }

    #[tokio::test]
    async fn test_closed_channel_yields_failure() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(response("tool_thought", json!("thinking"))).await.unwrap();
        drop(tx);

        let packets: Vec<GptProcessResult> =
            packet_stream("req-1".into(), rx, shared_builder(), Duration::from_secs(60))
                .collect()
                .await;

        assert_eq!(packets.len(), 2);
        let last = &packets[1];
        assert!(last.finished);
        assert_eq!(last.status, "failed");
        assert_eq!(last.error_msg.as_deref(), Some(INCOMPLETE_MESSAGE));
    }
}
