// Incremental result builder
//
// Folds the raw AgentResponse stream of one request into client packets.
//
// Design decisions:
// - The first `plan` is the plan skeleton (order 1); later plans are step
//   updates nested under the current task
// - `task` opens a new task id and resets the task order
// - Everything else attaches to the current task; streaming types get a
//   per-task, per-type message order so partial chunks can be reassembled
// - Only final messages are cached for replay, except `deep_search` extend
//   chunks which are never cached

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::event_result::{EventMessage, EventResult};
use super::message_type;
use super::response::AgentResponse;

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_RUNNING: &str = "running";
pub const STATUS_FAILED: &str = "failed";
pub const RESPONSE_TYPE_TEXT: &str = "TEXT";
pub const PACKAGE_RESULT: &str = "result";
pub const PACKAGE_HEARTBEAT: &str = "heartbeat";

/// `resultMap` of a client packet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    pub agent_type: Option<String>,
    pub multi_agent: Map<String, Value>,
    pub event_data: EventMessage,
}

/// Client-visible packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GptProcessResult {
    pub status: String,
    pub response: String,
    pub response_all: String,
    pub finished: bool,
    pub use_times: u64,
    pub use_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_map: Option<ResultEnvelope>,
    pub response_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub req_id: String,
    pub encrypted: bool,
    pub package_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

impl GptProcessResult {
    fn new(request_id: &str) -> Self {
        Self {
            status: STATUS_RUNNING.to_string(),
            response: String::new(),
            response_all: String::new(),
            finished: false,
            use_times: 0,
            use_tokens: 0,
            result_map: None,
            response_type: RESPONSE_TYPE_TEXT.to_string(),
            trace_id: None,
            req_id: request_id.to_string(),
            encrypted: false,
            package_type: PACKAGE_RESULT.to_string(),
            error_msg: None,
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        self.package_type == PACKAGE_HEARTBEAT
    }

    /// Event id for transports: `<taskId>:<taskOrder>:<messageOrder>`
    pub fn event_id(&self) -> Option<String> {
        let data = &self.result_map.as_ref()?.event_data;
        Some(format!(
            "{}:{}:{}",
            data.task_id.as_deref().unwrap_or_default(),
            data.task_order.unwrap_or_default(),
            data.message_order
        ))
    }
}

/// Keep-alive packet sent while the request is idle
pub fn heartbeat(request_id: &str) -> GptProcessResult {
    GptProcessResult {
        status: STATUS_SUCCESS.to_string(),
        package_type: PACKAGE_HEARTBEAT.to_string(),
        ..GptProcessResult::new(request_id)
    }
}

/// Final packet for a request that could not be started
pub fn failure(request_id: &str, error: impl Into<String>) -> GptProcessResult {
    GptProcessResult {
        status: STATUS_FAILED.to_string(),
        finished: true,
        error_msg: Some(error.into()),
        ..GptProcessResult::new(request_id)
    }
}

/// Per-request builder owning the request's EventResult
#[derive(Debug)]
pub struct IncrementalResultBuilder {
    request_id: String,
    event_result: EventResult,
}

impl IncrementalResultBuilder {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            event_result: EventResult::new(),
        }
    }

    pub fn event_result(&self) -> &EventResult {
        &self.event_result
    }

    pub fn into_event_result(self) -> EventResult {
        self.event_result
    }

    /// Fold one AgentResponse into the ordering state and build its packet
    pub fn build(&mut self, response: &AgentResponse) -> GptProcessResult {
        let er = &mut self.event_result;
        let mut result = GptProcessResult::new(&self.request_id);
        result.finished = response.finish;
        if response.finish {
            result.status = STATUS_SUCCESS.to_string();
        }
        if response.message_type == message_type::RESULT {
            let text = response.result.clone().unwrap_or_default();
            result.response = text.clone();
            result.response_all = text;
        }

        let agent_type = response
            .result_map
            .as_ref()
            .and_then(|map| map.get("agentType"))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });

        let is_final = response.is_final;
        let is_filter_final = response.message_type == message_type::DEEP_SEARCH
            && response
                .result_map
                .as_ref()
                .and_then(|map| map.get("messageType"))
                .and_then(Value::as_str)
                == Some("extend");

        let snapshot = serde_json::to_value(response).unwrap_or_default();
        let mut message = EventMessage {
            message_id: response.message_id.clone(),
            ..Default::default()
        };

        match response.message_type.as_str() {
            message_type::PLAN_THOUGHT => {
                message.message_type = response.message_type.clone();
                message.message_order = er.get_and_incr_order(&response.message_type);
                message.result_map = snapshot;
                if is_final {
                    er.cache_once(
                        message_type::PLAN_THOUGHT,
                        Value::String(response.plan_thought.clone().unwrap_or_default()),
                    );
                }
            }
            message_type::PLAN if er.is_init_plan() => {
                let plan = serde_json::to_value(&response.plan).unwrap_or_default();
                message.message_type = response.message_type.clone();
                message.message_order = 1;
                message.result_map = plan.clone();
                if is_final {
                    er.cache(message_type::PLAN, plan);
                }
            }
            message_type::PLAN => {
                message.task_id = Some(er.task_id());
                message.task_order = Some(er.next_task_order());
                message.message_type = message_type::TASK.to_string();
                message.message_order = 1;
                message.result_map = snapshot;
                if is_final {
                    er.set_result_map_sub_task(message.result_map.clone());
                }
            }
            message_type::TASK => {
                message.task_id = Some(er.renew_task_id());
                message.task_order = Some(er.next_task_order());
                message.message_type = message_type::TASK.to_string();
                message.message_order = 1;
                message.result_map = snapshot;
                if is_final {
                    er.set_result_map_task(vec![message.result_map.clone()]);
                }
            }
            other => {
                let task_id = er.task_id();
                message.task_order = Some(er.next_task_order());
                message.message_type = message_type::TASK.to_string();
                message.message_order = if message_type::is_stream_task(other) {
                    er.get_and_incr_order(&format!("{}:{}", task_id, other))
                } else {
                    1
                };
                message.task_id = Some(task_id);
                message.result_map = snapshot;
                if is_final && !is_filter_final {
                    er.set_result_map_sub_task(message.result_map.clone());
                }
            }
        }

        let seq = er.record(message.clone());
        debug!(
            request_id = %self.request_id,
            seq,
            message_type = %response.message_type,
            order = message.message_order,
            "IncrementalResultBuilder: built packet"
        );

        result.result_map = Some(ResultEnvelope {
            agent_type,
            multi_agent: Map::new(),
            event_data: message,
        });
        result
    }
}
